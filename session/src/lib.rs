pub mod model;
pub mod rate_limit;
pub mod registry;
