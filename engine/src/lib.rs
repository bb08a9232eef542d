//! Broadcast engine: serialized orchestration of the signal store,
//! session registry, and rate limiter, with independent bounded outbound
//! queues per consumer.

pub mod engine;
pub mod error;
pub mod protocol;
pub mod reaper;
