//! Durable log of admitted signals and their terminal states.
//!
//! The live broadcast path never waits on this: the engine hands events
//! to a spawned appender task over a bounded channel and moves on. A log
//! failure is logged and dropped, it does not roll back or block an
//! already-broadcast signal. History queries serve admin `get_history`
//! requests and external reporting.

pub mod sqlite;
pub mod writer;

use signal::model::{Signal, SignalEvent, SignalState};

/// Filter for history queries.
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    /// Maximum rows returned, newest first. Zero means the default limit.
    pub limit: usize,
    pub state: Option<SignalState>,
}

pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Ceiling on a single history query. Requested limits above this are
/// clamped rather than passed through to the database.
pub const MAX_HISTORY_LIMIT: usize = 500;

#[async_trait::async_trait]
pub trait SignalLog: Send + Sync {
    /// Record a state transition. Admission inserts the signal; terminal
    /// transitions update its status.
    async fn append(&self, event: &SignalEvent) -> anyhow::Result<()>;

    /// Recent signals, newest first, optionally filtered by state.
    async fn query_history(&self, filter: HistoryFilter) -> anyhow::Result<Vec<Signal>>;
}
