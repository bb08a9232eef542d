//! Wire types: newline-delimited JSON objects over a persistent
//! connection. Inbound lines decode to a `Request` whose `action` field
//! selects the variant; outbound frames are `Response` (answer to the
//! requester) or `Push` (fan-out to consumers).

use serde::{Deserialize, Serialize};

use session::model::ClientType;
use signal::model::{Direction, Signal, SignalEvent, SignalId, SignalState};

use crate::error::RequestError;

/// One decoded inbound line. `client_type` and `password` are only
/// consulted while the connection is unauthenticated.
#[derive(Debug, Deserialize)]
pub struct Request {
    pub client_type: Option<ClientType>,
    pub password: Option<String>,

    #[serde(flatten)]
    pub action: Action,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Admin only. Field names follow the wire convention, not the model.
    SendSignal {
        symbol: String,
        price: f64,
        sl: f64,
        tp: f64,
        #[serde(rename = "type")]
        direction: Direction,
    },

    /// Admin only.
    CancelSignal { id: SignalId },

    /// Returns the current active snapshot and marks the consumer live.
    Subscribe,

    Health,

    /// Admin only.
    GetStats,

    /// Admin only. Served from the durable log, not the live store.
    GetHistory {
        #[serde(default)]
        limit: Option<usize>,
        #[serde(default)]
        state: Option<SignalState>,
    },
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Response {
    Ok {
        #[serde(flatten)]
        body: OkBody,
    },
    Error {
        error_code: &'static str,
        message: String,
    },
}

impl Response {
    pub fn ok(body: OkBody) -> Self {
        Response::Ok { body }
    }

    pub fn error(err: &RequestError) -> Self {
        Response::Error {
            error_code: err.code(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum OkBody {
    Accepted {
        message: &'static str,
        signal: Signal,
        total_active_signals: usize,
    },
    Cancelled {
        message: &'static str,
        signal: Signal,
    },
    Snapshot {
        signals: Vec<Signal>,
    },
    Health {
        health: HealthReport,
    },
    Stats {
        stats: StatsReport,
    },
    History {
        history: Vec<Signal>,
    },
}

/// Event frame fanned out to connected consumers.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Push<'a> {
    Signal {
        event: &'static str,
        signal: &'a Signal,
    },
    Snapshot {
        event: &'static str,
        signals: &'a [Signal],
    },
}

impl<'a> Push<'a> {
    pub fn from_event(event: &'a SignalEvent) -> Self {
        Push::Signal {
            event: event.name(),
            signal: event.signal(),
        }
    }

    pub fn snapshot(signals: &'a [Signal]) -> Self {
        Push::Snapshot {
            event: "snapshot",
            signals,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub uptime_seconds: u64,
    pub active_signals: usize,
    pub active_sessions: usize,
    pub connections: usize,
    pub admissions_halted: bool,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct StatsReport {
    pub server_time: String,
    pub uptime_seconds: u64,
    pub active_signals_count: usize,
    pub total_signals_tracked: usize,
    pub active_sessions: usize,
    pub connections: usize,
    pub rate_windows: usize,
    pub active_signals_info: Vec<ActiveSignalInfo>,
}

#[derive(Debug, Serialize)]
pub struct ActiveSignalInfo {
    pub id: SignalId,
    pub symbol: String,
    #[serde(rename = "type")]
    pub direction: Direction,
    pub age_ms: u64,
    pub expires_in_ms: u64,
    pub issued_by: uuid::Uuid,
}
