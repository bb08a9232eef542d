use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub type SignalId = uuid::Uuid;

/// Trade direction. Determines which side of the entry price SL and TP
/// must sit on (see `validate`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Buy,
    Sell,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Direction::Buy => "buy",
            Direction::Sell => "sell",
        };
        f.write_str(s)
    }
}

impl FromStr for Direction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "buy" => Ok(Direction::Buy),
            "sell" => Ok(Direction::Sell),
            other => Err(anyhow::anyhow!("Invalid Direction value: {}", other)),
        }
    }
}

/// Lifecycle of a stored signal. Transitions are forward-only:
/// Active -> Expired (time-driven) and Active -> Cancelled (manual).
/// Both Expired and Cancelled are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalState {
    Active,
    Expired,
    Cancelled,
}

impl fmt::Display for SignalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SignalState::Active => "active",
            SignalState::Expired => "expired",
            SignalState::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

impl FromStr for SignalState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SignalState::Active),
            "expired" => Ok(SignalState::Expired),
            "cancelled" => Ok(SignalState::Cancelled),
            other => Err(anyhow::anyhow!("Invalid SignalState value: {}", other)),
        }
    }
}

/// Proposed signal as submitted by an admin, before admission.
#[derive(Debug, Clone)]
pub struct SignalCandidate {
    pub symbol: String,
    pub direction: Direction,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
}

/// An admitted signal. Identity, prices, and timing are immutable once
/// stored; only `state`/`state_changed_at_ms` move, via the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Signal {
    pub id: SignalId,

    pub symbol: String,
    #[serde(rename = "type")]
    pub direction: Direction,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,

    /// |TP - entry| / |entry - SL|, derived at admission.
    pub risk_reward: f64,

    /// Connection that admitted the signal (audit trail).
    pub issued_by: uuid::Uuid,

    pub created_at_ms: u64,
    pub expires_at_ms: u64,

    pub state: SignalState,
    pub state_changed_at_ms: u64,
}

impl Signal {
    pub fn is_active(&self) -> bool {
        self.state == SignalState::Active
    }

    /// True once the TTL has elapsed, regardless of whether the reaper
    /// has already transitioned the state.
    pub fn is_due(&self, now_ms: u64) -> bool {
        now_ms >= self.expires_at_ms
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, SignalState::Expired | SignalState::Cancelled)
    }
}

/// State transition fanned out to connected consumers and appended to the
/// durable log.
#[derive(Debug, Clone)]
pub enum SignalEvent {
    Admitted(Signal),
    Expired(Signal),
    Cancelled(Signal),
}

impl SignalEvent {
    pub fn signal(&self) -> &Signal {
        match self {
            SignalEvent::Admitted(s) | SignalEvent::Expired(s) | SignalEvent::Cancelled(s) => s,
        }
    }

    /// Wire name of the push event.
    pub fn name(&self) -> &'static str {
        match self {
            SignalEvent::Admitted(_) => "signal_admitted",
            SignalEvent::Expired(_) => "signal_expired",
            SignalEvent::Cancelled(_) => "signal_cancelled",
        }
    }
}
