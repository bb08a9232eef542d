use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub type ConnectionId = uuid::Uuid;

/// Privilege class of a connection, fixed at authentication. Admins may
/// create and cancel signals; customers are receive-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientType {
    Admin,
    Customer,
}

impl fmt::Display for ClientType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ClientType::Admin => "admin",
            ClientType::Customer => "customer",
        };
        f.write_str(s)
    }
}

impl FromStr for ClientType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(ClientType::Admin),
            "customer" => Ok(ClientType::Customer),
            other => Err(anyhow::anyhow!("Invalid ClientType value: {}", other)),
        }
    }
}

/// A session record is created directly in AUTHENTICATED by a
/// successful login; connections that never authenticated are not
/// sessions. The copy handed back on removal is marked CLOSED.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Authenticated,
    Closed,
}

/// A connected, authenticated client. The registry exclusively owns
/// these records; the transport holds only the `ConnectionId`.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub id: ConnectionId,
    pub client_type: ClientType,
    pub authenticated_at_ms: u64,
    pub last_activity_ms: u64,
    pub state: SessionState,
}

impl Session {
    pub fn is_authenticated(&self) -> bool {
        self.state == SessionState::Authenticated
    }

    /// True once the session has seen no valid request for `timeout_ms`.
    pub fn is_idle(&self, now_ms: u64, timeout_ms: u64) -> bool {
        now_ms.saturating_sub(self.last_activity_ms) > timeout_ms
    }
}
