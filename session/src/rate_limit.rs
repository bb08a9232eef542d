//! Fixed-window request counter.
//
//  Pure and synchronous; the engine calls `allow` while holding its
//  state lock, making check-and-increment atomic per key.

use std::collections::HashMap;

use crate::model::{ClientType, ConnectionId};

/// Whether all connections of a client type share one bucket (default)
/// or each connection gets its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateScope {
    PerClientType,
    PerConnection,
}

#[derive(Debug, Clone)]
pub struct RateLimits {
    pub admin_per_window: u32,
    pub customer_per_window: u32,
    pub window_ms: u64,
    pub scope: RateScope,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum RateKey {
    ClientType(ClientType),
    Connection(ConnectionId),
}

#[derive(Debug, Clone, Copy)]
struct Window {
    start_ms: u64,
    count: u32,
}

pub struct RateLimiter {
    cfg: RateLimits,
    windows: HashMap<RateKey, Window>,
}

impl RateLimiter {
    pub fn new(cfg: RateLimits) -> Self {
        Self {
            cfg,
            windows: HashMap::new(),
        }
    }

    /// Admit or reject one request. The window resets once `window_ms`
    /// has elapsed since its start; a rejected request is not carried
    /// into the next window.
    pub fn allow(&mut self, client_type: ClientType, conn: ConnectionId, now_ms: u64) -> bool {
        let key = match self.cfg.scope {
            RateScope::PerClientType => RateKey::ClientType(client_type),
            RateScope::PerConnection => RateKey::Connection(conn),
        };

        let ceiling = match client_type {
            ClientType::Admin => self.cfg.admin_per_window,
            ClientType::Customer => self.cfg.customer_per_window,
        };

        let window = self.windows.entry(key).or_insert(Window {
            start_ms: now_ms,
            count: 0,
        });

        if now_ms.saturating_sub(window.start_ms) >= self.cfg.window_ms {
            window.start_ms = now_ms;
            window.count = 0;
        }

        if window.count >= ceiling {
            return false;
        }

        window.count += 1;
        true
    }

    /// Drop windows that have fully elapsed; reaper housekeeping so
    /// one-shot clients do not accumulate state.
    pub fn prune(&mut self, now_ms: u64) -> usize {
        let window_ms = self.cfg.window_ms;
        let before = self.windows.len();

        self.windows
            .retain(|_, w| now_ms.saturating_sub(w.start_ms) < window_ms);

        before - self.windows.len()
    }

    /// Number of rate windows currently tracked.
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}
