//! SignalStore
//! --------------------
//! In-memory set of signals and their lifecycle state. The store is a
//! plain synchronous structure: the broadcast engine serializes every
//! mutation through a single lock, so capacity checks and state
//! transitions are atomic with respect to concurrent admissions and
//! expirations.
//!
//! Terminal signals are retained for a bounded window (history queries
//! from late joiners) and purged afterwards by the reaper.

use std::collections::HashMap;

use uuid::Uuid;

use crate::model::{Signal, SignalCandidate, SignalId, SignalState};
use crate::validate::{ValidationError, ValidationLimits, validate};

/// Tuning for admission and retention.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Signals live this long after admission before auto-expiry.
    pub ttl_ms: u64,

    /// Hard cap on concurrently ACTIVE signals. Admission beyond the cap
    /// is rejected (never evicts a live signal).
    pub max_active: usize,

    /// How long terminal signals stay queryable before being purged.
    pub retention_ms: u64,

    pub limits: ValidationLimits,
}

/// Why a candidate was not admitted.
#[derive(Debug, Clone, PartialEq)]
pub enum AdmitError {
    Capacity { max: usize },
    Invalid(ValidationError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelError {
    NotFound,
    AlreadyTerminal,
}

pub struct SignalStore {
    cfg: StoreConfig,
    signals: HashMap<SignalId, Signal>,
    /// Admission order; drives `list_active` ordering.
    order: Vec<SignalId>,
}

impl SignalStore {
    pub fn new(cfg: StoreConfig) -> Self {
        Self {
            cfg,
            signals: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Validate and admit a candidate. On success the signal is stored
    /// ACTIVE with id and timestamps assigned; the caller broadcasts the
    /// returned copy.
    pub fn admit(
        &mut self,
        candidate: SignalCandidate,
        issued_by: Uuid,
        now_ms: u64,
    ) -> Result<Signal, AdmitError> {
        if self.active_count() >= self.cfg.max_active {
            return Err(AdmitError::Capacity {
                max: self.cfg.max_active,
            });
        }

        let risk_reward =
            validate(&candidate, &self.cfg.limits).map_err(AdmitError::Invalid)?;

        let id = Uuid::new_v4();
        let signal = Signal {
            id,
            symbol: candidate.symbol,
            direction: candidate.direction,
            entry_price: candidate.entry_price,
            stop_loss: candidate.stop_loss,
            take_profit: candidate.take_profit,
            risk_reward,
            issued_by,
            created_at_ms: now_ms,
            expires_at_ms: now_ms + self.cfg.ttl_ms,
            state: SignalState::Active,
            state_changed_at_ms: now_ms,
        };

        self.signals.insert(id, signal.clone());
        self.order.push(id);

        Ok(signal)
    }

    /// Idempotent ACTIVE -> EXPIRED transition. Returns the updated
    /// signal only when a transition actually happened, so callers emit
    /// exactly one "expired" event per signal.
    pub fn expire(&mut self, id: SignalId, now_ms: u64) -> Option<Signal> {
        let s = self.signals.get_mut(&id)?;
        if s.state != SignalState::Active {
            return None;
        }

        s.state = SignalState::Expired;
        s.state_changed_at_ms = now_ms;
        Some(s.clone())
    }

    /// Expire every ACTIVE signal whose TTL has elapsed. Returns the
    /// transitioned signals in admission order.
    pub fn expire_due(&mut self, now_ms: u64) -> Vec<Signal> {
        let due: Vec<SignalId> = self
            .order
            .iter()
            .copied()
            .filter(|id| {
                self.signals
                    .get(id)
                    .is_some_and(|s| s.is_active() && s.is_due(now_ms))
            })
            .collect();

        due.into_iter()
            .filter_map(|id| self.expire(id, now_ms))
            .collect()
    }

    /// ACTIVE -> CANCELLED. Rejects unknown ids and signals that already
    /// reached a terminal state.
    pub fn cancel(&mut self, id: SignalId, now_ms: u64) -> Result<Signal, CancelError> {
        let s = self.signals.get_mut(&id).ok_or(CancelError::NotFound)?;
        if s.state != SignalState::Active {
            return Err(CancelError::AlreadyTerminal);
        }

        s.state = SignalState::Cancelled;
        s.state_changed_at_ms = now_ms;
        Ok(s.clone())
    }

    /// Snapshot of ACTIVE signals ordered by creation time ascending.
    /// Signals whose TTL has elapsed are excluded even if the reaper has
    /// not transitioned them yet.
    pub fn list_active(&self, now_ms: u64) -> Vec<Signal> {
        self.order
            .iter()
            .filter_map(|id| self.signals.get(id))
            .filter(|s| s.is_active() && !s.is_due(now_ms))
            .cloned()
            .collect()
    }

    pub fn get(&self, id: SignalId) -> Option<&Signal> {
        self.signals.get(&id)
    }

    /// Count of signals in state ACTIVE. Due-but-unreaped signals still
    /// count, so the cap on ACTIVE signals holds at every instant; the
    /// engine runs `expire_due` before admitting to release their slots.
    pub fn active_count(&self) -> usize {
        self.signals.values().filter(|s| s.is_active()).count()
    }

    /// Drop terminal signals past the retention window. Returns how many
    /// were removed.
    pub fn purge_retained(&mut self, now_ms: u64) -> usize {
        let retention = self.cfg.retention_ms;
        let before = self.signals.len();

        self.signals.retain(|_, s| {
            !(s.is_terminal() && now_ms.saturating_sub(s.state_changed_at_ms) > retention)
        });
        self.order.retain(|id| self.signals.contains_key(id));

        before - self.signals.len()
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }
}
