//! The broadcast engine.
//!
//! For each inbound line it:
//!   1. Decodes the request.
//!   2. Resolves or creates the session (shared-secret authentication).
//!   3. Applies the rate limiter and touches the session.
//!   4. Dispatches the action against the signal store.
//!   5. Answers the requester and fans events out to live consumers.
//!
//! Every mutable piece (store, registry, limiter, outbound senders) sits
//! behind one mutex, so capacity checks and state transitions are atomic
//! with respect to concurrent admissions and expirations. Fan-out only
//! enqueues into per-consumer bounded channels while the lock is held;
//! the actual socket writes happen in each connection's write task.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, error, info, warn};

use session::model::{ClientType, ConnectionId, Session};
use session::rate_limit::RateLimiter;
use session::registry::{AuthError, SessionRegistry};
use signal::model::{SignalCandidate, SignalEvent};
use signal::store::SignalStore;
use storage::{HistoryFilter, SignalLog};

use crate::error::RequestError;
use crate::protocol::{
    Action, ActiveSignalInfo, HealthReport, OkBody, Push, Request, Response, StatsReport,
};

/// Current wall-clock time in milliseconds.
pub fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis() as u64
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Frames buffered per consumer before it counts as too slow and is
    /// dropped.
    pub outbound_capacity: usize,

    /// Close the connection after the first failed authentication.
    pub close_on_auth_failure: bool,
}

/// What a connection's write task drains from its queue.
#[derive(Debug)]
pub enum Outbound {
    Frame(String),
    Close,
}

struct CoreState {
    store: SignalStore,
    registry: SessionRegistry,
    limiter: RateLimiter,
    outbound: HashMap<ConnectionId, mpsc::Sender<Outbound>>,
    admissions_halted: bool,
}

impl CoreState {
    /// Queue one frame for a connection. A full queue means the consumer
    /// cannot keep up; its sender is dropped, which ends its write task
    /// once the buffered frames drain, without stalling anyone else.
    fn enqueue(&mut self, conn: ConnectionId, frame: String) {
        let Some(tx) = self.outbound.get(&conn) else {
            return;
        };

        match tx.try_send(Outbound::Frame(frame)) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(conn = %conn, "outbound queue full, dropping slow consumer");
                self.outbound.remove(&conn);
                self.registry.remove(conn);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.outbound.remove(&conn);
                self.registry.remove(conn);
            }
        }
    }

    /// Flush buffered frames, then close the connection.
    fn close(&mut self, conn: ConnectionId) {
        if let Some(tx) = self.outbound.remove(&conn) {
            let _ = tx.try_send(Outbound::Close);
        }
        self.registry.remove(conn);
    }

    fn fan_out(&mut self, event: &SignalEvent) {
        let Some(frame) = encode(&Push::from_event(event)) else {
            return;
        };

        let targets: Vec<ConnectionId> = self
            .registry
            .authenticated_of_type(ClientType::Customer)
            .map(|s| s.id)
            .collect();

        for conn in targets {
            self.enqueue(conn, frame.clone());
        }
    }
}

fn encode<T: Serialize>(value: &T) -> Option<String> {
    match serde_json::to_string(value) {
        Ok(frame) => Some(frame),
        Err(e) => {
            error!(error = %e, "failed to encode outbound frame");
            None
        }
    }
}

pub struct BroadcastEngine {
    cfg: EngineConfig,
    state: Mutex<CoreState>,
    log: Arc<dyn SignalLog>,
    log_tx: mpsc::Sender<SignalEvent>,
    started_at_ms: u64,
}

impl BroadcastEngine {
    pub fn new(
        cfg: EngineConfig,
        store: SignalStore,
        registry: SessionRegistry,
        limiter: RateLimiter,
        log: Arc<dyn SignalLog>,
        log_tx: mpsc::Sender<SignalEvent>,
        started_at_ms: u64,
    ) -> Self {
        Self {
            cfg,
            state: Mutex::new(CoreState {
                store,
                registry,
                limiter,
                outbound: HashMap::new(),
                admissions_halted: false,
            }),
            log,
            log_tx,
            started_at_ms,
        }
    }

    /// Register a new physical connection and hand back the queue its
    /// write task drains.
    pub async fn register_connection(&self, conn: ConnectionId) -> mpsc::Receiver<Outbound> {
        let (tx, rx) = mpsc::channel(self.cfg.outbound_capacity);
        self.state.lock().await.outbound.insert(conn, tx);
        rx
    }

    /// Forget a connection after its socket closed.
    pub async fn disconnect(&self, conn: ConnectionId) {
        let mut state = self.state.lock().await;
        state.outbound.remove(&conn);
        state.registry.remove(conn);
    }

    pub async fn connection_count(&self) -> usize {
        self.state.lock().await.outbound.len()
    }

    /// Process one decoded line from a connection. Returns `false` when
    /// the read loop should close the connection.
    pub async fn handle_line(&self, conn: ConnectionId, line: &str, now_ms: u64) -> bool {
        let req: Request = match serde_json::from_str(line) {
            Ok(req) => req,
            Err(e) => {
                let mut state = self.state.lock().await;
                respond_error(&mut state, conn, &RequestError::Malformed(e.to_string()));
                return true;
            }
        };

        let mut state = self.state.lock().await;

        let (session, first_auth) = match state.registry.get(conn).cloned() {
            Some(session) => (session, false),
            None => {
                let attempt = match (req.client_type, req.password.as_deref()) {
                    (Some(client_type), Some(password)) => {
                        state.registry.authenticate(conn, client_type, password, now_ms)
                    }
                    _ => Err(AuthError::BadCredentials),
                };

                match attempt {
                    Ok(session) => {
                        info!(conn = %conn, client_type = %session.client_type, "session authenticated");
                        (session, true)
                    }
                    Err(e) => {
                        warn!(conn = %conn, "authentication failed");
                        let err = RequestError::from(e);
                        respond_error(&mut state, conn, &err);
                        if self.cfg.close_on_auth_failure && err.closes_connection() {
                            state.close(conn);
                            return false;
                        }
                        return true;
                    }
                }
            }
        };

        // A customer stays authenticated and live even when its first
        // request fails, so every post-auth path owes it the snapshot.
        let first_customer = first_auth && session.client_type == ClientType::Customer;

        if !state.limiter.allow(session.client_type, conn, now_ms) {
            respond_error(&mut state, conn, &RequestError::RateLimited);
            if first_customer {
                push_snapshot(&mut state, conn, now_ms);
            }
            return true;
        }

        state.registry.touch(conn, now_ms);

        let was_subscribe = matches!(req.action, Action::Subscribe);

        match req.action {
            // History is served from the durable log; the state lock is
            // released across the query.
            Action::GetHistory { limit, state: state_filter } => {
                if session.client_type != ClientType::Admin {
                    respond_error(&mut state, conn, &RequestError::UnauthorizedAction);
                    if first_customer {
                        push_snapshot(&mut state, conn, now_ms);
                    }
                    return true;
                }
                drop(state);

                let filter = HistoryFilter {
                    limit: limit.unwrap_or(0),
                    state: state_filter,
                };
                let result = self.log.query_history(filter).await;

                let mut state = self.state.lock().await;
                match result {
                    Ok(history) => respond_ok(&mut state, conn, OkBody::History { history }),
                    Err(e) => {
                        error!(error = %e, "history query failed");
                        respond_error(&mut state, conn, &RequestError::Internal);
                    }
                }
            }
            action => {
                match self.dispatch(&mut state, &session, action, now_ms) {
                    Ok(body) => respond_ok(&mut state, conn, body),
                    Err(err) => respond_error(&mut state, conn, &err),
                }

                // A customer whose first authenticated request was not
                // `subscribe` still gets the current snapshot, so late
                // joiners are always consistent.
                if first_customer && !was_subscribe {
                    push_snapshot(&mut state, conn, now_ms);
                }
            }
        }

        true
    }

    fn dispatch(
        &self,
        state: &mut CoreState,
        session: &Session,
        action: Action,
        now_ms: u64,
    ) -> Result<OkBody, RequestError> {
        match action {
            Action::SendSignal { symbol, price, sl, tp, direction } => {
                if session.client_type != ClientType::Admin {
                    return Err(RequestError::UnauthorizedAction);
                }
                if state.admissions_halted {
                    return Err(RequestError::AdmissionsHalted);
                }

                // due signals release their capacity slots (and expire on
                // the wire) before the cap is checked
                self.expire_due(state, now_ms);

                let candidate = SignalCandidate {
                    symbol,
                    direction,
                    entry_price: price,
                    stop_loss: sl,
                    take_profit: tp,
                };

                let admitted = state.store.admit(candidate, session.id, now_ms)?;
                info!(
                    signal_id = %admitted.id,
                    symbol = %admitted.symbol,
                    direction = %admitted.direction,
                    "signal admitted"
                );

                let event = SignalEvent::Admitted(admitted.clone());
                state.fan_out(&event);
                self.record(event);

                Ok(OkBody::Accepted {
                    message: "signal accepted",
                    signal: admitted,
                    total_active_signals: state.store.active_count(),
                })
            }

            Action::CancelSignal { id } => {
                if session.client_type != ClientType::Admin {
                    return Err(RequestError::UnauthorizedAction);
                }

                let cancelled = state.store.cancel(id, now_ms)?;
                info!(signal_id = %cancelled.id, "signal cancelled");

                let event = SignalEvent::Cancelled(cancelled.clone());
                state.fan_out(&event);
                self.record(event);

                Ok(OkBody::Cancelled {
                    message: "signal cancelled",
                    signal: cancelled,
                })
            }

            Action::Subscribe => Ok(OkBody::Snapshot {
                signals: state.store.list_active(now_ms),
            }),

            Action::Health => Ok(OkBody::Health {
                health: self.health_report(state, now_ms),
            }),

            Action::GetStats => {
                if session.client_type != ClientType::Admin {
                    return Err(RequestError::UnauthorizedAction);
                }
                Ok(OkBody::Stats {
                    stats: self.stats_report(state, now_ms),
                })
            }

            // Handled in handle_line; the log query must not hold the lock.
            Action::GetHistory { .. } => Err(RequestError::Internal),
        }
    }

    /// Best-effort durable log append; the live path never waits on it.
    fn record(&self, event: SignalEvent) {
        if let Err(e) = self.log_tx.try_send(event) {
            warn!(error = %e, "durable log queue full, event dropped");
        }
    }

    fn health_report(&self, state: &CoreState, now_ms: u64) -> HealthReport {
        HealthReport {
            status: if state.admissions_halted { "degraded" } else { "healthy" },
            uptime_seconds: now_ms.saturating_sub(self.started_at_ms) / 1000,
            active_signals: state.store.active_count(),
            active_sessions: state.registry.len(),
            connections: state.outbound.len(),
            admissions_halted: state.admissions_halted,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    fn stats_report(&self, state: &CoreState, now_ms: u64) -> StatsReport {
        let active = state.store.list_active(now_ms);

        let active_signals_info = active
            .iter()
            .map(|s| ActiveSignalInfo {
                id: s.id,
                symbol: s.symbol.clone(),
                direction: s.direction,
                age_ms: now_ms.saturating_sub(s.created_at_ms),
                expires_in_ms: s.expires_at_ms.saturating_sub(now_ms),
                issued_by: s.issued_by,
            })
            .collect();

        StatsReport {
            server_time: chrono::Utc::now().to_rfc3339(),
            uptime_seconds: now_ms.saturating_sub(self.started_at_ms) / 1000,
            active_signals_count: active.len(),
            total_signals_tracked: state.store.len(),
            active_sessions: state.registry.len(),
            connections: state.outbound.len(),
            rate_windows: state.limiter.len(),
            active_signals_info,
        }
    }

    /// Transition every due signal, broadcasting and logging each one.
    fn expire_due(&self, state: &mut CoreState, now_ms: u64) {
        for signal in state.store.expire_due(now_ms) {
            info!(signal_id = %signal.id, symbol = %signal.symbol, "signal expired");
            let event = SignalEvent::Expired(signal);
            state.fan_out(&event);
            self.record(event);
        }
    }

    /// One reaper pass: expire due signals, evict idle sessions, purge
    /// retained terminals, drop elapsed rate windows.
    pub async fn tick(&self, now_ms: u64) {
        let mut state = self.state.lock().await;

        self.expire_due(&mut state, now_ms);

        let idle = state.registry.sweep_idle(now_ms);
        for conn in idle {
            info!(conn = %conn, "closing idle session");
            state.close(conn);
        }

        let purged = state.store.purge_retained(now_ms);
        let pruned = state.limiter.prune(now_ms);
        if purged > 0 || pruned > 0 {
            debug!(purged, pruned, "reaper housekeeping");
        }
    }

    /// Stop admitting new signals after a state-corrupting fault; reads
    /// and broadcast keep serving, and `health` reports degraded.
    pub async fn halt_admissions(&self) {
        let mut state = self.state.lock().await;
        state.admissions_halted = true;
        warn!("signal admissions halted");
    }
}

fn respond_ok(state: &mut CoreState, conn: ConnectionId, body: OkBody) {
    if let Some(frame) = encode(&Response::ok(body)) {
        state.enqueue(conn, frame);
    }
}

fn respond_error(state: &mut CoreState, conn: ConnectionId, err: &RequestError) {
    if let Some(frame) = encode(&Response::error(err)) {
        state.enqueue(conn, frame);
    }
}

fn push_snapshot(state: &mut CoreState, conn: ConnectionId, now_ms: u64) {
    let snapshot = state.store.list_active(now_ms);
    if let Some(frame) = encode(&Push::snapshot(&snapshot)) {
        state.enqueue(conn, frame);
    }
}
