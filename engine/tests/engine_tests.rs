use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use uuid::Uuid;

use engine::engine::{BroadcastEngine, EngineConfig, Outbound};
use session::rate_limit::{RateLimiter, RateLimits, RateScope};
use session::registry::{RegistryConfig, SessionRegistry};
use signal::model::{Signal, SignalEvent};
use signal::store::{SignalStore, StoreConfig};
use signal::validate::ValidationLimits;
use storage::{DEFAULT_HISTORY_LIMIT, HistoryFilter, MAX_HISTORY_LIMIT, SignalLog};

const ADMIN_SECRET: &str = "admin-secret";
const CUSTOMER_SECRET: &str = "customer-secret";
const TTL_MS: u64 = 300_000;
const SESSION_TIMEOUT_MS: u64 = 30 * 60 * 1000;

/// In-memory stand-in for the SQLite log: keeps the latest version of
/// each signal, newest admission first.
#[derive(Default)]
struct MemoryLog {
    events: Mutex<Vec<SignalEvent>>,
}

#[async_trait]
impl SignalLog for MemoryLog {
    async fn append(&self, event: &SignalEvent) -> anyhow::Result<()> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }

    async fn query_history(&self, filter: HistoryFilter) -> anyhow::Result<Vec<Signal>> {
        let events = self.events.lock().unwrap();

        let mut signals: Vec<Signal> = Vec::new();
        for event in events.iter() {
            let s = event.signal().clone();
            match signals.iter_mut().find(|x| x.id == s.id) {
                Some(existing) => *existing = s,
                None => signals.push(s),
            }
        }
        signals.reverse();

        if let Some(state) = filter.state {
            signals.retain(|s| s.state == state);
        }

        let limit = match filter.limit {
            0 => DEFAULT_HISTORY_LIMIT,
            n => n.min(MAX_HISTORY_LIMIT),
        };
        signals.truncate(limit);

        Ok(signals)
    }
}

struct Harness {
    engine: Arc<BroadcastEngine>,
}

fn harness() -> Harness {
    harness_with(120, 60, 16)
}

fn harness_with(
    admin_per_window: u32,
    customer_per_window: u32,
    outbound_capacity: usize,
) -> Harness {
    harness_full(10, admin_per_window, customer_per_window, outbound_capacity)
}

fn harness_full(
    max_active: usize,
    admin_per_window: u32,
    customer_per_window: u32,
    outbound_capacity: usize,
) -> Harness {
    let store = SignalStore::new(StoreConfig {
        ttl_ms: TTL_MS,
        max_active,
        retention_ms: 600_000,
        limits: ValidationLimits::default(),
    });
    let registry = SessionRegistry::new(RegistryConfig {
        admin_secret: ADMIN_SECRET.into(),
        customer_secret: CUSTOMER_SECRET.into(),
        session_timeout_ms: SESSION_TIMEOUT_MS,
    });
    let limiter = RateLimiter::new(RateLimits {
        admin_per_window,
        customer_per_window,
        window_ms: 60_000,
        scope: RateScope::PerConnection,
    });

    let log = Arc::new(MemoryLog::default());
    let (log_tx, log_rx) = mpsc::channel(64);
    storage::writer::spawn_appender(log.clone(), log_rx);

    let engine = Arc::new(BroadcastEngine::new(
        EngineConfig {
            outbound_capacity,
            close_on_auth_failure: true,
        },
        store,
        registry,
        limiter,
        log,
        log_tx,
        0,
    ));

    Harness { engine }
}

fn send_signal_line(symbol: &str, price: f64, sl: f64, tp: f64, direction: &str) -> String {
    json!({
        "client_type": "admin",
        "password": ADMIN_SECRET,
        "action": "send_signal",
        "symbol": symbol,
        "price": price,
        "sl": sl,
        "tp": tp,
        "type": direction,
    })
    .to_string()
}

fn subscribe_line() -> String {
    json!({
        "client_type": "customer",
        "password": CUSTOMER_SECRET,
        "action": "subscribe",
    })
    .to_string()
}

fn admin_line(action: Value) -> String {
    let mut obj = action;
    obj["client_type"] = json!("admin");
    obj["password"] = json!(ADMIN_SECRET);
    obj.to_string()
}

fn next_frame(rx: &mut mpsc::Receiver<Outbound>) -> Value {
    match rx.try_recv().expect("expected a queued frame") {
        Outbound::Frame(s) => serde_json::from_str(&s).expect("frame is valid JSON"),
        Outbound::Close => panic!("unexpected close"),
    }
}

fn assert_close(rx: &mut mpsc::Receiver<Outbound>) {
    match rx.try_recv().expect("expected a close marker") {
        Outbound::Close => {}
        Outbound::Frame(s) => panic!("unexpected frame: {s}"),
    }
}

fn assert_empty(rx: &mut mpsc::Receiver<Outbound>) {
    assert!(matches!(
        rx.try_recv(),
        Err(mpsc::error::TryRecvError::Empty)
    ));
}

#[tokio::test]
async fn admitted_signal_is_broadcast_to_subscribed_customers() {
    let h = harness();

    let customer = Uuid::new_v4();
    let mut customer_rx = h.engine.register_connection(customer).await;
    assert!(h.engine.handle_line(customer, &subscribe_line(), 1_000).await);

    let snapshot = next_frame(&mut customer_rx);
    assert_eq!(snapshot["status"], "ok");
    assert_eq!(snapshot["signals"].as_array().unwrap().len(), 0);

    let admin = Uuid::new_v4();
    let mut admin_rx = h.engine.register_connection(admin).await;
    let line = send_signal_line("BTCUSD", 50_000.0, 49_500.0, 51_000.0, "buy");
    assert!(h.engine.handle_line(admin, &line, 2_000).await);

    let resp = next_frame(&mut admin_rx);
    assert_eq!(resp["status"], "ok");
    assert_eq!(resp["total_active_signals"], 1);
    assert!((resp["signal"]["risk_reward"].as_f64().unwrap() - 2.0).abs() < 1e-9);

    let push = next_frame(&mut customer_rx);
    assert_eq!(push["event"], "signal_admitted");
    assert_eq!(push["signal"]["symbol"], "BTCUSD");
    assert_eq!(push["signal"]["type"], "buy");

    // the admitting admin does not receive its own fan-out
    assert_empty(&mut admin_rx);
}

#[tokio::test]
async fn inconsistent_prices_are_rejected_and_never_stored() {
    let h = harness();

    let admin = Uuid::new_v4();
    let mut admin_rx = h.engine.register_connection(admin).await;

    // tp below entry on a buy
    let line = send_signal_line("BTCUSD", 50_000.0, 49_500.0, 49_000.0, "buy");
    assert!(h.engine.handle_line(admin, &line, 1_000).await);

    let resp = next_frame(&mut admin_rx);
    assert_eq!(resp["status"], "error");
    assert_eq!(resp["error_code"], "VALIDATION_FAILED");
    assert_eq!(resp["message"], "TP must be greater than entry price for BUY");

    let customer = Uuid::new_v4();
    let mut customer_rx = h.engine.register_connection(customer).await;
    assert!(h.engine.handle_line(customer, &subscribe_line(), 2_000).await);

    let snapshot = next_frame(&mut customer_rx);
    assert_eq!(snapshot["signals"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn late_joiner_snapshot_is_in_creation_order() {
    let h = harness();

    let admin = Uuid::new_v4();
    let mut admin_rx = h.engine.register_connection(admin).await;
    for (i, symbol) in ["EURUSD", "GBPUSD", "USDJPY"].iter().enumerate() {
        let line = send_signal_line(symbol, 100.0, 99.0, 102.0, "buy");
        assert!(h.engine.handle_line(admin, &line, 1_000 + i as u64).await);
        next_frame(&mut admin_rx);
    }

    let customer = Uuid::new_v4();
    let mut customer_rx = h.engine.register_connection(customer).await;
    assert!(h.engine.handle_line(customer, &subscribe_line(), 5_000).await);

    let snapshot = next_frame(&mut customer_rx);
    let signals = snapshot["signals"].as_array().unwrap();
    assert_eq!(signals.len(), 3);
    assert_eq!(signals[0]["symbol"], "EURUSD");
    assert_eq!(signals[1]["symbol"], "GBPUSD");
    assert_eq!(signals[2]["symbol"], "USDJPY");
}

#[tokio::test]
async fn customer_first_auth_on_other_action_still_gets_snapshot() {
    let h = harness();

    let admin = Uuid::new_v4();
    let mut admin_rx = h.engine.register_connection(admin).await;
    let line = send_signal_line("BTCUSD", 50_000.0, 49_500.0, 51_000.0, "buy");
    assert!(h.engine.handle_line(admin, &line, 1_000).await);
    next_frame(&mut admin_rx);

    let customer = Uuid::new_v4();
    let mut customer_rx = h.engine.register_connection(customer).await;
    let health = json!({
        "client_type": "customer",
        "password": CUSTOMER_SECRET,
        "action": "health",
    })
    .to_string();
    assert!(h.engine.handle_line(customer, &health, 2_000).await);

    let resp = next_frame(&mut customer_rx);
    assert_eq!(resp["status"], "ok");
    assert_eq!(resp["health"]["status"], "healthy");

    let push = next_frame(&mut customer_rx);
    assert_eq!(push["event"], "snapshot");
    assert_eq!(push["signals"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn customer_first_auth_on_rejected_action_still_gets_snapshot() {
    let h = harness();

    let admin = Uuid::new_v4();
    let mut admin_rx = h.engine.register_connection(admin).await;
    let line = send_signal_line("BTCUSD", 50_000.0, 49_500.0, 51_000.0, "buy");
    assert!(h.engine.handle_line(admin, &line, 1_000).await);
    next_frame(&mut admin_rx);

    // the customer's first authenticated request is admin-only
    let customer = Uuid::new_v4();
    let mut customer_rx = h.engine.register_connection(customer).await;
    let query = json!({
        "client_type": "customer",
        "password": CUSTOMER_SECRET,
        "action": "get_history",
    })
    .to_string();
    assert!(h.engine.handle_line(customer, &query, 2_000).await);

    let resp = next_frame(&mut customer_rx);
    assert_eq!(resp["status"], "error");
    assert_eq!(resp["error_code"], "UNAUTHORIZED_ACTION");

    // the session is live, so the snapshot still arrives
    let push = next_frame(&mut customer_rx);
    assert_eq!(push["event"], "snapshot");
    assert_eq!(push["signals"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn customer_first_auth_rate_limited_still_gets_snapshot() {
    // customer ceiling of zero: the first request authenticates, then
    // hits the limiter
    let h = harness_full(10, 120, 0, 16);

    let admin = Uuid::new_v4();
    let mut admin_rx = h.engine.register_connection(admin).await;
    let line = send_signal_line("BTCUSD", 50_000.0, 49_500.0, 51_000.0, "buy");
    assert!(h.engine.handle_line(admin, &line, 1_000).await);
    next_frame(&mut admin_rx);

    let customer = Uuid::new_v4();
    let mut customer_rx = h.engine.register_connection(customer).await;
    let health = json!({
        "client_type": "customer",
        "password": CUSTOMER_SECRET,
        "action": "health",
    })
    .to_string();
    assert!(h.engine.handle_line(customer, &health, 2_000).await);

    let resp = next_frame(&mut customer_rx);
    assert_eq!(resp["status"], "error");
    assert_eq!(resp["error_code"], "RATE_LIMITED");

    let push = next_frame(&mut customer_rx);
    assert_eq!(push["event"], "snapshot");
    assert_eq!(push["signals"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn rate_limited_request_admits_nothing() {
    let h = harness_with(1, 60, 16);

    let admin = Uuid::new_v4();
    let mut admin_rx = h.engine.register_connection(admin).await;

    let line = send_signal_line("BTCUSD", 50_000.0, 49_500.0, 51_000.0, "buy");
    assert!(h.engine.handle_line(admin, &line, 1_000).await);
    assert_eq!(next_frame(&mut admin_rx)["status"], "ok");

    let line = send_signal_line("ETHUSD", 3_000.0, 2_900.0, 3_200.0, "buy");
    assert!(h.engine.handle_line(admin, &line, 1_500).await);

    let resp = next_frame(&mut admin_rx);
    assert_eq!(resp["status"], "error");
    assert_eq!(resp["error_code"], "RATE_LIMITED");

    let customer = Uuid::new_v4();
    let mut customer_rx = h.engine.register_connection(customer).await;
    assert!(h.engine.handle_line(customer, &subscribe_line(), 2_000).await);

    let snapshot = next_frame(&mut customer_rx);
    assert_eq!(snapshot["signals"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn reaper_expires_at_ttl_and_orders_events_per_signal() {
    let h = harness();

    let customer = Uuid::new_v4();
    let mut customer_rx = h.engine.register_connection(customer).await;
    assert!(h.engine.handle_line(customer, &subscribe_line(), 500).await);
    next_frame(&mut customer_rx);

    let admin = Uuid::new_v4();
    let mut admin_rx = h.engine.register_connection(admin).await;
    let line = send_signal_line("BTCUSD", 50_000.0, 49_500.0, 51_000.0, "buy");
    assert!(h.engine.handle_line(admin, &line, 1_000).await);
    next_frame(&mut admin_rx);

    // one tick before the TTL elapses, one after
    h.engine.tick(1_000 + TTL_MS - 1).await;
    let admitted = next_frame(&mut customer_rx);
    assert_eq!(admitted["event"], "signal_admitted");
    assert_empty(&mut customer_rx);

    h.engine.tick(1_000 + TTL_MS + 1).await;
    let expired = next_frame(&mut customer_rx);
    assert_eq!(expired["event"], "signal_expired");
    assert_eq!(expired["signal"]["id"], admitted["signal"]["id"]);

    // expiry is idempotent: a second tick emits nothing
    h.engine.tick(1_000 + TTL_MS + 2).await;
    assert_empty(&mut customer_rx);
}

#[tokio::test]
async fn due_signal_releases_its_slot_on_the_next_admission() {
    let h = harness_full(1, 120, 60, 16);

    let customer = Uuid::new_v4();
    let mut customer_rx = h.engine.register_connection(customer).await;
    assert!(h.engine.handle_line(customer, &subscribe_line(), 500).await);
    next_frame(&mut customer_rx); // snapshot

    let admin = Uuid::new_v4();
    let mut admin_rx = h.engine.register_connection(admin).await;
    let line = send_signal_line("BTCUSD", 50_000.0, 49_500.0, 51_000.0, "buy");
    assert!(h.engine.handle_line(admin, &line, 1_000).await);
    assert_eq!(next_frame(&mut admin_rx)["status"], "ok");

    // the first signal's TTL has elapsed but no reaper tick ran: its
    // expiry transitions inline and the admission fills the freed slot
    let line = send_signal_line("ETHUSD", 3_000.0, 2_900.0, 3_200.0, "buy");
    assert!(h.engine.handle_line(admin, &line, 1_000 + TTL_MS).await);

    let resp = next_frame(&mut admin_rx);
    assert_eq!(resp["status"], "ok");
    assert_eq!(resp["total_active_signals"], 1);

    // the consumer sees the full lifecycle in order
    let admitted = next_frame(&mut customer_rx);
    assert_eq!(admitted["event"], "signal_admitted");
    assert_eq!(admitted["signal"]["symbol"], "BTCUSD");

    let expired = next_frame(&mut customer_rx);
    assert_eq!(expired["event"], "signal_expired");
    assert_eq!(expired["signal"]["id"], admitted["signal"]["id"]);

    let admitted = next_frame(&mut customer_rx);
    assert_eq!(admitted["event"], "signal_admitted");
    assert_eq!(admitted["signal"]["symbol"], "ETHUSD");
}

#[tokio::test]
async fn slow_consumer_is_dropped_without_stalling_others() {
    let h = harness_with(120, 60, 2);

    let customer = Uuid::new_v4();
    let mut customer_rx = h.engine.register_connection(customer).await;
    assert!(h.engine.handle_line(customer, &subscribe_line(), 500).await);

    let admin = Uuid::new_v4();
    let mut admin_rx = h.engine.register_connection(admin).await;
    assert_eq!(h.engine.connection_count().await, 2);

    // the customer never drains: snapshot + first push fill its queue,
    // the second push overflows and drops it
    for (i, symbol) in ["EURUSD", "GBPUSD", "USDJPY"].iter().enumerate() {
        let line = send_signal_line(symbol, 100.0, 99.0, 102.0, "buy");
        assert!(h.engine.handle_line(admin, &line, 1_000 + i as u64).await);
        assert_eq!(next_frame(&mut admin_rx)["status"], "ok");
    }

    assert_eq!(h.engine.connection_count().await, 1);

    // buffered frames drain, then the channel reports disconnection
    next_frame(&mut customer_rx);
    next_frame(&mut customer_rx);
    assert!(matches!(
        customer_rx.try_recv(),
        Err(mpsc::error::TryRecvError::Disconnected)
    ));
}

#[tokio::test]
async fn customer_cannot_invoke_admin_actions() {
    let h = harness();

    let customer = Uuid::new_v4();
    let mut customer_rx = h.engine.register_connection(customer).await;
    assert!(h.engine.handle_line(customer, &subscribe_line(), 500).await);
    next_frame(&mut customer_rx);

    let line = json!({
        "action": "send_signal",
        "symbol": "BTCUSD",
        "price": 50_000.0,
        "sl": 49_500.0,
        "tp": 51_000.0,
        "type": "buy",
    })
    .to_string();
    assert!(h.engine.handle_line(customer, &line, 1_000).await);

    let resp = next_frame(&mut customer_rx);
    assert_eq!(resp["status"], "error");
    assert_eq!(resp["error_code"], "UNAUTHORIZED_ACTION");

    let stats = json!({ "action": "get_stats" }).to_string();
    assert!(h.engine.handle_line(customer, &stats, 1_100).await);
    assert_eq!(next_frame(&mut customer_rx)["error_code"], "UNAUTHORIZED_ACTION");
}

#[tokio::test]
async fn cancel_broadcasts_once_and_rejects_terminal_ids() {
    let h = harness();

    let customer = Uuid::new_v4();
    let mut customer_rx = h.engine.register_connection(customer).await;
    assert!(h.engine.handle_line(customer, &subscribe_line(), 500).await);
    next_frame(&mut customer_rx);

    let admin = Uuid::new_v4();
    let mut admin_rx = h.engine.register_connection(admin).await;
    let line = send_signal_line("BTCUSD", 50_000.0, 49_500.0, 51_000.0, "buy");
    assert!(h.engine.handle_line(admin, &line, 1_000).await);

    let id = next_frame(&mut admin_rx)["signal"]["id"]
        .as_str()
        .unwrap()
        .to_string();
    next_frame(&mut customer_rx); // admitted push

    let cancel = admin_line(json!({ "action": "cancel_signal", "id": id }));
    assert!(h.engine.handle_line(admin, &cancel, 2_000).await);

    let resp = next_frame(&mut admin_rx);
    assert_eq!(resp["status"], "ok");
    assert_eq!(resp["signal"]["state"], "cancelled");

    let push = next_frame(&mut customer_rx);
    assert_eq!(push["event"], "signal_cancelled");

    // cancelling again: the signal is terminal
    assert!(h.engine.handle_line(admin, &cancel, 3_000).await);
    let resp = next_frame(&mut admin_rx);
    assert_eq!(resp["error_code"], "NOT_FOUND");
    assert_eq!(resp["message"], "signal is no longer active");
    assert_empty(&mut customer_rx);

    // unknown id
    let cancel = admin_line(json!({ "action": "cancel_signal", "id": Uuid::new_v4() }));
    assert!(h.engine.handle_line(admin, &cancel, 4_000).await);
    let resp = next_frame(&mut admin_rx);
    assert_eq!(resp["error_code"], "NOT_FOUND");
    assert_eq!(resp["message"], "signal not found");
}

#[tokio::test]
async fn failed_authentication_answers_then_closes() {
    let h = harness();

    let conn = Uuid::new_v4();
    let mut rx = h.engine.register_connection(conn).await;

    let line = json!({
        "client_type": "admin",
        "password": "wrong",
        "action": "subscribe",
    })
    .to_string();
    let keep_open = h.engine.handle_line(conn, &line, 1_000).await;
    assert!(!keep_open);

    let resp = next_frame(&mut rx);
    assert_eq!(resp["status"], "error");
    assert_eq!(resp["error_code"], "AUTH_FAILED");
    assert_close(&mut rx);
}

#[tokio::test]
async fn malformed_lines_get_a_typed_error_and_stay_open() {
    let h = harness();

    let conn = Uuid::new_v4();
    let mut rx = h.engine.register_connection(conn).await;

    assert!(h.engine.handle_line(conn, "{not json", 1_000).await);

    let resp = next_frame(&mut rx);
    assert_eq!(resp["status"], "error");
    assert_eq!(resp["error_code"], "VALIDATION_FAILED");
}

#[tokio::test]
async fn idle_sessions_are_swept_and_closed() {
    let h = harness();

    let customer = Uuid::new_v4();
    let mut customer_rx = h.engine.register_connection(customer).await;
    assert!(h.engine.handle_line(customer, &subscribe_line(), 0).await);
    next_frame(&mut customer_rx);

    h.engine.tick(SESSION_TIMEOUT_MS + 1).await;

    assert_close(&mut customer_rx);
    assert_eq!(h.engine.connection_count().await, 0);
}

#[tokio::test]
async fn history_is_served_from_the_durable_log() {
    let h = harness();

    let admin = Uuid::new_v4();
    let mut admin_rx = h.engine.register_connection(admin).await;

    let line = send_signal_line("BTCUSD", 50_000.0, 49_500.0, 51_000.0, "buy");
    assert!(h.engine.handle_line(admin, &line, 1_000).await);
    let first_id = next_frame(&mut admin_rx)["signal"]["id"]
        .as_str()
        .unwrap()
        .to_string();

    let line = send_signal_line("ETHUSD", 3_000.0, 3_100.0, 2_800.0, "sell");
    assert!(h.engine.handle_line(admin, &line, 2_000).await);
    next_frame(&mut admin_rx);

    // appender runs on its own task
    tokio::time::sleep(Duration::from_millis(50)).await;

    let query = admin_line(json!({ "action": "get_history", "limit": 10 }));
    assert!(h.engine.handle_line(admin, &query, 3_000).await);
    let resp = next_frame(&mut admin_rx);
    assert_eq!(resp["status"], "ok");
    assert_eq!(resp["history"].as_array().unwrap().len(), 2);

    let cancel = admin_line(json!({ "action": "cancel_signal", "id": first_id }));
    assert!(h.engine.handle_line(admin, &cancel, 4_000).await);
    next_frame(&mut admin_rx);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let query = admin_line(json!({ "action": "get_history", "state": "cancelled" }));
    assert!(h.engine.handle_line(admin, &query, 5_000).await);
    let resp = next_frame(&mut admin_rx);
    let history = resp["history"].as_array().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["id"], first_id.as_str());
}

#[tokio::test]
async fn halted_admissions_reject_sends_but_keep_serving_reads() {
    let h = harness();

    h.engine.halt_admissions().await;

    let admin = Uuid::new_v4();
    let mut admin_rx = h.engine.register_connection(admin).await;

    let line = send_signal_line("BTCUSD", 50_000.0, 49_500.0, 51_000.0, "buy");
    assert!(h.engine.handle_line(admin, &line, 1_000).await);

    let resp = next_frame(&mut admin_rx);
    assert_eq!(resp["status"], "error");
    assert_eq!(resp["error_code"], "INTERNAL");
    assert_eq!(resp["message"], "signal admission is temporarily halted");

    let health = admin_line(json!({ "action": "health" }));
    assert!(h.engine.handle_line(admin, &health, 2_000).await);

    let resp = next_frame(&mut admin_rx);
    assert_eq!(resp["status"], "ok");
    assert_eq!(resp["health"]["status"], "degraded");
    assert_eq!(resp["health"]["admissions_halted"], true);
}

#[tokio::test]
async fn stats_reflect_live_state() {
    let h = harness();

    let admin = Uuid::new_v4();
    let mut admin_rx = h.engine.register_connection(admin).await;

    let line = send_signal_line("BTCUSD", 50_000.0, 49_500.0, 51_000.0, "buy");
    assert!(h.engine.handle_line(admin, &line, 1_000).await);
    next_frame(&mut admin_rx);

    let stats = admin_line(json!({ "action": "get_stats" }));
    assert!(h.engine.handle_line(admin, &stats, 2_000).await);

    let resp = next_frame(&mut admin_rx);
    assert_eq!(resp["status"], "ok");
    assert_eq!(resp["stats"]["active_signals_count"], 1);
    assert_eq!(resp["stats"]["active_sessions"], 1);
    assert_eq!(resp["stats"]["connections"], 1);

    let info = resp["stats"]["active_signals_info"].as_array().unwrap();
    assert_eq!(info.len(), 1);
    assert_eq!(info[0]["symbol"], "BTCUSD");
    assert_eq!(info[0]["expires_in_ms"], TTL_MS - 1_000);
}
