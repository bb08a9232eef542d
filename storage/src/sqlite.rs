//! SQLite-backed implementation of the `SignalLog` trait.
//!
//! One row per admitted signal. Admission inserts the row; expiry and
//! cancellation rewrite it with the terminal state via upsert, so the
//! appender does not need to distinguish insert from update.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::str::FromStr;

use signal::model::{Direction, Signal, SignalEvent, SignalState};

use crate::{DEFAULT_HISTORY_LIMIT, HistoryFilter, MAX_HISTORY_LIMIT, SignalLog};

pub struct SqliteSignalLog {
    pool: SqlitePool,
}

impl SqliteSignalLog {
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect and ensure the schema exists.
    pub async fn new(path: &str) -> anyhow::Result<Self> {
        let pool = SqlitePool::connect(path).await?;
        let log = Self { pool };
        log.ensure_schema().await?;
        Ok(log)
    }

    pub async fn ensure_schema(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS signals (
                id TEXT PRIMARY KEY,
                symbol TEXT NOT NULL,
                direction TEXT NOT NULL,

                entry_price REAL NOT NULL,
                stop_loss REAL NOT NULL,
                take_profit REAL NOT NULL,
                risk_reward REAL NOT NULL,

                issued_by TEXT NOT NULL,

                created_at_ms INTEGER NOT NULL,
                expires_at_ms INTEGER NOT NULL,

                state TEXT NOT NULL,
                state_changed_at_ms INTEGER NOT NULL
            );
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_signals_created_at ON signals (created_at_ms)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn decode_row(row: &sqlx::sqlite::SqliteRow) -> anyhow::Result<Signal> {
        let id_str: String = row.get("id");
        let id = uuid::Uuid::parse_str(&id_str)?;

        let issued_by_str: String = row.get("issued_by");
        let issued_by = uuid::Uuid::parse_str(&issued_by_str)?;

        let direction_str: String = row.get("direction");
        let direction = Direction::from_str(&direction_str)
            .map_err(|e| anyhow::anyhow!("Invalid direction '{}': {}", direction_str, e))?;

        let state_str: String = row.get("state");
        let state = SignalState::from_str(&state_str)
            .map_err(|e| anyhow::anyhow!("Invalid signal state '{}': {}", state_str, e))?;

        Ok(Signal {
            id,
            symbol: row.get("symbol"),
            direction,
            entry_price: row.get("entry_price"),
            stop_loss: row.get("stop_loss"),
            take_profit: row.get("take_profit"),
            risk_reward: row.get("risk_reward"),
            issued_by,
            created_at_ms: row.get::<i64, _>("created_at_ms") as u64,
            expires_at_ms: row.get::<i64, _>("expires_at_ms") as u64,
            state,
            state_changed_at_ms: row.get::<i64, _>("state_changed_at_ms") as u64,
        })
    }
}

#[async_trait]
impl SignalLog for SqliteSignalLog {
    async fn append(&self, event: &SignalEvent) -> anyhow::Result<()> {
        let s = event.signal();

        sqlx::query(
            r#"
            INSERT INTO signals (
                id, symbol, direction,
                entry_price, stop_loss, take_profit, risk_reward,
                issued_by,
                created_at_ms, expires_at_ms,
                state, state_changed_at_ms
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                state = excluded.state,
                state_changed_at_ms = excluded.state_changed_at_ms;
        "#,
        )
        .bind(s.id.to_string())
        .bind(&s.symbol)
        .bind(s.direction.to_string())
        .bind(s.entry_price)
        .bind(s.stop_loss)
        .bind(s.take_profit)
        .bind(s.risk_reward)
        .bind(s.issued_by.to_string())
        .bind(s.created_at_ms as i64)
        .bind(s.expires_at_ms as i64)
        .bind(s.state.to_string())
        .bind(s.state_changed_at_ms as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn query_history(&self, filter: HistoryFilter) -> anyhow::Result<Vec<Signal>> {
        // Clamp before the i64 cast: a huge requested limit must not wrap
        // negative, which SQLite reads as "no limit".
        let limit = match filter.limit {
            0 => DEFAULT_HISTORY_LIMIT,
            n => n.min(MAX_HISTORY_LIMIT),
        };

        let rows = match filter.state {
            Some(state) => {
                sqlx::query(
                    "SELECT * FROM signals WHERE state = ? ORDER BY created_at_ms DESC LIMIT ?",
                )
                .bind(state.to_string())
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query("SELECT * FROM signals ORDER BY created_at_ms DESC LIMIT ?")
                    .bind(limit as i64)
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        let mut signals = Vec::with_capacity(rows.len());
        for row in &rows {
            signals.push(Self::decode_row(row)?);
        }

        Ok(signals)
    }
}
