//! Environment-driven configuration. Every value has a stock default so
//! the server runs with no environment at all; production overrides the
//! secrets and the database URL.

use std::str::FromStr;

use engine::engine::EngineConfig;
use session::rate_limit::{RateLimits, RateScope};
use session::registry::RegistryConfig;
use signal::store::StoreConfig;
use signal::validate::ValidationLimits;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,

    /// Physical connection cap; connections beyond it are refused with a
    /// polite error frame before the socket is closed.
    pub max_connections: usize,

    pub reaper_interval_ms: u64,
    pub log_queue_capacity: usize,

    pub admin_secret: String,
    pub customer_secret: String,
    pub session_timeout_ms: u64,

    pub signal_ttl_ms: u64,
    pub max_active_signals: usize,
    /// How long terminal signals stay queryable in memory.
    pub retention_ms: u64,

    pub admin_rate_per_window: u32,
    pub customer_rate_per_window: u32,
    pub rate_window_ms: u64,
    pub rate_scope: RateScope,

    pub outbound_capacity: usize,
    pub close_on_auth_failure: bool,
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> Self {
        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://signals.db?mode=rwc".to_string());

        let rate_scope = match std::env::var("RATE_LIMIT_SCOPE").as_deref() {
            Ok("per_connection") => RateScope::PerConnection,
            _ => RateScope::PerClientType,
        };

        Self {
            port: env_parse("PORT", 9999),
            database_url,

            max_connections: env_parse("MAX_CONNECTIONS", 100),

            reaper_interval_ms: env_parse("REAPER_INTERVAL_MS", 5_000),
            log_queue_capacity: env_parse("LOG_QUEUE_CAPACITY", 256),

            admin_secret: env_parse("ADMIN_SECRET", "admin123".to_string()),
            customer_secret: env_parse("CUSTOMER_SECRET", "customer123".to_string()),
            session_timeout_ms: env_parse("SESSION_TIMEOUT_MS", 30 * 60 * 1000),

            signal_ttl_ms: env_parse("SIGNAL_TTL_MS", 5 * 60 * 1000),
            max_active_signals: env_parse("MAX_ACTIVE_SIGNALS", 10),
            retention_ms: env_parse("SIGNAL_RETENTION_MS", 60 * 60 * 1000),

            admin_rate_per_window: env_parse("ADMIN_RATE_LIMIT", 120),
            customer_rate_per_window: env_parse("CUSTOMER_RATE_LIMIT", 60),
            rate_window_ms: env_parse("RATE_WINDOW_MS", 60_000),
            rate_scope,

            outbound_capacity: env_parse("OUTBOUND_QUEUE_CAPACITY", 64),
            close_on_auth_failure: env_parse("CLOSE_ON_AUTH_FAILURE", true),
        }
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            ttl_ms: self.signal_ttl_ms,
            max_active: self.max_active_signals,
            retention_ms: self.retention_ms,
            limits: ValidationLimits::default(),
        }
    }

    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            admin_secret: self.admin_secret.clone(),
            customer_secret: self.customer_secret.clone(),
            session_timeout_ms: self.session_timeout_ms,
        }
    }

    pub fn rate_limits(&self) -> RateLimits {
        RateLimits {
            admin_per_window: self.admin_rate_per_window,
            customer_per_window: self.customer_rate_per_window,
            window_ms: self.rate_window_ms,
            scope: self.rate_scope,
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            outbound_capacity: self.outbound_capacity,
            close_on_auth_failure: self.close_on_auth_failure,
        }
    }
}
