//! Application configuration loaded from environment variables.

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `3000`)
/// - `DATABASE_URL` — Postgres connection string; when unset the server
///   runs on the in-memory store
/// - `PROVIDER_TIMEOUT_SECS` — push acceptance deadline (default: `30`)
/// - `RETRY_COOLDOWN_SECS` — wait between failed attempts (default: `90`)
/// - `MAX_RETRIES` — retry ceiling per invoice (default: `1`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: Option<String>,
    pub provider_timeout_secs: u64,
    pub retry_cooldown_secs: i64,
    pub max_retries: u32,
    pub log_level: String,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            database_url: std::env::var("DATABASE_URL").ok(),
            provider_timeout_secs: std::env::var("PROVIDER_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
            retry_cooldown_secs: std::env::var("RETRY_COOLDOWN_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(90),
            max_retries: std::env::var("MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1),
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The retry policy the orchestrator runs with.
    pub fn retry_policy(&self) -> settlement::RetryPolicy {
        settlement::RetryPolicy {
            max_retries: self.max_retries,
            cooldown: chrono::Duration::seconds(self.retry_cooldown_secs),
        }
    }

    /// How long the orchestrator waits for the provider to accept a push.
    pub fn push_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.provider_timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            database_url: None,
            provider_timeout_secs: 30,
            retry_cooldown_secs: 90,
            max_retries: 1,
            log_level: "info".to_string(),
        }
    }
}
