// Configuration for the indexer core.
// Reads from environment variables with sensible defaults.

use std::env;
use std::sync::OnceLock;

static CONFIG: OnceLock<Config> = OnceLock::new();

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Size cap for indexed files in bytes (FLYTO_MAX_FILE_BYTES).
    pub max_file_bytes: u64,

    /// Per-file parse timeout in seconds (FLYTO_PARSE_TIMEOUT_SECS).
    pub parse_timeout_secs: u64,

    /// Default impact traversal depth (FLYTO_IMPACT_DEPTH).
    pub impact_depth: usize,

    /// Session event ring buffer capacity (FLYTO_SESSION_CAPACITY).
    pub session_capacity: usize,

    /// Parser worker threads, 0 = one per core (FLYTO_WORKERS).
    pub workers: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_file_bytes: 1024 * 1024,
            parse_timeout_secs: 10,
            impact_depth: 2,
            session_capacity: 128,
            workers: 0,
        }
    }
}

impl Config {
    fn from_env() -> Self {
        let mut config = Config::default();
        read_env("FLYTO_MAX_FILE_BYTES", &mut config.max_file_bytes);
        read_env("FLYTO_PARSE_TIMEOUT_SECS", &mut config.parse_timeout_secs);
        read_env("FLYTO_IMPACT_DEPTH", &mut config.impact_depth);
        read_env("FLYTO_SESSION_CAPACITY", &mut config.session_capacity);
        read_env("FLYTO_WORKERS", &mut config.workers);
        config
    }

    pub fn get() -> &'static Config {
        CONFIG.get_or_init(Config::from_env)
    }

    pub fn worker_count(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }
}

fn read_env<T: std::str::FromStr + std::fmt::Display>(name: &str, slot: &mut T) {
    if let Ok(val) = env::var(name) {
        match val.parse() {
            Ok(parsed) => *slot = parsed,
            Err(_) => {
                tracing::warn!("invalid {name} value {val:?}, using default {slot}");
            }
        }
    }
}
