use std::env;

use log::warn;

const DEFAULT_DATABASE_URL: &str = "sqlite:conviction_poll.db";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_USER_ID: &str = "local-user";

/// Runtime settings, read from the environment (and `.env` via dotenvy).
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub max_connections: u32,
    /// Identity votes are recorded under.
    pub user_id: String,
    /// Fixed shuffle seed, for replaying a session's pair order.
    pub shuffle_seed: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            user_id: DEFAULT_USER_ID.to_string(),
            shuffle_seed: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            max_connections: parse_var("DATABASE_MAX_CONNECTIONS").unwrap_or(defaults.max_connections),
            user_id: env::var("POLL_USER_ID").unwrap_or(defaults.user_id),
            shuffle_seed: parse_var("POLL_SHUFFLE_SEED"),
        }
    }

    /// Single-connection in-memory database.
    pub fn in_memory() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            max_connections: 1,
            ..Self::default()
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring {}: cannot parse {:?}", name, raw);
            None
        }
    }
}
