//! Server configuration module
//! Handles dynamic configuration parameters for the relay server

use crate::constants::{
    DEFAULT_HOST, DEFAULT_MAX_CLIENTS, DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_PORT,
    DEFAULT_RATE_LIMIT_COOLDOWN_SECS, DEFAULT_STOP_KEYWORD, DEFAULT_WORKER_THREADS,
};
use crate::error::{RelayError, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Server configuration parameters
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Maximum number of concurrently admitted clients
    pub max_clients: usize,
    /// Minimum delay between two accepted messages from one client
    pub rate_limit_cooldown: Duration,
    /// Maximum frame size, terminator included
    pub max_message_size: usize,
    /// Acknowledgment sent back after a relayed message; `None` uses the default notice
    pub server_message: Option<String>,
    /// Operator command that shuts the server down
    pub stop_keyword: String,
    /// Number of worker threads in the runtime
    pub worker_threads: usize,
}

impl ServerConfig {
    /// Loopback configuration on an ephemeral port, for tests
    pub fn for_testing() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            max_clients: DEFAULT_MAX_CLIENTS,
            rate_limit_cooldown: Duration::from_secs(DEFAULT_RATE_LIMIT_COOLDOWN_SECS),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            server_message: None,
            stop_keyword: DEFAULT_STOP_KEYWORD.to_string(),
            worker_threads: 2,
        }
    }

    /// Address string suitable for `TcpListener::bind`
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Load configuration from environment variables if available
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup("RUSTY_RELAY_HOST").unwrap_or(DEFAULT_HOST.to_string());
        let port = parse_var(&lookup, "RUSTY_RELAY_PORT", DEFAULT_PORT)?;
        let max_clients = parse_var(&lookup, "RUSTY_RELAY_MAX_CLIENTS", DEFAULT_MAX_CLIENTS)?;
        let cooldown_secs = parse_var(
            &lookup,
            "RUSTY_RELAY_COOLDOWN_SECS",
            DEFAULT_RATE_LIMIT_COOLDOWN_SECS,
        )?;
        let max_message_size =
            parse_var(&lookup, "RUSTY_RELAY_BUFFER", DEFAULT_MAX_MESSAGE_SIZE)?;
        let worker_threads =
            parse_var(&lookup, "RUSTY_RELAY_WORKER_THREADS", DEFAULT_WORKER_THREADS)?;

        // An empty template means "use the default acknowledgment"
        let server_message = lookup("RUSTY_RELAY_SERVER_MESSAGE").filter(|m| !m.is_empty());

        let stop_keyword = lookup("RUSTY_RELAY_STOP_KEYWORD")
            .map(|k| k.trim().to_string())
            .unwrap_or(DEFAULT_STOP_KEYWORD.to_string());

        let config = Self {
            host,
            port,
            max_clients,
            rate_limit_cooldown: Duration::from_secs(cooldown_secs),
            max_message_size,
            server_message,
            stop_keyword,
            worker_threads,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values the relay cannot operate with
    pub fn validate(&self) -> Result<()> {
        if self.max_clients == 0 {
            return Err(RelayError::ConfigError(
                "RUSTY_RELAY_MAX_CLIENTS must be at least 1".to_string(),
            ));
        }

        // One payload byte plus the terminator
        if self.max_message_size < 2 {
            return Err(RelayError::ConfigError(format!(
                "RUSTY_RELAY_BUFFER must be at least 2 bytes, got {}",
                self.max_message_size
            )));
        }

        if self.stop_keyword.is_empty() {
            return Err(RelayError::ConfigError(
                "RUSTY_RELAY_STOP_KEYWORD must not be empty".to_string(),
            ));
        }

        if self.worker_threads == 0 {
            return Err(RelayError::ConfigError(
                "RUSTY_RELAY_WORKER_THREADS must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| {
            RelayError::ConfigError(format!("{} has an invalid value: '{}'", key, raw))
        }),
        None => Ok(default),
    }
}
