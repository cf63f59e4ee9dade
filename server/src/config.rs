//! Server configuration module.
//!
//! Parses configuration from environment variables for the chat server.
//!
//! # Environment Variables
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `SPORTIFY_CHAT_TOKENS` | Yes* | - | Format: `token1:user_id:Display Name,token2:...` |
//! | `SPORTIFY_CHAT_ROSTERS` | No | - | Format: `event_id:user_id\|user_id,event_id:...` |
//! | `PORT` | No | 8080 | HTTP server port |
//! | `SPORTIFY_CHAT_HISTORY` | No | 100 | Messages retained per event |
//! | `SPORTIFY_CHAT_WRITE_TIMEOUT_MS` | No | 5000 | Deadline for one outbound write |
//! | `SPORTIFY_CHAT_QUEUE` | No | 64 | Hub command queue capacity |
//! | `SPORTIFY_CHAT_MAX_MESSAGE_BYTES` | No | 65536 | Largest accepted inbound frame |
//! | `SPORTIFY_UNSAFE_NO_AUTH` | No | false | Disable token checks (dev only) |
//!
//! *Not required if `SPORTIFY_UNSAFE_NO_AUTH=true`

use std::collections::{HashMap, HashSet};
use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use crate::history::DEFAULT_HISTORY_CAPACITY;
use crate::hub::{HubConfig, DEFAULT_QUEUE_CAPACITY, DEFAULT_WRITE_TIMEOUT};

/// Default HTTP server port.
const DEFAULT_PORT: u16 = 8080;

/// Default maximum inbound frame size (64 KiB).
const DEFAULT_MAX_MESSAGE_BYTES: usize = 64 * 1024;

/// Errors that can occur when parsing configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    /// Environment variable has invalid format.
    #[error("invalid format for {var}: {message}")]
    InvalidFormat { var: String, message: String },

    /// Numeric environment variable could not be parsed.
    #[error("invalid number for {var}: {value}")]
    InvalidNumber { var: String, value: String },

    /// Configuration validation failed.
    #[error("configuration validation failed: {0}")]
    ValidationError(String),
}

/// A chat user known to the static directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserEntry {
    /// Stable user ID.
    pub user_id: i64,

    /// Display name shown in chat.
    pub username: String,
}

/// Server configuration parsed from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port.
    pub port: u16,

    /// Messages retained per event.
    pub history_capacity: usize,

    /// Deadline for a single outbound write.
    pub write_timeout: Duration,

    /// Hub command queue capacity.
    pub queue_capacity: usize,

    /// Largest inbound WebSocket message accepted.
    pub max_message_bytes: usize,

    /// Map of access token to the user it authenticates.
    pub tokens: HashMap<String, UserEntry>,

    /// Map of event ID to the user IDs participating in it.
    pub rosters: HashMap<i64, HashSet<i64>>,

    /// When true, disables token checks (development only).
    pub unsafe_no_auth: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            tokens: HashMap::new(),
            rosters: HashMap::new(),
            unsafe_no_auth: false,
        }
    }
}

impl Config {
    /// Parse configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - `SPORTIFY_CHAT_TOKENS` is missing (when `SPORTIFY_UNSAFE_NO_AUTH` is not true)
    /// - Environment variables have invalid format
    /// - A numeric value does not parse or is zero where that is meaningless
    ///
    /// # Example
    ///
    /// ```no_run
    /// use sportify_chat_server::config::Config;
    ///
    /// let config = Config::from_env().expect("Failed to load config");
    /// println!("Server will listen on port {}", config.port);
    /// ```
    pub fn from_env() -> Result<Self, ConfigError> {
        let write_timeout_ms: u64 = parse_number(
            "SPORTIFY_CHAT_WRITE_TIMEOUT_MS",
            DEFAULT_WRITE_TIMEOUT.as_millis() as u64,
        )?;

        let config = Self {
            port: parse_number("PORT", DEFAULT_PORT)?,
            history_capacity: parse_number("SPORTIFY_CHAT_HISTORY", DEFAULT_HISTORY_CAPACITY)?,
            write_timeout: Duration::from_millis(write_timeout_ms),
            queue_capacity: parse_number("SPORTIFY_CHAT_QUEUE", DEFAULT_QUEUE_CAPACITY)?,
            max_message_bytes: parse_number(
                "SPORTIFY_CHAT_MAX_MESSAGE_BYTES",
                DEFAULT_MAX_MESSAGE_BYTES,
            )?,
            tokens: parse_tokens()?,
            rosters: parse_rosters()?,
            unsafe_no_auth: parse_bool_env("SPORTIFY_UNSAFE_NO_AUTH"),
        };

        config.validate()?;

        if config.unsafe_no_auth {
            warn!(
                "SPORTIFY_UNSAFE_NO_AUTH is enabled - chat identities are taken from the \
                 query string. Do not use in production!"
            );
        }

        Ok(config)
    }

    /// Returns the hub tunables derived from this configuration.
    #[must_use]
    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            history_capacity: self.history_capacity,
            write_timeout: self.write_timeout,
            queue_capacity: self.queue_capacity,
        }
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.history_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "SPORTIFY_CHAT_HISTORY must be at least 1".to_string(),
            ));
        }

        if self.write_timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "SPORTIFY_CHAT_WRITE_TIMEOUT_MS must be at least 1".to_string(),
            ));
        }

        if self.queue_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "SPORTIFY_CHAT_QUEUE must be at least 1".to_string(),
            ));
        }

        if self.unsafe_no_auth {
            return Ok(());
        }

        if self.tokens.is_empty() {
            return Err(ConfigError::MissingEnvVar(
                "SPORTIFY_CHAT_TOKENS".to_string(),
            ));
        }

        Ok(())
    }
}

/// Parse a boolean environment variable.
///
/// Returns `true` if the variable is set to "true" (case-insensitive),
/// `false` otherwise.
fn parse_bool_env(name: &str) -> bool {
    env::var(name)
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Parse a numeric environment variable, falling back to `default` when unset.
fn parse_number<T: FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value.trim().parse().map_err(|_| ConfigError::InvalidNumber {
            var: name.to_string(),
            value,
        }),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(env::VarError::NotUnicode(_)) => Err(ConfigError::InvalidFormat {
            var: name.to_string(),
            message: "contains invalid unicode".to_string(),
        }),
    }
}

/// Parse the SPORTIFY_CHAT_TOKENS environment variable.
///
/// Expected format: `token1:user_id:Display Name,token2:user_id:Display Name`.
fn parse_tokens() -> Result<HashMap<String, UserEntry>, ConfigError> {
    const VAR: &str = "SPORTIFY_CHAT_TOKENS";

    let tokens_str = match env::var(VAR) {
        Ok(s) if !s.is_empty() => s,
        _ => return Ok(HashMap::new()),
    };

    let mut tokens = HashMap::new();

    for entry in tokens_str.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }

        let parts: Vec<&str> = entry.splitn(3, ':').map(str::trim).collect();
        let &[token, user_id, username] = parts.as_slice() else {
            return Err(ConfigError::InvalidFormat {
                var: VAR.to_string(),
                message: "expected 'token:user_id:display name' format".to_string(),
            });
        };

        if token.is_empty() {
            return Err(ConfigError::InvalidFormat {
                var: VAR.to_string(),
                message: "token cannot be empty".to_string(),
            });
        }

        let user_id: i64 = user_id.parse().map_err(|_| ConfigError::InvalidFormat {
            var: VAR.to_string(),
            message: format!("invalid user id '{user_id}'"),
        })?;

        if username.is_empty() {
            return Err(ConfigError::InvalidFormat {
                var: VAR.to_string(),
                message: format!("display name for user {user_id} cannot be empty"),
            });
        }

        tokens.insert(
            token.to_string(),
            UserEntry {
                user_id,
                username: username.to_string(),
            },
        );
    }

    Ok(tokens)
}

/// Parse the SPORTIFY_CHAT_ROSTERS environment variable.
///
/// Expected format: `event_id:user_id|user_id,event_id:user_id`.
fn parse_rosters() -> Result<HashMap<i64, HashSet<i64>>, ConfigError> {
    const VAR: &str = "SPORTIFY_CHAT_ROSTERS";

    let rosters_str = match env::var(VAR) {
        Ok(s) if !s.is_empty() => s,
        _ => return Ok(HashMap::new()),
    };

    let mut rosters: HashMap<i64, HashSet<i64>> = HashMap::new();

    for entry in rosters_str.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }

        let Some((event_id, members)) = entry.split_once(':') else {
            return Err(ConfigError::InvalidFormat {
                var: VAR.to_string(),
                message: format!("expected 'event_id:user_id|user_id' format, got '{entry}'"),
            });
        };

        let event_id: i64 = event_id.trim().parse().map_err(|_| ConfigError::InvalidFormat {
            var: VAR.to_string(),
            message: format!("invalid event id '{}'", event_id.trim()),
        })?;

        let roster = rosters.entry(event_id).or_default();
        for member in members.split('|').map(str::trim).filter(|m| !m.is_empty()) {
            let user_id: i64 = member.parse().map_err(|_| ConfigError::InvalidFormat {
                var: VAR.to_string(),
                message: format!("invalid user id '{member}' for event {event_id}"),
            })?;
            roster.insert(user_id);
        }
    }

    Ok(rosters)
}
