//! Participant resolution for chat connections.
//!
//! Before a WebSocket is handed to the hub, the HTTP layer resolves the
//! caller's access token into a [`Participant`]: who they are and which
//! event room they may join. The hub itself trusts whatever identity it is
//! given, so this is the only place where identity is established.
//!
//! [`StaticDirectory`] is the built-in implementation, populated from the
//! `SPORTIFY_CHAT_TOKENS` and `SPORTIFY_CHAT_ROSTERS` environment variables.
//! Deployments backed by a user database implement [`ParticipantDirectory`]
//! themselves.
//!
//! # Example
//!
//! ```rust
//! use std::collections::{HashMap, HashSet};
//! use sportify_chat_server::config::UserEntry;
//! use sportify_chat_server::directory::{AccessError, ParticipantDirectory, StaticDirectory};
//!
//! let mut tokens = HashMap::new();
//! tokens.insert(
//!     "tok-a".to_string(),
//!     UserEntry { user_id: 1, username: "Alice".to_string() },
//! );
//! let rosters = HashMap::from([(7, HashSet::from([1]))]);
//!
//! let directory = StaticDirectory::new(tokens, rosters);
//! let alice = directory.resolve("tok-a", 7).unwrap();
//! assert_eq!(alice.username, "Alice");
//!
//! assert_eq!(directory.resolve("tok-a", 8), Err(AccessError::NotParticipant));
//! ```

use std::collections::{HashMap, HashSet};

use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::config::{Config, UserEntry};
use crate::types::Participant;

/// Reasons a chat connection is refused before upgrade.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AccessError {
    /// No token was presented.
    #[error("missing access token")]
    MissingToken,

    /// The token does not belong to any known user.
    #[error("invalid access token")]
    InvalidToken,

    /// The user is known but is not a participant of the event.
    #[error("user is not a participant of this event")]
    NotParticipant,
}

impl AccessError {
    /// Returns `true` if the caller failed to authenticate.
    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, Self::MissingToken | Self::InvalidToken)
    }

    /// Machine-readable code used in HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingToken => "missing_token",
            Self::InvalidToken => "invalid_token",
            Self::NotParticipant => "not_participant",
        }
    }
}

/// Resolves access tokens into chat participants.
pub trait ParticipantDirectory: Send + Sync {
    /// Resolves `token` into the participant allowed into `event_id`'s room.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError`] when the token is empty, unknown, or its
    /// owner is not on the event's roster.
    fn resolve(&self, token: &str, event_id: i64) -> Result<Participant, AccessError>;
}

/// In-memory directory of tokens and event rosters.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    tokens: Vec<(String, UserEntry)>,
    rosters: HashMap<i64, HashSet<i64>>,
}

impl StaticDirectory {
    /// Builds a directory from explicit token and roster maps.
    pub fn new(tokens: HashMap<String, UserEntry>, rosters: HashMap<i64, HashSet<i64>>) -> Self {
        Self {
            tokens: tokens.into_iter().collect(),
            rosters,
        }
    }

    /// Builds a directory from the server configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.tokens.clone(), config.rosters.clone())
    }

    /// Looks up a token, comparing against every entry in constant time.
    fn lookup(&self, token: &str) -> Option<&UserEntry> {
        let presented = token.as_bytes();
        let mut found = None;

        for (known, user) in &self.tokens {
            if bool::from(known.as_bytes().ct_eq(presented)) {
                found = Some(user);
            }
        }

        found
    }
}

impl ParticipantDirectory for StaticDirectory {
    fn resolve(&self, token: &str, event_id: i64) -> Result<Participant, AccessError> {
        if token.is_empty() {
            return Err(AccessError::MissingToken);
        }

        let user = self.lookup(token).ok_or(AccessError::InvalidToken)?;

        let allowed = self
            .rosters
            .get(&event_id)
            .is_some_and(|members| members.contains(&user.user_id));
        if !allowed {
            return Err(AccessError::NotParticipant);
        }

        Ok(Participant::new(event_id, user.user_id, user.username.clone()))
    }
}
