//! Chat message types for the Sportify chat server.
//!
//! This module defines the data flowing through the chat hub. Messages are
//! stamped by the hub with the sender's identity and a timestamp, and are
//! immutable once stamped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A validated chat participant.
///
/// Built by the HTTP layer after it has authenticated the user and confirmed
/// their membership in the event. The hub trusts these values and performs no
/// authorization of its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    /// The event whose chat room the participant joins.
    pub event_id: i64,

    /// The participant's user ID.
    pub user_id: i64,

    /// Display name resolved once at connect time.
    pub username: String,
}

impl Participant {
    /// Creates a new participant identity.
    ///
    /// # Example
    ///
    /// ```
    /// use sportify_chat_server::types::Participant;
    ///
    /// let alice = Participant::new(7, 1, "Alice Smith");
    /// assert_eq!(alice.event_id, 7);
    /// ```
    pub fn new(event_id: i64, user_id: i64, username: impl Into<String>) -> Self {
        Self {
            event_id,
            user_id,
            username: username.into(),
        }
    }
}

/// A chat message as stored in history and sent to clients.
///
/// Every field except `content` is assigned by the hub; values supplied by
/// the client for them are discarded.
///
/// # Example
///
/// ```
/// use sportify_chat_server::types::ChatMessage;
/// use chrono::Utc;
///
/// let message = ChatMessage {
///     event_id: 7,
///     user_id: 1,
///     username: "Alice Smith".to_string(),
///     content: "hi".to_string(),
///     timestamp: Utc::now(),
/// };
///
/// let json = serde_json::to_value(&message).unwrap();
/// assert_eq!(json["eventId"], 7);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Event the message belongs to.
    pub event_id: i64,

    /// Author's user ID.
    pub user_id: i64,

    /// Author's display name.
    pub username: String,

    /// Message body as sent by the author.
    pub content: String,

    /// RFC 3339 UTC timestamp assigned when the hub processed the message.
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    /// Stamps `content` from `author` with the given timestamp.
    pub fn stamped(author: &Participant, content: String, timestamp: DateTime<Utc>) -> Self {
        Self {
            event_id: author.event_id,
            user_id: author.user_id,
            username: author.username.clone(),
            content,
            timestamp,
        }
    }
}

/// A message as decoded from an inbound frame.
///
/// Clients send the same wire shape they receive, but only `content` is
/// honoured. Unknown and identity fields are ignored; a missing `content`
/// decodes as an empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct InboundMessage {
    #[serde(default)]
    pub content: String,
}

impl InboundMessage {
    /// Decodes one inbound frame.
    ///
    /// # Errors
    ///
    /// Returns the JSON error if the frame is not an object or `content` is
    /// not a string.
    pub fn decode(frame: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(frame)
    }
}
