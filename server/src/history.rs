//! Bounded per-event chat history.
//!
//! Each event keeps the most recent messages in broadcast order so newly
//! joined clients can catch up. Once an event's log reaches capacity the
//! oldest message is dropped for every new one (FIFO eviction). Eviction is
//! expected behaviour, not an error.
//!
//! # Example
//!
//! ```rust
//! use sportify_chat_server::history::MessageLog;
//! use sportify_chat_server::types::{ChatMessage, Participant};
//! use chrono::Utc;
//!
//! let author = Participant::new(9, 1, "Alice");
//! let mut log = MessageLog::new(2);
//!
//! for content in ["m1", "m2", "m3"] {
//!     log.append(ChatMessage::stamped(&author, content.to_string(), Utc::now()));
//! }
//!
//! let replay: Vec<_> = log.replay(9).map(|m| m.content.as_str()).collect();
//! assert_eq!(replay, ["m2", "m3"]);
//! ```

use std::collections::{HashMap, VecDeque};

use tracing::trace;

use crate::types::ChatMessage;

/// Default number of messages retained per event.
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// Per-event FIFO message log with a fixed capacity.
///
/// Owned by the hub's coordination loop; it performs no synchronization of
/// its own.
#[derive(Debug, Clone)]
pub struct MessageLog {
    events: HashMap<i64, VecDeque<ChatMessage>>,
    capacity: usize,
}

impl MessageLog {
    /// Creates an empty log keeping at most `capacity` messages per event.
    ///
    /// A capacity of zero is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            events: HashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Returns the per-event capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Appends a message to its event's log.
    ///
    /// # Returns
    ///
    /// The number of messages evicted to make room (0 or 1).
    pub fn append(&mut self, message: ChatMessage) -> usize {
        let event_id = message.event_id;
        let capacity = self.capacity;
        let log = self
            .events
            .entry(event_id)
            .or_insert_with(|| VecDeque::with_capacity(capacity.min(16)));

        let mut evicted = 0;
        while log.len() >= capacity {
            log.pop_front();
            evicted += 1;
        }
        log.push_back(message);

        if evicted > 0 {
            trace!(event_id, evicted, "History full, oldest messages evicted");
        }

        evicted
    }

    /// Iterates an event's history from oldest to newest.
    pub fn replay(&self, event_id: i64) -> impl Iterator<Item = &ChatMessage> {
        self.events.get(&event_id).into_iter().flatten()
    }

    /// Returns a copy of an event's history, oldest first.
    #[must_use]
    pub fn snapshot(&self, event_id: i64) -> Vec<ChatMessage> {
        self.replay(event_id).cloned().collect()
    }

    /// Returns the number of messages retained for an event.
    #[must_use]
    pub fn len(&self, event_id: i64) -> usize {
        self.events.get(&event_id).map_or(0, VecDeque::len)
    }

    /// Returns `true` if no message has been retained for any event.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.values().all(VecDeque::is_empty)
    }
}

impl Default for MessageLog {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}
