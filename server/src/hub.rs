//! Real-time event chat hub.
//!
//! The hub is an actor: a single coordination loop ([`Coordinator`]) owns the
//! set of connected clients and the per-event [`MessageLog`], and every state
//! change reaches it as a command over one bounded channel. Registration,
//! unregistration and broadcast are therefore totally ordered and need no
//! locking.
//!
//! # Architecture
//!
//! - [`ChatHub`] - Cloneable handle used by connection tasks to submit commands
//! - [`Coordinator`] - The loop itself; [`Coordinator::run`] consumes it, so it
//!   can only be started once
//!
//! Each connection is driven by [`ChatHub::connect`], which registers the
//! client, waits for its history replay, then feeds inbound messages back to
//! the loop until the connection ends. All outbound writes (replay, live
//! broadcast, close) happen inside the loop and are bounded by
//! [`HubConfig::write_timeout`], so one stalled client cannot hold fan-out to
//! the others for longer than that.
//!
//! # Example
//!
//! ```rust,no_run
//! use sportify_chat_server::hub::{ChatHub, HubConfig};
//! use sportify_chat_server::transport::Transport;
//! use sportify_chat_server::types::Participant;
//!
//! # async fn example(transport: Transport) {
//! let (hub, _loop_handle) = ChatHub::spawn(HubConfig::default());
//!
//! // Returns once the connection is over.
//! let _ = hub.connect(transport, Participant::new(7, 1, "Alice Smith")).await;
//! # }
//! ```

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use futures_util::future::join_all;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use crate::error::{HubError, TransportError};
use crate::history::{MessageLog, DEFAULT_HISTORY_CAPACITY};
use crate::transport::{FrameSink, Transport};
use crate::types::{ChatMessage, InboundMessage, Participant};

/// Default deadline for a single outbound write (5 seconds).
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default capacity of the hub's command queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Tunables for the chat hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubConfig {
    /// Maximum number of messages retained per event.
    pub history_capacity: usize,

    /// Deadline applied to each outbound delivery, replay and close.
    pub write_timeout: Duration,

    /// Number of commands that may wait for the loop before submitters block.
    pub queue_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Read-only questions answered by the coordination loop.
enum Query {
    ClientCount(oneshot::Sender<usize>),
    EventClientCount(i64, oneshot::Sender<usize>),
    History(i64, oneshot::Sender<Vec<ChatMessage>>),
}

enum Command {
    Register {
        client: Client,
        accepted: oneshot::Sender<()>,
    },
    Unregister {
        id: Uuid,
    },
    Broadcast {
        author: Participant,
        content: String,
    },
    Query(Query),
    Shutdown,
}

/// One live chat connection, as held by the coordination loop.
struct Client {
    id: Uuid,
    participant: Participant,
    sink: FrameSink,
    /// Dropped together with the client; wakes the connection's read loop.
    _evicted: oneshot::Sender<()>,
}

/// Handle to a running chat hub.
///
/// Cheap to clone; every clone submits to the same coordination loop.
#[derive(Debug, Clone)]
pub struct ChatHub {
    commands: mpsc::Sender<Command>,
}

impl ChatHub {
    /// Creates a hub handle and the coordination loop that serves it.
    ///
    /// Nothing is processed until [`Coordinator::run`] is awaited; submissions
    /// made before that wait in the bounded queue.
    #[must_use]
    pub fn new(config: HubConfig) -> (Self, Coordinator) {
        let (commands, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let coordinator = Coordinator {
            commands: receiver,
            clients: HashMap::new(),
            history: MessageLog::new(config.history_capacity),
            write_timeout: config.write_timeout,
        };
        (Self { commands }, coordinator)
    }

    /// Creates a hub and runs its coordination loop on a new tokio task.
    #[must_use]
    pub fn spawn(config: HubConfig) -> (Self, JoinHandle<()>) {
        let (hub, coordinator) = Self::new(config);
        (hub, tokio::spawn(coordinator.run()))
    }

    /// Runs one chat session for an already-authorized participant.
    ///
    /// Registers the client, waits until the loop has replayed the event's
    /// history to it, then decodes inbound frames into broadcasts until the
    /// peer disconnects, a frame fails to decode, the client is evicted, or
    /// the hub shuts down. The client is always unregistered before this
    /// returns, and its transport is closed exactly once.
    ///
    /// # Errors
    ///
    /// - [`HubError::Closed`] if the coordination loop is not accepting work
    /// - [`HubError::Rejected`] if history replay to the client failed
    ///
    /// Ending the session for any other reason is not an error.
    pub async fn connect(
        &self,
        transport: Transport,
        participant: Participant,
    ) -> Result<(), HubError> {
        let id = Uuid::new_v4();
        let (sink, mut frames) = transport.into_parts();
        let (evicted_tx, mut evicted) = oneshot::channel();
        let (accepted_tx, accepted) = oneshot::channel();

        let client = Client {
            id,
            participant: participant.clone(),
            sink,
            _evicted: evicted_tx,
        };
        self.submit(Command::Register {
            client,
            accepted: accepted_tx,
        })
        .await?;

        // The ack is dropped unanswered when the loop stops first.
        if accepted.await.is_err() {
            return if self.commands.is_closed() {
                Err(HubError::Closed)
            } else {
                Err(HubError::Rejected)
            };
        }

        debug!(
            client_id = %id,
            event_id = participant.event_id,
            user_id = participant.user_id,
            "Chat session started"
        );

        let reason = loop {
            tokio::select! {
                _ = &mut evicted => break "evicted",
                frame = frames.next() => match frame {
                    Some(Ok(bytes)) => match InboundMessage::decode(&bytes) {
                        Ok(inbound) => {
                            let command = Command::Broadcast {
                                author: participant.clone(),
                                content: inbound.content,
                            };
                            if self.submit(command).await.is_err() {
                                break "hub stopped";
                            }
                        }
                        Err(err) => {
                            // The error text may quote the payload; log its shape only.
                            debug!(
                                client_id = %id,
                                category = ?err.classify(),
                                column = err.column(),
                                "Failed to decode chat message"
                            );
                            break "decode error";
                        }
                    },
                    Some(Err(TransportError::Closed)) | None => break "peer closed",
                    Some(Err(err)) => {
                        debug!(client_id = %id, error = %err, "Chat transport error");
                        break "transport error";
                    }
                },
            }
        };

        // Idempotent: a no-op if the loop already evicted this client.
        let _ = self.submit(Command::Unregister { id }).await;

        debug!(client_id = %id, reason, "Chat session ended");
        Ok(())
    }

    /// Returns the number of registered clients across all events.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Closed`] if the coordination loop has stopped.
    pub async fn client_count(&self) -> Result<usize, HubError> {
        self.query(Query::ClientCount).await
    }

    /// Returns the number of registered clients for one event.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Closed`] if the coordination loop has stopped.
    pub async fn event_client_count(&self, event_id: i64) -> Result<usize, HubError> {
        self.query(|reply| Query::EventClientCount(event_id, reply))
            .await
    }

    /// Returns a snapshot of an event's retained history, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Closed`] if the coordination loop has stopped.
    pub async fn history(&self, event_id: i64) -> Result<Vec<ChatMessage>, HubError> {
        self.query(|reply| Query::History(event_id, reply)).await
    }

    /// Stops the coordination loop, closing every client connection.
    ///
    /// Waits until the loop stops accepting submissions. Calling this on a
    /// hub that has already stopped is a no-op.
    pub async fn shutdown(&self) {
        if self.commands.send(Command::Shutdown).await.is_ok() {
            self.commands.closed().await;
        }
    }

    /// Returns `true` while the coordination loop accepts submissions.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }

    async fn submit(&self, command: Command) -> Result<(), HubError> {
        self.commands.send(command).await.map_err(|_| HubError::Closed)
    }

    async fn query<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Query) -> Result<T, HubError> {
        let (reply, answer) = oneshot::channel();
        self.submit(Command::Query(build(reply))).await?;
        answer.await.map_err(|_| HubError::Closed)
    }
}

/// The hub's coordination loop: sole owner of clients and history.
pub struct Coordinator {
    commands: mpsc::Receiver<Command>,
    clients: HashMap<Uuid, Client>,
    history: MessageLog,
    write_timeout: Duration,
}

impl Coordinator {
    /// Services commands one at a time, in arrival order, until
    /// [`ChatHub::shutdown`] is called or every handle has been dropped.
    pub async fn run(mut self) {
        info!(
            history_capacity = self.history.capacity(),
            write_timeout_ms = self.write_timeout.as_millis() as u64,
            "Chat hub started"
        );

        while let Some(command) = self.commands.recv().await {
            match command {
                Command::Register { client, accepted } => {
                    let id = client.id;
                    if self.register(client).await {
                        // The session may have given up waiting; nothing to undo.
                        let _ = accepted.send(());
                    } else {
                        trace!(client_id = %id, "Registration rejected");
                    }
                }
                Command::Unregister { id } => {
                    if self.remove(id).await {
                        debug!(client_id = %id, clients = self.clients.len(), "Client unregistered");
                    }
                }
                Command::Broadcast { author, content } => self.broadcast(&author, content).await,
                Command::Query(query) => self.answer(query),
                Command::Shutdown => {
                    info!("Chat hub shutdown requested");
                    break;
                }
            }
        }

        self.stop().await;
        info!("Chat hub stopped");
    }

    /// Adds a client and replays its event's history to it.
    ///
    /// Returns `false` if replay failed and the client was evicted again.
    async fn register(&mut self, client: Client) -> bool {
        let id = client.id;
        let participant = client.participant.clone();

        let replay: Vec<String> = self
            .history
            .replay(participant.event_id)
            .filter_map(encode)
            .collect();
        let replayed = replay.len();

        self.clients.insert(id, client);
        info!(
            client_id = %id,
            event_id = participant.event_id,
            user_id = participant.user_id,
            clients = self.clients.len(),
            "Client registered"
        );

        if replay.is_empty() {
            return true;
        }

        let write_timeout = self.write_timeout;
        let outcome = match self.clients.get_mut(&id) {
            Some(client) => timeout(write_timeout, deliver(&mut client.sink, replay)).await,
            None => return false,
        };

        match outcome {
            Ok(Ok(())) => {
                trace!(client_id = %id, replayed, "History replayed");
                true
            }
            Ok(Err(err)) => {
                debug!(client_id = %id, error = %err, "History replay failed, evicting client");
                self.evict(id);
                false
            }
            Err(_) => {
                warn!(client_id = %id, "History replay timed out, evicting client");
                self.evict(id);
                false
            }
        }
    }

    /// Stamps, records and fans out one message.
    async fn broadcast(&mut self, author: &Participant, content: String) {
        let message = ChatMessage::stamped(author, content, Utc::now());
        let event_id = message.event_id;

        let Some(frame) = encode(&message) else {
            return;
        };
        self.history.append(message);

        let write_timeout = self.write_timeout;
        let deliveries = self
            .clients
            .values_mut()
            .filter(|client| client.participant.event_id == event_id)
            .map(|client| {
                let frame = frame.clone();
                async move {
                    let outcome = timeout(write_timeout, deliver(&mut client.sink, [frame])).await;
                    (client.id, outcome)
                }
            });
        let outcomes = join_all(deliveries).await;

        let mut delivered = 0usize;
        let mut failed = Vec::new();
        for (id, outcome) in outcomes {
            match outcome {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(err)) => {
                    debug!(client_id = %id, error = %err, "Delivery failed, evicting client");
                    failed.push(id);
                }
                Err(_) => {
                    warn!(client_id = %id, "Delivery timed out, evicting client");
                    failed.push(id);
                }
            }
        }

        for id in &failed {
            self.evict(*id);
        }

        trace!(
            event_id,
            user_id = author.user_id,
            delivered,
            evicted = failed.len(),
            "Message broadcast"
        );
    }

    fn answer(&self, query: Query) {
        // A dropped reply just means the asker went away.
        match query {
            Query::ClientCount(reply) => {
                let _ = reply.send(self.clients.len());
            }
            Query::EventClientCount(event_id, reply) => {
                let count = self
                    .clients
                    .values()
                    .filter(|client| client.participant.event_id == event_id)
                    .count();
                let _ = reply.send(count);
            }
            Query::History(event_id, reply) => {
                let _ = reply.send(self.history.snapshot(event_id));
            }
        }
    }

    /// Removes a client and closes its transport.
    ///
    /// Returns `false` if the client was not registered.
    async fn remove(&mut self, id: Uuid) -> bool {
        let Some(mut client) = self.clients.remove(&id) else {
            return false;
        };
        close(&mut client, self.write_timeout).await;
        true
    }

    /// Removes a client whose transport already failed.
    ///
    /// The sink is dropped rather than closed: a close would only wait on
    /// the same broken peer for another deadline.
    fn evict(&mut self, id: Uuid) {
        if self.clients.remove(&id).is_some() {
            trace!(client_id = %id, clients = self.clients.len(), "Client evicted");
        }
    }

    /// Refuses further work and closes every connection.
    async fn stop(&mut self) {
        self.commands.close();

        // Drain what was queued before the close; pending registrations
        // are dropped unanswered so their sessions see the hub as closed.
        while let Some(command) = self.commands.recv().await {
            if let Command::Register { mut client, .. } = command {
                close(&mut client, self.write_timeout).await;
            }
        }

        let write_timeout = self.write_timeout;
        let count = self.clients.len();
        join_all(
            self.clients
                .values_mut()
                .map(|client| close(client, write_timeout)),
        )
        .await;
        self.clients.clear();

        if count > 0 {
            info!(clients = count, "Closed remaining chat connections");
        }
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("clients", &self.clients.len())
            .field("history_capacity", &self.history.capacity())
            .field("write_timeout", &self.write_timeout)
            .finish()
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Register { client, .. } => f
                .debug_struct("Register")
                .field("client_id", &client.id)
                .finish(),
            Self::Unregister { id } => f.debug_struct("Unregister").field("id", id).finish(),
            Self::Broadcast { author, .. } => f
                .debug_struct("Broadcast")
                .field("event_id", &author.event_id)
                .finish(),
            Self::Query(_) => f.write_str("Query"),
            Self::Shutdown => f.write_str("Shutdown"),
        }
    }
}

fn encode(message: &ChatMessage) -> Option<String> {
    match serde_json::to_string(message) {
        Ok(frame) => Some(frame),
        Err(err) => {
            error!(error = %err, "Failed to serialize chat message");
            None
        }
    }
}

/// Writes frames in order, then flushes once.
async fn deliver(
    sink: &mut FrameSink,
    frames: impl IntoIterator<Item = String>,
) -> Result<(), TransportError> {
    for frame in frames {
        sink.feed(frame).await?;
    }
    sink.flush().await
}

async fn close(client: &mut Client, write_timeout: Duration) {
    match timeout(write_timeout, client.sink.close()).await {
        Ok(Ok(())) => trace!(client_id = %client.id, "Transport closed"),
        Ok(Err(err)) => trace!(client_id = %client.id, error = %err, "Transport close failed"),
        Err(_) => debug!(client_id = %client.id, "Transport close timed out"),
    }
}
