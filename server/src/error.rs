//! Error types for the Sportify chat server.
//!
//! # Error Types
//!
//! - [`TransportError`] - Failures on a single chat connection
//! - [`HubError`] - The coordination loop refused or dropped a submission
//! - [`ServerError`] - Top-level server errors encompassing all failure modes
//!
//! None of these ever reach a chat participant as an application message:
//! every per-connection failure degrades to closing that one connection.

use std::error::Error;
use std::fmt;

use thiserror::Error as ThisError;

use crate::config::ConfigError;

/// Errors raised by a chat transport.
#[derive(ThisError, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The peer closed the connection, or it was already closed locally.
    #[error("connection closed")]
    Closed,

    /// The underlying connection failed.
    #[error("transport failure: {0}")]
    Io(String),
}

impl TransportError {
    /// Creates a new I/O error from any displayable cause.
    pub fn io(cause: impl fmt::Display) -> Self {
        Self::Io(cause.to_string())
    }
}

/// Errors returned when talking to the hub's coordination loop.
#[derive(ThisError, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubError {
    /// The coordination loop has stopped and accepts no more submissions.
    #[error("chat hub is not running")]
    Closed,

    /// The client was evicted before its session could start, typically
    /// because history replay failed.
    #[error("client was evicted during registration")]
    Rejected,
}

/// Top-level error type for the chat server.
#[derive(Debug)]
pub enum ServerError {
    /// Configuration error during server initialization.
    Config(ConfigError),

    /// The chat hub refused a request.
    Hub(HubError),

    /// WebSocket connection or protocol error.
    WebSocket(String),

    /// Unexpected internal server error.
    Internal(String),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(err) => write!(f, "configuration error: {err}"),
            Self::Hub(err) => write!(f, "hub error: {err}"),
            Self::WebSocket(msg) => write!(f, "websocket error: {msg}"),
            Self::Internal(msg) => write!(f, "internal server error: {msg}"),
        }
    }
}

impl Error for ServerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            Self::Hub(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ConfigError> for ServerError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err)
    }
}

impl From<HubError> for ServerError {
    fn from(err: HubError) -> Self {
        Self::Hub(err)
    }
}

impl From<TransportError> for ServerError {
    fn from(err: TransportError) -> Self {
        Self::WebSocket(err.to_string())
    }
}

impl ServerError {
    /// Creates a new WebSocket error.
    ///
    /// # Example
    ///
    /// ```rust
    /// use sportify_chat_server::error::ServerError;
    ///
    /// let err = ServerError::websocket("connection reset by peer");
    /// assert!(matches!(err, ServerError::WebSocket(_)));
    /// ```
    pub fn websocket(message: impl Into<String>) -> Self {
        Self::WebSocket(message.into())
    }

    /// Creates a new internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns `true` if this error was caused by the remote peer.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::WebSocket(_) | Self::Hub(HubError::Rejected))
    }

    /// Returns `true` if this error indicates a server-side problem.
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::Internal(_) | Self::Config(_) | Self::Hub(HubError::Closed)
        )
    }
}

/// A specialized Result type for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_error_displays_correctly() {
        assert_eq!(TransportError::Closed.to_string(), "connection closed");
        assert_eq!(
            TransportError::io("broken pipe").to_string(),
            "transport failure: broken pipe"
        );
    }

    #[test]
    fn hub_error_displays_correctly() {
        assert_eq!(HubError::Closed.to_string(), "chat hub is not running");
        assert_eq!(
            HubError::Rejected.to_string(),
            "client was evicted during registration"
        );
    }

    #[test]
    fn server_error_config_displays_correctly() {
        let err = ServerError::Config(ConfigError::MissingEnvVar("PORT".to_string()));
        assert_eq!(
            err.to_string(),
            "configuration error: missing required environment variable: PORT"
        );
    }

    #[test]
    fn config_and_startup_failures_are_server_errors() {
        let err = ServerError::from(ConfigError::ValidationError(
            "SPORTIFY_CHAT_QUEUE must be at least 1".to_string(),
        ));
        assert!(err.is_server_error());
        assert!(!err.is_client_error());
        assert!(err.source().is_some());

        let err = ServerError::internal("failed to bind to 0.0.0.0:8080: address in use");
        assert!(err.is_server_error());
        assert_eq!(
            err.to_string(),
            "internal server error: failed to bind to 0.0.0.0:8080: address in use"
        );
    }

    #[test]
    fn server_error_hub_displays_correctly() {
        let err: ServerError = HubError::Closed.into();
        assert_eq!(err.to_string(), "hub error: chat hub is not running");
    }

    #[test]
    fn transport_error_converts_to_websocket_error() {
        let err: ServerError = TransportError::Closed.into();
        assert!(matches!(err, ServerError::WebSocket(ref msg) if msg == "connection closed"));
    }

    #[test]
    fn from_hub_error_works_with_question_mark() {
        fn inner() -> Result<()> {
            let _: () = Err(HubError::Rejected)?;
            Ok(())
        }

        assert!(matches!(inner(), Err(ServerError::Hub(HubError::Rejected))));
    }

    #[test]
    fn client_and_server_errors_are_classified() {
        assert!(ServerError::websocket("reset").is_client_error());
        assert!(ServerError::Hub(HubError::Rejected).is_client_error());
        assert!(!ServerError::internal("oops").is_client_error());

        assert!(ServerError::internal("oops").is_server_error());
        assert!(ServerError::Hub(HubError::Closed).is_server_error());
        assert!(!ServerError::websocket("reset").is_server_error());
    }

    #[test]
    fn server_error_source_is_exposed() {
        let err = ServerError::Hub(HubError::Closed);
        assert_eq!(
            err.source().map(ToString::to_string),
            Some("chat hub is not running".to_string())
        );
        assert!(ServerError::internal("x").source().is_none());
    }
}
