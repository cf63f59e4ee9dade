//! Framed, bidirectional chat transports.
//!
//! The hub never touches axum types directly. A [`Transport`] is a pair of
//! boxed halves: a sink of outbound JSON text frames and a stream of inbound
//! frame payloads. [`Transport::from_websocket`] adapts an upgraded axum
//! WebSocket; anything else implementing `Sink` and `Stream` (in-memory
//! channels in tests, for instance) can be wrapped with [`Transport::new`].
//!
//! # Inbound frames
//!
//! - Text and binary frames yield their payload bytes
//! - Ping and pong frames are skipped (axum answers pings itself)
//! - A close frame yields [`TransportError::Closed`]

use std::fmt;
use std::pin::Pin;

use axum::extract::ws::{Message, WebSocket};
use futures_util::future;
use futures_util::{Sink, SinkExt, Stream, StreamExt};

use crate::error::TransportError;

/// Outbound half: accepts serialized JSON text frames.
pub type FrameSink = Pin<Box<dyn Sink<String, Error = TransportError> + Send>>;

/// Inbound half: yields raw frame payloads until the peer goes away.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, TransportError>> + Send>>;

/// A connection handed to the hub by the HTTP layer.
pub struct Transport {
    sink: FrameSink,
    stream: FrameStream,
}

impl Transport {
    /// Wraps an arbitrary sink/stream pair.
    pub fn new<S, R>(sink: S, stream: R) -> Self
    where
        S: Sink<String, Error = TransportError> + Send + 'static,
        R: Stream<Item = Result<Vec<u8>, TransportError>> + Send + 'static,
    {
        Self {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        }
    }

    /// Adapts an upgraded axum WebSocket.
    pub fn from_websocket(socket: WebSocket) -> Self {
        let (sender, receiver) = socket.split();

        let sink = sender
            .sink_map_err(TransportError::io)
            .with(|text: String| future::ready(Ok::<_, TransportError>(Message::Text(text.into()))));

        let stream = receiver.filter_map(|frame| future::ready(decode_frame(frame)));

        Self::new(sink, stream)
    }

    /// Splits the transport into its outbound and inbound halves.
    pub fn into_parts(self) -> (FrameSink, FrameStream) {
        (self.sink, self.stream)
    }
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport").finish_non_exhaustive()
    }
}

/// Maps one WebSocket frame onto the inbound stream, skipping control frames.
fn decode_frame(frame: Result<Message, axum::Error>) -> Option<Result<Vec<u8>, TransportError>> {
    match frame {
        Ok(Message::Text(text)) => Some(Ok(text.as_str().as_bytes().to_vec())),
        Ok(Message::Binary(bytes)) => Some(Ok(bytes.to_vec())),
        Ok(Message::Close(_)) => Some(Err(TransportError::Closed)),
        Ok(Message::Ping(_) | Message::Pong(_)) => None,
        Err(err) => Some(Err(TransportError::io(err))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Bytes;
    use futures::channel::mpsc;

    #[test]
    fn text_and_binary_frames_yield_payload() {
        let text = decode_frame(Ok(Message::Text(r#"{"content":"hi"}"#.into())));
        assert_eq!(text, Some(Ok(br#"{"content":"hi"}"#.to_vec())));

        let binary = decode_frame(Ok(Message::Binary(Bytes::from_static(b"{}"))));
        assert_eq!(binary, Some(Ok(b"{}".to_vec())));
    }

    #[test]
    fn control_frames_are_skipped() {
        assert_eq!(decode_frame(Ok(Message::Ping(Bytes::new()))), None);
        assert_eq!(decode_frame(Ok(Message::Pong(Bytes::new()))), None);
    }

    #[test]
    fn close_frame_ends_the_stream() {
        assert_eq!(
            decode_frame(Ok(Message::Close(None))),
            Some(Err(TransportError::Closed))
        );
    }

    #[tokio::test]
    async fn new_transport_round_trips_through_channels() {
        let (out_tx, mut out_rx) = mpsc::unbounded::<String>();
        let (in_tx, in_rx) = mpsc::unbounded::<Result<Vec<u8>, TransportError>>();

        let transport = Transport::new(out_tx.sink_map_err(TransportError::io), in_rx);
        let (mut sink, mut stream) = transport.into_parts();

        sink.send("outbound".to_string()).await.unwrap();
        assert_eq!(out_rx.next().await.as_deref(), Some("outbound"));

        in_tx.unbounded_send(Ok(b"inbound".to_vec())).unwrap();
        assert_eq!(stream.next().await, Some(Ok(b"inbound".to_vec())));

        drop(in_tx);
        assert_eq!(stream.next().await, None);

        sink.close().await.unwrap();
        assert_eq!(out_rx.next().await, None);
    }
}
