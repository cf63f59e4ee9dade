//! Privacy tests for chat data in logs.
//!
//! These tests verify that neither access tokens nor message content ever
//! appear in log output, even at TRACE level.
//!
//! # Test Approach
//!
//! 1. Install a custom tracing subscriber Layer that records every event and
//!    every span's fields
//! 2. Run a real server and exercise refused handshakes, chat traffic and a
//!    malformed frame
//! 3. Verify the captured logs mention the activity but none of the secrets

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::span::{Attributes, Id};
use tracing::Subscriber;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

use sportify_chat_server::config::{Config, UserEntry};
use sportify_chat_server::hub::ChatHub;
use sportify_chat_server::routes::{create_router, AppState};

const SECRET_TOKEN: &str = "tok-7f3a9c-super-secret";
const SECRET_CONTENT: &str = "meet-behind-the-north-stand";

// ============================================================================
// Log Capture Infrastructure
// ============================================================================

/// A buffer for capturing log output during tests.
#[derive(Clone, Default)]
struct LogCapture {
    logs: Arc<Mutex<Vec<String>>>,
}

impl LogCapture {
    fn push(&self, line: String) {
        self.logs.lock().unwrap().push(line);
    }

    /// Returns all captured lines joined into a single string.
    fn get_logs(&self) -> String {
        self.logs.lock().unwrap().join("\n")
    }
}

/// A tracing Layer that captures events and span fields for inspection.
struct CaptureLayer {
    capture: LogCapture,
}

impl<S> Layer<S> for CaptureLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, _id: &Id, _ctx: Context<'_, S>) {
        let mut visitor = StringVisitor::default();
        attrs.record(&mut visitor);
        self.capture.push(format!(
            "[span] {}: {}",
            attrs.metadata().name(),
            visitor.into_string()
        ));
    }

    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = StringVisitor::default();
        event.record(&mut visitor);
        self.capture.push(format!(
            "[{}] {}: {}",
            event.metadata().level(),
            event.metadata().target(),
            visitor.into_string()
        ));
    }
}

/// A visitor that collects all fields into a string.
#[derive(Default)]
struct StringVisitor {
    parts: Vec<String>,
}

impl StringVisitor {
    fn into_string(self) -> String {
        self.parts.join(" ")
    }
}

impl tracing::field::Visit for StringVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.parts.push(format!("{}={:?}", field.name(), value));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.parts.push(format!("{}={}", field.name(), value));
    }
}

// ============================================================================
// Test Helpers
// ============================================================================

fn config() -> Config {
    Config {
        port: 0,
        write_timeout: Duration::from_millis(500),
        tokens: HashMap::from([(
            SECRET_TOKEN.to_string(),
            UserEntry {
                user_id: 1,
                username: "Alice".to_string(),
            },
        )]),
        rosters: HashMap::from([(7, HashSet::from([1]))]),
        ..Config::default()
    }
}

async fn wait_for_clients(hub: &ChatHub, expected: usize) {
    timeout(Duration::from_secs(2), async {
        while hub.client_count().await.unwrap() != expected {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
}

// ============================================================================
// Privacy Tests
// ============================================================================

/// Tokens and message content never reach the logs, while the activity
/// itself is still logged.
#[tokio::test]
async fn tokens_and_content_are_never_logged() {
    let capture = LogCapture::default();
    let subscriber = tracing_subscriber::registry().with(
        CaptureLayer {
            capture: capture.clone(),
        }
        .with_filter(tracing_subscriber::filter::LevelFilter::TRACE),
    );
    // The default runtime is single-threaded, so every task sees this.
    let _guard = tracing::subscriber::set_default(subscriber);

    let config = config();
    let (hub, _hub_task) = ChatHub::spawn(config.hub_config());
    let app = create_router(AppState::new(config, hub.clone()));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Refused: right token, wrong event.
    let refused = connect_async(format!("ws://{addr}/events/8/chat?token={SECRET_TOKEN}")).await;
    assert!(refused.is_err());

    // Refused: token that is almost right.
    let refused = connect_async(format!("ws://{addr}/events/7/chat?token={SECRET_TOKEN}x")).await;
    assert!(refused.is_err());

    let (mut client, _) = connect_async(format!("ws://{addr}/events/7/chat?token={SECRET_TOKEN}"))
        .await
        .unwrap();
    wait_for_clients(&hub, 1).await;

    client
        .send(Message::text(format!(r#"{{"content":"{SECRET_CONTENT}"}}"#)))
        .await
        .unwrap();
    let echoed = timeout(Duration::from_secs(2), client.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(echoed.to_text().unwrap().contains(SECRET_CONTENT));

    // A bare JSON string fails to decode; its text must not leak either.
    client
        .send(Message::text(format!(r#""{SECRET_CONTENT}""#)))
        .await
        .unwrap();
    wait_for_clients(&hub, 0).await;

    let logs = capture.get_logs();

    assert!(logs.contains("Client registered"), "expected activity in logs:\n{logs}");
    assert!(logs.contains("Failed to decode chat message"), "logs:\n{logs}");
    assert!(
        !logs.contains(SECRET_TOKEN),
        "access token leaked into logs:\n{logs}"
    );
    assert!(
        !logs.contains(SECRET_CONTENT),
        "message content leaked into logs:\n{logs}"
    );
}
