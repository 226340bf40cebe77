//! `hello`: send one text message to the hello-world receiver app and wait
//! for delivery.
//!
//! After the acknowledgment the handle is kept open for a short hold, so the
//! receiver has a moment to render the text before the sender disconnects.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use castctl_core::DeviceEndpoint;
use serde_json::Value;
use tracing::info;

use crate::application::commands::Orchestrator;
use crate::application::lifecycle::{CommandContext, CommandOutcome};
use crate::application::transport::{ConnectOptions, Transport};

/// Hold applied after delivery when nothing else is configured.
pub const DEFAULT_HOLD: Duration = Duration::from_millis(10);

pub struct HelloCommand {
    endpoint: DeviceEndpoint,
    options: ConnectOptions,
    app_id: String,
    namespace: String,
    text: String,
    hold: Duration,
}

impl HelloCommand {
    /// `words` are joined with single spaces into the message text.
    pub fn new<I, S>(endpoint: DeviceEndpoint, options: ConnectOptions, app_id: String, namespace: String, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let text = words
            .into_iter()
            .map(|w| w.as_ref().to_string())
            .collect::<Vec<_>>()
            .join(" ");
        Self {
            endpoint,
            options,
            app_id,
            namespace,
            text,
            hold: DEFAULT_HOLD,
        }
    }

    pub fn with_hold(mut self, hold: Duration) -> Self {
        self.hold = hold;
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

#[async_trait]
impl Orchestrator for HelloCommand {
    fn name(&self) -> &'static str {
        "hello"
    }

    async fn run(self: Box<Self>, transport: Arc<dyn Transport>) -> CommandOutcome {
        let mut ctx = CommandContext::new("hello", self.endpoint.clone(), self.options.clone());
        let mut handle = ctx.open(transport.as_ref());

        let device = match ctx.connected(&mut handle).await {
            Ok(device) => device,
            Err(e) => return ctx.fail(&mut handle, e),
        };
        let mut app = match device.resolve_application(&self.app_id).await {
            Ok(app) => app,
            Err(e) => return ctx.fail(&mut handle, e),
        };
        let mut dispatcher = match app.run(Some(&self.namespace)).await {
            Ok(dispatcher) => dispatcher,
            Err(e) => return ctx.fail(&mut handle, e),
        };
        if let Err(e) = dispatcher.send_acked(Value::String(self.text.clone())).await {
            return ctx.fail(&mut handle, e);
        }
        info!(namespace = %self.namespace, text = %self.text, "message delivered");

        tokio::time::sleep(self.hold).await;
        dispatcher.stop();
        ctx.finish(&mut handle)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::transport::scripted::{Call, DeviceScript, ScriptedTransport};
    use castctl_core::CastError;
    use serde_json::json;

    fn command(words: &[&str]) -> Box<HelloCommand> {
        Box::new(HelloCommand::new(
            DeviceEndpoint::with_default_port("192.0.2.1"),
            ConnectOptions::default(),
            "794B7BBF".to_string(),
            "urn:x-cast:com.google.cast.sample.helloworld".to_string(),
            words.iter().copied(),
        ))
    }

    #[test]
    fn test_words_are_joined_with_single_spaces() {
        assert_eq!(command(&["Hello", "World"]).text(), "Hello World");
        assert_eq!(command(&[]).text(), "");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_comes_after_the_hold_not_immediately() {
        // Arrange
        let transport = Arc::new(ScriptedTransport::new(DeviceScript::connected()));
        let recorder = transport.recorder();

        // Act
        let outcome = command(&["Hello", "World"]).run(transport).await;

        // Assert
        assert_eq!(outcome, CommandOutcome::Done);
        assert_eq!(recorder.sent(), vec![json!("Hello World")]);
        let sent_at = recorder
            .first_at(|c| matches!(c, Call::SendAcked { .. }))
            .expect("sent");
        let stopped_at = recorder.first_at(|c| *c == Call::Stop).expect("stopped");
        assert!(stopped_at - sent_at >= DEFAULT_HOLD);
        assert_eq!(recorder.stop_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_is_closed_before_the_handle() {
        // Arrange
        let transport = Arc::new(ScriptedTransport::new(DeviceScript::connected()));
        let recorder = transport.recorder();

        // Act
        let outcome = command(&["bye"]).run(transport).await;

        // Assert
        assert_eq!(outcome, CommandOutcome::Done);
        let calls = recorder.calls();
        let n = calls.len();
        assert_eq!(calls[n - 2..], [Call::SessionStop, Call::Stop]);
        assert_eq!(recorder.session_stop_count(), 1);
    }

    #[tokio::test]
    async fn test_undelivered_message_stops_without_hold() {
        // Arrange
        let script = DeviceScript::connected().fail_send(CastError::SendFailed("no ack".into()));
        let transport = Arc::new(ScriptedTransport::new(script));
        let recorder = transport.recorder();

        // Act
        let outcome = command(&["hi"]).run(transport).await;

        // Assert
        assert_eq!(outcome, CommandOutcome::Failed(CastError::SendFailed("no ack".into())));
        assert_eq!(recorder.stop_count(), 1);
    }
}
