//! `watch`: log raw traffic until cancelled.
//!
//! Without an application, logs the device status once and then every
//! sessionless device message.  With an application, starts a session on
//! its default channel and logs every session message.
//!
//! Neither variant ever finishes on its own.  The handle is stopped only when
//! a step fails, or when the device or session goes away underneath us.

use std::sync::Arc;

use async_trait::async_trait;
use castctl_core::{CastError, DeviceEndpoint};
use tracing::info;

use crate::application::commands::status::log_status;
use crate::application::commands::Orchestrator;
use crate::application::device::DeviceHandle;
use crate::application::lifecycle::{CommandContext, CommandOutcome};
use crate::application::transport::{ConnectOptions, DeviceEvent, Transport};

pub struct WatchCommand {
    endpoint: DeviceEndpoint,
    options: ConnectOptions,
    app_id: Option<String>,
}

impl WatchCommand {
    pub fn new(endpoint: DeviceEndpoint, options: ConnectOptions, app_id: Option<String>) -> Self {
        Self {
            endpoint,
            options,
            app_id,
        }
    }
}

/// Turns a lifecycle event seen after `connected` into the failure it means.
/// `None` for raw messages.
fn lost(event: Option<DeviceEvent>, endpoint: &DeviceEndpoint) -> Option<CastError> {
    match event {
        Some(DeviceEvent::Message(_)) | Some(DeviceEvent::Connected) => None,
        Some(DeviceEvent::Error(cause)) => Some(CastError::Connection(cause)),
        Some(DeviceEvent::Disconnected) | None => {
            Some(CastError::Connection(format!("lost connection to {endpoint}")))
        }
    }
}

async fn watch_device(ctx: &mut CommandContext, handle: &mut DeviceHandle) -> CommandOutcome {
    let device = match ctx.connected(handle).await {
        Ok(device) => device,
        Err(e) => return ctx.fail(handle, e),
    };
    match device.status().await {
        Ok(status) => log_status(ctx.endpoint(), &status),
        Err(e) => return ctx.fail(handle, e),
    }

    loop {
        let event = handle.next_event().await;
        if let Some(DeviceEvent::Message(message)) = &event {
            info!(endpoint = %ctx.endpoint(), %message, "device message");
        }
        if let Some(e) = lost(event, ctx.endpoint()) {
            return ctx.fail(handle, e);
        }
    }
}

async fn watch_app(ctx: &mut CommandContext, handle: &mut DeviceHandle, app_id: &str) -> CommandOutcome {
    let device = match ctx.connected(handle).await {
        Ok(device) => device,
        Err(e) => return ctx.fail(handle, e),
    };
    let mut app = match device.resolve_application(app_id).await {
        Ok(app) => app,
        Err(e) => return ctx.fail(handle, e),
    };
    let mut dispatcher = match app.run(None).await {
        Ok(dispatcher) => dispatcher,
        Err(e) => return ctx.fail(handle, e),
    };

    let app_id = app_id.to_string();
    dispatcher.on_message(move |message| info!(app_id = %app_id, %message, "session message"));

    loop {
        tokio::select! {
            message = dispatcher.next() => {
                if message.is_none() {
                    let e = CastError::Connection("session closed by the receiver".to_string());
                    return ctx.fail(handle, e);
                }
            }
            event = handle.next_event() => {
                if let Some(e) = lost(event, ctx.endpoint()) {
                    dispatcher.stop();
                    return ctx.fail(handle, e);
                }
            }
        }
    }
}

#[async_trait]
impl Orchestrator for WatchCommand {
    fn name(&self) -> &'static str {
        "watch"
    }

    async fn run(self: Box<Self>, transport: Arc<dyn Transport>) -> CommandOutcome {
        let mut ctx = CommandContext::new(self.name(), self.endpoint, self.options);
        let mut handle = ctx.open(transport.as_ref());
        match self.app_id.as_deref() {
            None => watch_device(&mut ctx, &mut handle).await,
            Some(app_id) => watch_app(&mut ctx, &mut handle, app_id).await,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::transport::scripted::{Call, DeviceScript, ScriptedTransport};
    use crate::test_support::capture_logs;
    use serde_json::json;
    use std::time::Duration;

    fn command(app: Option<&str>) -> Box<WatchCommand> {
        Box::new(WatchCommand::new(
            DeviceEndpoint::with_default_port("192.0.2.1"),
            ConnectOptions::default(),
            app.map(str::to_string),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn test_device_watch_logs_messages_and_never_stops() {
        // Arrange
        let script = DeviceScript::default().with_events(vec![
            DeviceEvent::Connected,
            DeviceEvent::Message(json!({"type": "RECEIVER_STATUS"})),
        ]);
        let transport = Arc::new(ScriptedTransport::new(script));
        let recorder = transport.recorder();

        // Act: the command runs forever, so bound it
        let (result, logs) = capture_logs(tokio::time::timeout(
            Duration::from_secs(60),
            command(None).run(transport),
        ))
        .await;

        // Assert
        assert!(result.is_err(), "watch must not finish on its own");
        assert!(logs.contains("RECEIVER_STATUS"), "logs:\n{logs}");
        assert_eq!(recorder.stop_count(), 0);
    }

    #[tokio::test]
    async fn test_device_watch_stops_on_initial_status_failure() {
        let script = DeviceScript::connected().fail_status(CastError::Connection("reset".into()));
        let transport = Arc::new(ScriptedTransport::new(script));
        let recorder = transport.recorder();

        let outcome = command(None).run(transport).await;

        assert!(outcome.is_failure());
        assert_eq!(recorder.stop_count(), 1);
    }

    #[tokio::test]
    async fn test_device_watch_fails_when_connection_drops_later() {
        // Arrange
        let transport = Arc::new(ScriptedTransport::new(DeviceScript::default().with_events(vec![
            DeviceEvent::Connected,
            DeviceEvent::Disconnected,
        ])));
        let recorder = transport.recorder();

        // Act
        let outcome = command(None).run(transport).await;

        // Assert
        assert!(matches!(outcome, CommandOutcome::Failed(CastError::Connection(_))));
        assert_eq!(recorder.stop_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_app_watch_runs_default_session_and_logs_messages() {
        // Arrange
        let script = DeviceScript::connected().with_session_messages(vec![json!({"playerState": "PLAYING"})]);
        let transport = Arc::new(ScriptedTransport::new(script));
        let recorder = transport.recorder();

        // Act
        let (result, logs) = capture_logs(tokio::time::timeout(
            Duration::from_secs(60),
            command(Some("CC1AD845")).run(transport),
        ))
        .await;

        // Assert
        assert!(result.is_err());
        assert!(logs.contains("PLAYING"), "logs:\n{logs}");
        assert!(recorder.calls().contains(&Call::Run {
            app_id: "CC1AD845".into(),
            namespace: None
        }));
        assert_eq!(recorder.stop_count(), 0);
    }

    #[tokio::test]
    async fn test_app_watch_stops_when_application_missing() {
        let transport = Arc::new(ScriptedTransport::new(DeviceScript::connected().without_app("CC1AD845")));
        let recorder = transport.recorder();

        let outcome = command(Some("CC1AD845")).run(transport).await;

        assert_eq!(
            outcome,
            CommandOutcome::Failed(CastError::ApplicationNotFound {
                app_id: "CC1AD845".into()
            })
        );
        assert_eq!(recorder.stop_count(), 1);
    }
}
