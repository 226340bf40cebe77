//! `status`: connect, query the device status once, log it, stop.

use std::sync::Arc;

use async_trait::async_trait;
use castctl_core::{DeviceEndpoint, DeviceStatus};
use tracing::info;

use crate::application::commands::Orchestrator;
use crate::application::lifecycle::{CommandContext, CommandOutcome};
use crate::application::transport::{ConnectOptions, Transport};

pub struct StatusCommand {
    endpoint: DeviceEndpoint,
    options: ConnectOptions,
}

impl StatusCommand {
    pub fn new(endpoint: DeviceEndpoint, options: ConnectOptions) -> Self {
        Self { endpoint, options }
    }
}

/// Logs one device status at `info`.
pub(crate) fn log_status(endpoint: &DeviceEndpoint, status: &DeviceStatus) {
    info!(
        endpoint = %endpoint,
        volume = status.volume.level,
        muted = status.volume.muted,
        applications = status.applications.len(),
        "device status"
    );
    for app in &status.applications {
        info!(
            app_id = %app.app_id,
            name = %app.display_name,
            status = app.status_text.as_deref().unwrap_or(""),
            namespaces = ?app.namespaces,
            "running application"
        );
    }
}

#[async_trait]
impl Orchestrator for StatusCommand {
    fn name(&self) -> &'static str {
        "status"
    }

    async fn run(self: Box<Self>, transport: Arc<dyn Transport>) -> CommandOutcome {
        let mut ctx = CommandContext::new(self.name(), self.endpoint, self.options);
        let mut handle = ctx.open(transport.as_ref());

        let device = match ctx.connected(&mut handle).await {
            Ok(device) => device,
            Err(e) => return ctx.fail(&mut handle, e),
        };
        match device.status().await {
            Ok(status) => {
                log_status(ctx.endpoint(), &status);
                ctx.finish(&mut handle)
            }
            Err(e) => ctx.fail(&mut handle, e),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::transport::scripted::{Call, DeviceScript, ScriptedTransport};
    use crate::test_support::capture_logs;
    use castctl_core::{CastError, RunningApplication, Volume};

    fn command() -> Box<StatusCommand> {
        Box::new(StatusCommand::new(
            DeviceEndpoint::with_default_port("192.0.2.1"),
            ConnectOptions::default(),
        ))
    }

    #[tokio::test]
    async fn test_success_logs_status_and_stops_once() {
        // Arrange
        let status = DeviceStatus {
            volume: Volume {
                level: 0.5,
                muted: false,
            },
            applications: vec![RunningApplication {
                app_id: "CC1AD845".into(),
                display_name: "Default Media Receiver".into(),
                status_text: None,
                namespaces: vec![],
            }],
        };
        let transport = Arc::new(ScriptedTransport::new(DeviceScript::connected().with_status(status)));
        let recorder = transport.recorder();

        // Act
        let (outcome, logs) = capture_logs(command().run(transport)).await;

        // Assert
        assert_eq!(outcome, CommandOutcome::Done);
        assert!(logs.contains("INFO") && logs.contains("device status"), "logs:\n{logs}");
        assert!(logs.contains("Default Media Receiver"));
        assert_eq!(recorder.stop_count(), 1);
    }

    #[tokio::test]
    async fn test_status_error_logs_error_and_stops_once() {
        // Arrange
        let script = DeviceScript::connected().fail_status(CastError::Connection("reset".into()));
        let transport = Arc::new(ScriptedTransport::new(script));
        let recorder = transport.recorder();

        // Act
        let (outcome, logs) = capture_logs(command().run(transport)).await;

        // Assert
        assert!(outcome.is_failure());
        assert!(logs.contains("ERROR"), "logs:\n{logs}");
        assert_eq!(recorder.stop_count(), 1);
    }

    #[tokio::test]
    async fn test_status_is_never_requested_before_connected() {
        let transport = Arc::new(ScriptedTransport::new(DeviceScript::refused("refused")));
        let recorder = transport.recorder();

        let outcome = command().run(transport).await;

        assert!(outcome.is_failure());
        assert_eq!(recorder.calls()[1..], [Call::Stop]);
        assert_eq!(recorder.stop_count(), 1);
    }
}
