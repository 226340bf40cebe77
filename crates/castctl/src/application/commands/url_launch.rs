//! Named URL-launch commands: hand one URL to a preset receiver application.
//!
//! Every [`UrlLauncher`] becomes its own subcommand.  The URL is sent
//! fire-and-forget and the handle is stopped right after the send is queued.

use std::sync::Arc;

use async_trait::async_trait;
use castctl_core::DeviceEndpoint;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use crate::application::commands::Orchestrator;
use crate::application::lifecycle::{CommandContext, CommandOutcome};
use crate::application::transport::{ConnectOptions, Transport};

/// How the URL is wrapped before it is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UrlPayload {
    /// A media `LOAD` request understood by media receiver apps.
    #[serde(rename = "media")]
    Media,
    /// `{"type":"load","url":..}`, for apps that take a bare URL.
    #[serde(rename = "url")]
    Plain,
}

impl UrlPayload {
    pub fn build(self, url: &str) -> Value {
        match self {
            UrlPayload::Media => json!({
                "type": "LOAD",
                "autoplay": true,
                "media": {
                    "contentId": url,
                    "streamType": "BUFFERED",
                    "contentType": content_type(url),
                },
            }),
            UrlPayload::Plain => json!({ "type": "load", "url": url }),
        }
    }
}

/// MIME type guessed from the URL path's extension.
fn content_type(url: &str) -> &'static str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let ext = path
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "m3u8" => "application/x-mpegURL",
        "mpd" => "application/dash+xml",
        "mp3" => "audio/mpeg",
        "ogg" => "audio/ogg",
        "flac" => "audio/flac",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        _ => "video/mp4",
    }
}

/// A preset receiver application reachable through a named subcommand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlLauncher {
    pub name: String,
    pub description: String,
    pub app_id: String,
    pub namespace: String,
    pub payload: UrlPayload,
}

impl UrlLauncher {
    /// The launcher every installation has: the default media receiver.
    pub fn builtin_media() -> Self {
        Self {
            name: "media".to_string(),
            description: "Open a URL in the default media receiver".to_string(),
            app_id: "CC1AD845".to_string(),
            namespace: "urn:x-cast:com.google.cast.media".to_string(),
            payload: UrlPayload::Media,
        }
    }
}

pub struct UrlLaunchCommand {
    endpoint: DeviceEndpoint,
    options: ConnectOptions,
    launcher: UrlLauncher,
    url: String,
}

impl UrlLaunchCommand {
    pub fn new(endpoint: DeviceEndpoint, options: ConnectOptions, launcher: UrlLauncher, url: String) -> Self {
        Self {
            endpoint,
            options,
            launcher,
            url,
        }
    }
}

#[async_trait]
impl Orchestrator for UrlLaunchCommand {
    fn name(&self) -> &'static str {
        "url-launch"
    }

    async fn run(self: Box<Self>, transport: Arc<dyn Transport>) -> CommandOutcome {
        let UrlLaunchCommand {
            endpoint,
            options,
            launcher,
            url,
        } = *self;
        let mut ctx = CommandContext::new("url-launch", endpoint, options);
        let mut handle = ctx.open(transport.as_ref());

        let device = match ctx.connected(&mut handle).await {
            Ok(device) => device,
            Err(e) => return ctx.fail(&mut handle, e),
        };
        let mut app = match device.resolve_application(&launcher.app_id).await {
            Ok(app) => app,
            Err(e) => return ctx.fail(&mut handle, e),
        };
        let mut dispatcher = match app.run(Some(&launcher.namespace)).await {
            Ok(dispatcher) => dispatcher,
            Err(e) => return ctx.fail(&mut handle, e),
        };
        if let Err(e) = dispatcher.send(launcher.payload.build(&url)) {
            return ctx.fail(&mut handle, e);
        }
        info!(launcher = %launcher.name, url = %url, "url sent");
        ctx.finish(&mut handle)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::transport::scripted::{Call, DeviceScript, ScriptedTransport};
    use castctl_core::CastError;

    #[test]
    fn test_media_payload_is_load_request_with_guessed_type() {
        let payload = UrlPayload::Media.build("http://192.0.2.5/clip.WEBM?token=1");

        assert_eq!(payload["type"], "LOAD");
        assert_eq!(payload["media"]["contentId"], "http://192.0.2.5/clip.WEBM?token=1");
        assert_eq!(payload["media"]["streamType"], "BUFFERED");
        assert_eq!(payload["media"]["contentType"], "video/webm");
    }

    #[test]
    fn test_content_type_falls_back_to_mp4() {
        assert_eq!(content_type("http://example.com/stream"), "video/mp4");
        assert_eq!(content_type("http://example.com/live.m3u8#t=3"), "application/x-mpegURL");
    }

    #[test]
    fn test_plain_payload_carries_url() {
        assert_eq!(
            UrlPayload::Plain.build("https://example.com"),
            json!({"type": "load", "url": "https://example.com"})
        );
    }

    #[test]
    fn test_payload_kind_names_in_config() {
        let launcher: UrlLauncher = toml::from_str(
            r#"
            name = "web"
            description = "Open a page"
            app_id = "5CB45E5A"
            namespace = "urn:x-cast:com.url.cast"
            payload = "url"
            "#,
        )
        .unwrap();

        assert_eq!(launcher.payload, UrlPayload::Plain);
    }

    #[tokio::test]
    async fn test_sends_without_ack_and_stops_right_after() {
        // Arrange
        let transport = Arc::new(ScriptedTransport::new(DeviceScript::connected()));
        let recorder = transport.recorder();
        let command = Box::new(UrlLaunchCommand::new(
            DeviceEndpoint::with_default_port("192.0.2.1"),
            ConnectOptions::default(),
            UrlLauncher::builtin_media(),
            "http://192.0.2.5/movie.mp4".into(),
        ));

        // Act
        let outcome = command.run(transport).await;

        // Assert
        assert_eq!(outcome, CommandOutcome::Done);
        let calls = recorder.calls();
        let n = calls.len();
        assert!(matches!(calls[n - 2], Call::Send { .. }));
        assert_eq!(calls[n - 1], Call::Stop);
        assert_eq!(recorder.count(|c| matches!(c, Call::SendAcked { .. })), 0);
    }

    #[tokio::test]
    async fn test_missing_app_reports_and_stops() {
        let transport = Arc::new(ScriptedTransport::new(DeviceScript::connected().without_app("CC1AD845")));
        let recorder = transport.recorder();
        let command = Box::new(UrlLaunchCommand::new(
            DeviceEndpoint::with_default_port("192.0.2.1"),
            ConnectOptions::default(),
            UrlLauncher::builtin_media(),
            "http://192.0.2.5/movie.mp4".into(),
        ));

        let outcome = command.run(transport).await;

        assert!(matches!(outcome, CommandOutcome::Failed(CastError::ApplicationNotFound { .. })));
        assert_eq!(recorder.stop_count(), 1);
        assert!(recorder.sent().is_empty());
    }
}
