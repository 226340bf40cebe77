//! Frames spoken by the reference TCP transport.
//!
//! Every frame is an [`Envelope`]: an optional `request_id` plus a
//! [`Frame`] body tagged by `type`.  Requests that expect an answer carry a
//! `request_id`, and the device echoes it on the reply.  Fire-and-forget
//! requests (`launch_app`, un-acknowledged `send`) omit it.
//!
//! ```text
//! {"request_id":7,"frame":{"type":"resolve_app","app_id":"CC1AD845"}}
//! {"request_id":7,"frame":{"type":"app_resolved","app_id":"CC1AD845"}}
//! {"frame":{"type":"session_message","session_id":"s1","payload":{..}}}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::device::DeviceStatus;

/// Wire envelope around every frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<u64>,
    pub frame: Frame,
}

impl Envelope {
    /// A request the device must answer.
    pub fn request(request_id: u64, frame: Frame) -> Self {
        Self {
            request_id: Some(request_id),
            frame,
        }
    }

    /// A frame nobody answers.
    pub fn notify(frame: Frame) -> Self {
        Self {
            request_id: None,
            frame,
        }
    }
}

/// Failure categories a device may report in a `failure` frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    ApplicationNotFound,
    SessionStartFailed,
    SessionNotFound,
    SendFailed,
    Protocol,
}

/// Frame bodies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    // ── client → device ───────────────────────────────────────────────────────
    GetStatus,
    /// Find (or start) an application.  Answered by `app_resolved`.
    ResolveApp { app_id: String },
    /// Start an application without opening a session.  Never answered.
    LaunchApp { app_id: String },
    /// Start a new session.  `namespace` absent means the app default.
    StartSession {
        app_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        namespace: Option<String>,
    },
    /// Attach to a session already running on the receiver.
    JoinSession { app_id: String, namespace: String },
    /// Deliver a payload.  Answered by `ack` only when a request id is set.
    Send { session_id: String, payload: Value },
    StopSession { session_id: String },

    // ── device → client ───────────────────────────────────────────────────────
    Status { status: DeviceStatus },
    AppResolved { app_id: String },
    SessionStarted { session_id: String },
    Ack,
    Failure { kind: FailureKind, message: String },
    /// Sessionless message from the device.
    DeviceMessage { payload: Value },
    SessionMessage { session_id: String, payload: Value },
    SessionClosed { session_id: String },
}

impl Frame {
    /// Name of the variant as it appears in the `type` tag; used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::GetStatus => "get_status",
            Frame::ResolveApp { .. } => "resolve_app",
            Frame::LaunchApp { .. } => "launch_app",
            Frame::StartSession { .. } => "start_session",
            Frame::JoinSession { .. } => "join_session",
            Frame::Send { .. } => "send",
            Frame::StopSession { .. } => "stop_session",
            Frame::Status { .. } => "status",
            Frame::AppResolved { .. } => "app_resolved",
            Frame::SessionStarted { .. } => "session_started",
            Frame::Ack => "ack",
            Frame::Failure { .. } => "failure",
            Frame::DeviceMessage { .. } => "device_message",
            Frame::SessionMessage { .. } => "session_message",
            Frame::SessionClosed { .. } => "session_closed",
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_envelope_serializes_request_id() {
        // Arrange
        let env = Envelope::request(
            7,
            Frame::ResolveApp {
                app_id: "CC1AD845".to_string(),
            },
        );

        // Act
        let value = serde_json::to_value(&env).unwrap();

        // Assert
        assert_eq!(
            value,
            json!({"request_id": 7, "frame": {"type": "resolve_app", "app_id": "CC1AD845"}})
        );
    }

    #[test]
    fn test_notify_envelope_omits_request_id() {
        let env = Envelope::notify(Frame::LaunchApp {
            app_id: "A".to_string(),
        });
        let value = serde_json::to_value(&env).unwrap();
        assert!(value.get("request_id").is_none());
    }

    #[test]
    fn test_start_session_without_namespace_omits_field() {
        let value = serde_json::to_value(Frame::StartSession {
            app_id: "A".to_string(),
            namespace: None,
        })
        .unwrap();
        assert_eq!(value, json!({"type": "start_session", "app_id": "A"}));
    }

    #[test]
    fn test_failure_frame_parses_kind() {
        let json = r#"{"type":"failure","kind":"session_not_found","message":"nothing running"}"#;
        let frame: Frame = serde_json::from_str(json).unwrap();
        assert_eq!(
            frame,
            Frame::Failure {
                kind: FailureKind::SessionNotFound,
                message: "nothing running".to_string()
            }
        );
    }

    #[test]
    fn test_kind_matches_serialized_tag() {
        let frame = Frame::SessionClosed {
            session_id: "s".to_string(),
        };
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["type"], frame.kind());
    }
}
