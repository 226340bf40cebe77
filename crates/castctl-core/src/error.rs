//! Error taxonomy shared by every orchestration step.
//!
//! Each variant names the step that failed.  All of them are fatal to the
//! command invocation that observed them; nothing in castctl retries.

use std::time::Duration;

use thiserror::Error;

use crate::protocol::frame::FailureKind;

/// Errors reported by the device, application, session, and game layers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CastError {
    /// Transport-level failure: refused connection, dropped socket, I/O error.
    #[error("connection error: {0}")]
    Connection(String),

    /// The device has no such application available or launchable.
    #[error("application {app_id} not found on device")]
    ApplicationNotFound { app_id: String },

    /// A new session could not be started.
    #[error("failed to start session on {namespace}: {reason}")]
    SessionStartFailed { namespace: String, reason: String },

    /// `join` found no running session on the namespace.
    #[error("no running session on namespace {namespace}")]
    SessionNotFound { namespace: String },

    /// A message could not be delivered.
    #[error("failed to send message: {0}")]
    SendFailed(String),

    /// The receiver application reported an error of its own.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// `run`/`join`/`launch` was issued twice on the same application instance.
    #[error("a session was already requested on application {app_id}")]
    SessionAlreadyRequested { app_id: String },

    /// A configured step timeout elapsed.
    #[error("{step} timed out after {after:?}")]
    Timeout { step: &'static str, after: Duration },
}

impl CastError {
    /// Maps a `failure` frame from the device to the matching variant.
    ///
    /// `subject` is the application id or namespace the failed request named.
    pub fn from_failure(kind: FailureKind, subject: &str, message: String) -> Self {
        match kind {
            FailureKind::ApplicationNotFound => CastError::ApplicationNotFound {
                app_id: subject.to_string(),
            },
            FailureKind::SessionStartFailed => CastError::SessionStartFailed {
                namespace: subject.to_string(),
                reason: message,
            },
            FailureKind::SessionNotFound => CastError::SessionNotFound {
                namespace: subject.to_string(),
            },
            FailureKind::SendFailed => CastError::SendFailed(message),
            FailureKind::Protocol => CastError::Protocol(message),
        }
    }

    /// Short machine-readable label used as a structured log field.
    pub fn label(&self) -> &'static str {
        match self {
            CastError::Connection(_) => "connection_error",
            CastError::ApplicationNotFound { .. } => "application_not_found",
            CastError::SessionStartFailed { .. } => "session_start_failed",
            CastError::SessionNotFound { .. } => "session_not_found",
            CastError::SendFailed(_) => "send_failed",
            CastError::Protocol(_) => "protocol_error",
            CastError::SessionAlreadyRequested { .. } => "session_already_requested",
            CastError::Timeout { .. } => "timeout",
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
