//! Per-invocation command lifecycle.
//!
//! Every device-bound command moves through the same states:
//!
//! ```text
//! Init ──► Connecting ──► Connected ──► Working ──► Done
//!               │             │            │
//!               └─────────────┴────────────┴──────► Failed
//! ```
//!
//! `Connecting → Connected` happens only when the device handle reports
//! `connected`.  `Done` and `Failed` are reached only through
//! [`CommandContext::finish`] and [`CommandContext::fail`], and both of those
//! stop the device handle, so every command that terminates stops its handle
//! exactly once.

use std::future::Future;
use std::time::Duration;

use castctl_core::{CastError, DeviceEndpoint};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::application::device::{ConnectedDevice, DeviceHandle};
use crate::application::transport::{ConnectOptions, Transport};

/// Where a command invocation is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandState {
    Init,
    Connecting,
    Connected,
    Working,
    Done,
    Failed,
}

impl CommandState {
    /// Returns `true` if `self → next` is a legal transition.
    pub fn can_advance_to(self, next: CommandState) -> bool {
        use CommandState::*;
        matches!(
            (self, next),
            (Init, Connecting)
                | (Connecting, Connected)
                | (Connected, Working)
                | (Working, Done)
                | (Connecting, Failed)
                | (Connected, Failed)
                | (Working, Failed)
        )
    }
}

/// How a command invocation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Done,
    Failed(CastError),
    /// Interrupted from outside (Ctrl-C) while still running.
    Cancelled,
}

impl CommandOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, CommandOutcome::Failed(_))
    }
}

/// Per-invocation record: what was asked for and how far it got.
#[derive(Debug)]
pub struct CommandContext {
    invocation_id: Uuid,
    command: &'static str,
    endpoint: DeviceEndpoint,
    options: ConnectOptions,
    state: CommandState,
}

impl CommandContext {
    pub fn new(command: &'static str, endpoint: DeviceEndpoint, options: ConnectOptions) -> Self {
        Self {
            invocation_id: Uuid::new_v4(),
            command,
            endpoint,
            options,
            state: CommandState::Init,
        }
    }

    pub fn state(&self) -> CommandState {
        self.state
    }

    pub fn endpoint(&self) -> &DeviceEndpoint {
        &self.endpoint
    }

    pub fn step_timeout(&self) -> Option<Duration> {
        self.options.step_timeout
    }

    /// Creates the device handle.  `Init → Connecting`.
    pub fn open(&mut self, transport: &dyn Transport) -> DeviceHandle {
        self.advance(CommandState::Connecting);
        info!(
            command = self.command,
            invocation = %self.invocation_id,
            endpoint = %self.endpoint,
            "connecting"
        );
        DeviceHandle::open(transport, &self.endpoint, &self.options)
    }

    /// Waits for `connected`.  `Connecting → Connected → Working`.
    ///
    /// # Errors
    ///
    /// Returns the [`CastError`] reported by the handle; the caller is
    /// expected to pass it straight to [`fail`](Self::fail).
    pub async fn connected(&mut self, handle: &mut DeviceHandle) -> Result<ConnectedDevice, CastError> {
        let device = within("connect", self.options.step_timeout, handle.wait_connected()).await?;
        self.advance(CommandState::Connected);
        debug!(command = self.command, endpoint = %self.endpoint, "connected");
        self.advance(CommandState::Working);
        Ok(device)
    }

    /// Logs `error`, stops the handle, and ends the command as `Failed`.
    pub fn fail(&mut self, handle: &mut DeviceHandle, error: CastError) -> CommandOutcome {
        error!(
            command = self.command,
            endpoint = %self.endpoint,
            kind = error.label(),
            "{error}"
        );
        self.advance(CommandState::Failed);
        handle.stop();
        CommandOutcome::Failed(error)
    }

    /// Stops the handle and ends the command as `Done`.
    pub fn finish(&mut self, handle: &mut DeviceHandle) -> CommandOutcome {
        self.advance(CommandState::Done);
        handle.stop();
        info!(command = self.command, endpoint = %self.endpoint, "done");
        CommandOutcome::Done
    }

    fn advance(&mut self, next: CommandState) {
        if self.state.can_advance_to(next) {
            self.state = next;
        } else {
            warn!(
                command = self.command,
                from = ?self.state,
                to = ?next,
                "ignoring illegal command state transition"
            );
        }
    }
}

/// Runs `step`, bounded by `limit` when one is configured.
///
/// # Errors
///
/// Returns [`CastError::Timeout`] if the limit elapses, otherwise whatever
/// `step` returns.
pub async fn within<T, F>(step: &'static str, limit: Option<Duration>, fut: F) -> Result<T, CastError>
where
    F: Future<Output = Result<T, CastError>>,
{
    match limit {
        None => fut.await,
        Some(after) => tokio::time::timeout(after, fut)
            .await
            .map_err(|_| CastError::Timeout { step, after })?,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions_are_legal() {
        use CommandState::*;
        let path = [Init, Connecting, Connected, Working, Done];
        for pair in path.windows(2) {
            assert!(pair[0].can_advance_to(pair[1]), "{:?} -> {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_every_non_terminal_state_after_init_can_fail() {
        use CommandState::*;
        for state in [Connecting, Connected, Working] {
            assert!(state.can_advance_to(Failed));
        }
        assert!(!Init.can_advance_to(Failed));
    }

    #[test]
    fn test_terminal_states_have_no_exit() {
        use CommandState::*;
        for next in [Init, Connecting, Connected, Working, Done, Failed] {
            assert!(!Done.can_advance_to(next));
            assert!(!Failed.can_advance_to(next));
        }
    }

    #[test]
    fn test_cannot_work_before_connected() {
        assert!(!CommandState::Connecting.can_advance_to(CommandState::Working));
        assert!(!CommandState::Init.can_advance_to(CommandState::Working));
    }

    #[test]
    fn test_illegal_advance_keeps_state() {
        // Arrange
        let mut ctx = CommandContext::new(
            "status",
            DeviceEndpoint::with_default_port("192.0.2.1"),
            ConnectOptions::default(),
        );

        // Act
        ctx.advance(CommandState::Done);

        // Assert
        assert_eq!(ctx.state(), CommandState::Init);
    }

    #[tokio::test]
    async fn test_within_without_limit_passes_result_through() {
        let result = within("resolve", None, async { Ok::<_, CastError>(5) }).await;
        assert_eq!(result, Ok(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_within_reports_timeout_with_step_name() {
        // Arrange
        let limit = Duration::from_millis(100);

        // Act
        let result: Result<(), CastError> =
            within("join", Some(limit), std::future::pending()).await;

        // Assert
        assert_eq!(
            result,
            Err(CastError::Timeout {
                step: "join",
                after: limit
            })
        );
    }
}
