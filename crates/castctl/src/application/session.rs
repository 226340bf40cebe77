//! Session manager: starting or joining a session on a resolved application.
//!
//! An [`AppInstance`] allows exactly one session request over its lifetime,
//! whether that is [`launch`](AppInstance::launch),
//! [`run`](AppInstance::run) or [`join`](AppInstance::join).  A second request
//! is a caller error and is rejected without touching the device.

use std::time::Duration;

use castctl_core::CastError;
use tracing::{debug, info};

use crate::application::dispatch::MessageDispatcher;
use crate::application::lifecycle::within;
use crate::application::transport::Application;

/// An application resolved on a connected device.
pub struct AppInstance {
    app: Box<dyn Application>,
    step_timeout: Option<Duration>,
    session_requested: bool,
}

impl AppInstance {
    pub(crate) fn new(app: Box<dyn Application>, step_timeout: Option<Duration>) -> Self {
        Self {
            app,
            step_timeout,
            session_requested: false,
        }
    }

    pub fn app_id(&self) -> &str {
        self.app.app_id()
    }

    /// Fires the application start without waiting for a session.
    ///
    /// # Errors
    ///
    /// Returns [`CastError::SessionAlreadyRequested`] on a second request, or
    /// the transport's error if the launch could not be queued.
    pub fn launch(&mut self) -> Result<(), CastError> {
        self.claim()?;
        self.app.launch()?;
        info!(app_id = self.app.app_id(), "launch issued");
        Ok(())
    }

    /// Starts a new session.  `None` opens the application's default channel.
    ///
    /// # Errors
    ///
    /// Returns [`CastError::SessionStartFailed`] if the receiver refuses, or
    /// [`CastError::SessionAlreadyRequested`] on a second request.
    pub async fn run(&mut self, namespace: Option<&str>) -> Result<MessageDispatcher, CastError> {
        self.claim()?;
        // Unbounded: the run step has no timeout of its own.
        let session = self.app.run(namespace).await?;
        debug!(app_id = self.app.app_id(), namespace, "session started");
        Ok(MessageDispatcher::new(session))
    }

    /// Attaches to a session already running on the receiver.
    ///
    /// # Errors
    ///
    /// Returns [`CastError::SessionNotFound`] if nothing is running on
    /// `namespace`, [`CastError::Timeout`] when a step timeout elapses, or
    /// [`CastError::SessionAlreadyRequested`] on a second request.
    pub async fn join(&mut self, namespace: &str) -> Result<MessageDispatcher, CastError> {
        self.claim()?;
        let session = within("join", self.step_timeout, self.app.join(namespace)).await?;
        debug!(app_id = self.app.app_id(), namespace, "session joined");
        Ok(MessageDispatcher::new(session))
    }

    fn claim(&mut self) -> Result<(), CastError> {
        if self.session_requested {
            return Err(CastError::SessionAlreadyRequested {
                app_id: self.app.app_id().to_string(),
            });
        }
        self.session_requested = true;
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
