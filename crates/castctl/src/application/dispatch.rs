//! Message dispatcher: sending on a session and fanning inbound messages out
//! to every registered handler.
//!
//! Handlers are observers, not consumers.  Each inbound message is offered to
//! every handler in registration order, then returned to the caller of
//! [`MessageDispatcher::next`], so an orchestrator can both log traffic
//! through a handler and react to it in its own loop.

use castctl_core::CastError;
use serde_json::Value;
use tracing::debug;

use crate::application::transport::Session;

/// Callback invoked once per inbound message.
pub type MessageHandler = Box<dyn FnMut(&Value) + Send>;

/// Owns a session and its registered handlers.
pub struct MessageDispatcher {
    session: Box<dyn Session>,
    handlers: Vec<MessageHandler>,
    stopped: bool,
}

impl MessageDispatcher {
    pub fn new(session: Box<dyn Session>) -> Self {
        Self {
            session,
            handlers: Vec::new(),
            stopped: false,
        }
    }

    pub fn namespace(&self) -> Option<&str> {
        self.session.namespace()
    }

    /// Registers a handler for every message received from now on.
    pub fn on_message<F>(&mut self, handler: F)
    where
        F: FnMut(&Value) + Send + 'static,
    {
        self.handlers.push(Box::new(handler));
    }

    /// Queues `payload` without waiting for delivery.
    ///
    /// # Errors
    ///
    /// Returns [`CastError::SendFailed`] after [`stop`](Self::stop), or the
    /// transport's error if the message could not be queued.
    pub fn send(&mut self, payload: Value) -> Result<(), CastError> {
        self.ensure_open()?;
        debug!(namespace = self.namespace(), %payload, "send");
        self.session.send(payload)
    }

    /// Sends `payload` and waits for the delivery acknowledgment.
    ///
    /// # Errors
    ///
    /// Returns [`CastError::SendFailed`] if delivery is not acknowledged.
    pub async fn send_acked(&mut self, payload: Value) -> Result<(), CastError> {
        self.ensure_open()?;
        debug!(namespace = self.namespace(), %payload, "send (acknowledged)");
        self.session.send_acked(payload).await
    }

    /// Waits for the next inbound message, hands it to every handler, and
    /// returns it.  `None` once the session has ended.
    pub async fn next(&mut self) -> Option<Value> {
        if self.stopped {
            return None;
        }
        let message = self.session.recv().await?;
        for handler in &mut self.handlers {
            handler(&message);
        }
        Some(message)
    }

    /// Ends the session.  Idempotent.
    pub fn stop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.session.stop();
        }
    }

    fn ensure_open(&self) -> Result<(), CastError> {
        if self.stopped {
            return Err(CastError::SendFailed("session already stopped".to_string()));
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
