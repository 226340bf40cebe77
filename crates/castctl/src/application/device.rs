//! Device handle lifecycle and the application launcher.
//!
//! [`DeviceHandle`] wraps one device connection.  It tracks the connection
//! state from the events the transport emits, and it is the only thing that
//! can stop the connection.  It deliberately exposes no device operations:
//! those live on [`ConnectedDevice`], which can only be obtained from
//! [`DeviceHandle::wait_connected`].  Code that holds a `ConnectedDevice` has
//! therefore observed `connected`.

use std::sync::Arc;
use std::time::Duration;

use castctl_core::{CastError, ConnectionState, DeviceEndpoint, DeviceStatus};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::application::lifecycle::within;
use crate::application::session::AppInstance;
use crate::application::transport::{ConnectOptions, Device, DeviceEvent, Transport};

/// Client-side proxy for one device's connection lifecycle.
pub struct DeviceHandle {
    endpoint: DeviceEndpoint,
    state: ConnectionState,
    device: Arc<dyn Device>,
    events: mpsc::UnboundedReceiver<DeviceEvent>,
    step_timeout: Option<Duration>,
    stopped: bool,
}

impl DeviceHandle {
    /// Creates the connection.  Connecting starts immediately.
    pub fn open(transport: &dyn Transport, endpoint: &DeviceEndpoint, options: &ConnectOptions) -> Self {
        let link = transport.connect(endpoint, options);
        Self {
            endpoint: endpoint.clone(),
            state: ConnectionState::Connecting,
            device: link.device,
            events: link.events,
            step_timeout: options.step_timeout,
            stopped: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn endpoint(&self) -> &DeviceEndpoint {
        &self.endpoint
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Waits until the transport reports `connected`.
    ///
    /// # Errors
    ///
    /// Returns [`CastError::Connection`] if the transport reports `error` or
    /// `disconnected` first, or if the handle was already stopped.
    pub async fn wait_connected(&mut self) -> Result<ConnectedDevice, CastError> {
        loop {
            match self.next_event().await {
                Some(DeviceEvent::Connected) => {
                    return Ok(ConnectedDevice {
                        device: Arc::clone(&self.device),
                        step_timeout: self.step_timeout,
                    })
                }
                Some(DeviceEvent::Error(cause)) => return Err(CastError::Connection(cause)),
                Some(DeviceEvent::Disconnected) => {
                    return Err(CastError::Connection(format!(
                        "{} disconnected before the connection was established",
                        self.endpoint
                    )))
                }
                Some(DeviceEvent::Message(_)) => {
                    debug!(endpoint = %self.endpoint, "dropping device message received before connect");
                }
                None => {
                    return Err(CastError::Connection(format!(
                        "connection to {} closed",
                        self.endpoint
                    )))
                }
            }
        }
    }

    /// Next lifecycle or raw-message event, in arrival order.
    ///
    /// Returns `None` after [`stop`](Self::stop) or once the transport has
    /// gone away.
    pub async fn next_event(&mut self) -> Option<DeviceEvent> {
        if self.stopped {
            return None;
        }
        let event = self.events.recv().await?;
        self.observe(&event);
        Some(event)
    }

    /// Tears the connection down.  Safe to call in any state, any number of
    /// times; only the first call reaches the transport.
    pub fn stop(&mut self) {
        if self.stopped {
            debug!(endpoint = %self.endpoint, "stop ignored: already stopped");
            return;
        }
        self.stopped = true;
        self.device.stop();
        self.events.close();
        debug!(endpoint = %self.endpoint, "device handle stopped");
    }

    fn observe(&mut self, event: &DeviceEvent) {
        let next = match event {
            DeviceEvent::Connected => ConnectionState::Connected,
            DeviceEvent::Error(_) => ConnectionState::Errored,
            DeviceEvent::Disconnected => ConnectionState::Disconnected,
            DeviceEvent::Message(_) => return,
        };
        if self.state.can_transition_to(next) {
            self.state = next;
        } else {
            warn!(
                endpoint = %self.endpoint,
                from = ?self.state,
                to = ?next,
                "transport reported an unexpected state change"
            );
        }
    }
}

/// Capability to issue device operations, proof that `connected` was seen.
pub struct ConnectedDevice {
    device: Arc<dyn Device>,
    step_timeout: Option<Duration>,
}

impl ConnectedDevice {
    /// Queries the device status.
    ///
    /// # Errors
    ///
    /// Propagates the transport's [`CastError`].
    pub async fn status(&self) -> Result<DeviceStatus, CastError> {
        self.device.status().await
    }

    /// Resolves `app_id` to a running or newly started application.
    ///
    /// # Errors
    ///
    /// Returns [`CastError::ApplicationNotFound`] when the device has no such
    /// application, or [`CastError::Timeout`] when a step timeout is set and
    /// elapses.
    pub async fn resolve_application(&self, app_id: &str) -> Result<AppInstance, CastError> {
        let app = within("resolve", self.step_timeout, self.device.application(app_id)).await?;
        debug!(app_id, "application resolved");
        Ok(AppInstance::new(app, self.step_timeout))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
