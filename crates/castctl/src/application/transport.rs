//! Ports to the transport and discovery collaborator.
//!
//! The orchestrators only ever talk to a device through these traits.  The
//! reference implementation lives in `infrastructure::transport::tcp`; tests
//! use `infrastructure::transport::scripted` or the `mockall` mocks generated
//! here.
//!
//! # Object hierarchy
//!
//! ```text
//! Transport ──connect──► Device ──application──► Application ──run/join──► Session
//!     │
//!     └──scan──► PresenceEvent stream
//! ```
//!
//! Every object below `Transport` is owned by exactly one command invocation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use castctl_core::{CastError, DeviceEndpoint, DeviceInfo, DeviceStatus};
use serde_json::Value;
use tokio::sync::mpsc;

/// Lifecycle and raw-message events emitted by a device connection.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    /// The connection is ready for application and session operations.
    Connected,
    /// A transport failure, with a human-readable cause.
    Error(String),
    /// Connectivity was lost.
    Disconnected,
    /// A sessionless message sent by the device.
    Message(Value),
}

/// Device presence as reported by discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceEvent {
    Online(DeviceInfo),
    Offline(DeviceInfo),
}

/// Options applied when opening a device connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Always `false`: a lost connection ends the command.
    pub reconnect: bool,
    /// Upper bound on connect, resolve, and join.  `None` waits forever.
    pub step_timeout: Option<Duration>,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            reconnect: false,
            step_timeout: None,
        }
    }
}

/// Options for a discovery scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOptions {
    /// UDP port announcements arrive on.
    pub port: u16,
    /// A device that stays silent this long is reported offline.
    pub offline_after: Duration,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            port: 5354,
            offline_after: Duration::from_secs(15),
        }
    }
}

/// A freshly created device connection: the device object plus the stream of
/// its lifecycle events.
pub struct DeviceLink {
    pub device: Arc<dyn Device>,
    pub events: mpsc::UnboundedReceiver<DeviceEvent>,
}

/// Entry point of the collaborator.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Creates a device connection and starts connecting immediately.
    ///
    /// The outcome arrives later as a [`DeviceEvent`] on the returned link.
    fn connect(&self, endpoint: &DeviceEndpoint, options: &ConnectOptions) -> DeviceLink;

    /// Starts listening for device presence announcements.
    async fn scan(&self, options: &ScanOptions)
        -> Result<mpsc::Receiver<PresenceEvent>, CastError>;
}

/// One device connection.
#[async_trait]
pub trait Device: Send + Sync {
    /// Queries the device status.
    async fn status(&self) -> Result<DeviceStatus, CastError>;

    /// Resolves `app_id` to a running or newly started application.
    async fn application(&self, app_id: &str) -> Result<Box<dyn Application>, CastError>;

    /// Tears the connection down.  Must be idempotent and safe in any state.
    fn stop(&self);
}

/// An application resolved on a connected device.
#[async_trait]
pub trait Application: Send {
    fn app_id(&self) -> &str;

    /// Starts the application without waiting for a session.
    fn launch(&mut self) -> Result<(), CastError>;

    /// Starts a new session; `None` uses the application's default channel.
    async fn run(&mut self, namespace: Option<&str>) -> Result<Box<dyn Session>, CastError>;

    /// Attaches to a session already running on the receiver.
    async fn join(&mut self, namespace: &str) -> Result<Box<dyn Session>, CastError>;
}

/// A namespaced, bidirectional message channel.
#[async_trait]
pub trait Session: Send {
    fn namespace(&self) -> Option<&str>;

    /// Queues `payload` without waiting for delivery.
    fn send(&mut self, payload: Value) -> Result<(), CastError>;

    /// Sends `payload` and waits for the delivery acknowledgment.
    async fn send_acked(&mut self, payload: Value) -> Result<(), CastError>;

    /// Next inbound message, in arrival order.  `None` once the session ends.
    async fn recv(&mut self) -> Option<Value>;

    /// Ends the session.  Idempotent.
    fn stop(&mut self);
}
