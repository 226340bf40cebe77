//! Device identity, status, and connection lifecycle.
//!
//! # Connection lifecycle
//!
//! A device handle moves through these states:
//!
//! ```text
//! Disconnected ──► Connecting ──► Connected ──► Disconnected
//!                      │              │
//!                      └──► Errored ◄─┘
//! ```
//!
//! Transitions are driven only by the transport.  Reconnection is never
//! attempted, so `Errored` and the second `Disconnected` are terminal for the
//! handle that reached them.

use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// TCP port receivers listen on unless told otherwise.
pub const DEFAULT_PORT: u16 = 8009;

/// Where to reach a device.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceEndpoint {
    /// Hostname or IP literal.
    pub host: String,
    pub port: u16,
}

impl DeviceEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Endpoint on [`DEFAULT_PORT`].
    pub fn with_default_port(host: impl Into<String>) -> Self {
        Self::new(host, DEFAULT_PORT)
    }
}

impl fmt::Display for DeviceEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Bracket IPv6 literals so the port stays unambiguous.
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// A device seen by discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Stable identifier advertised by the device.
    pub id: String,
    /// Human-readable display name.
    pub name: String,
    pub address: IpAddr,
    pub port: u16,
}

impl DeviceInfo {
    pub fn endpoint(&self) -> DeviceEndpoint {
        DeviceEndpoint::new(self.address.to_string(), self.port)
    }
}

/// Current state of a device connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection, either not yet started or lost after being established.
    Disconnected,
    /// Connect issued; waiting for the transport to report the outcome.
    Connecting,
    /// Ready for application and session operations.
    Connected,
    /// The transport reported an error.
    Errored,
}

impl ConnectionState {
    /// Returns `true` if the transport may move a handle from `self` to `next`.
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Connecting, Connected)
                | (Connecting, Errored)
                | (Connecting, Disconnected)
                | (Connected, Errored)
                | (Connected, Disconnected)
        )
    }
}

/// Volume as reported in a device status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Volume {
    /// Level in `0.0..=1.0`.
    pub level: f32,
    pub muted: bool,
}

impl Default for Volume {
    fn default() -> Self {
        Self {
            level: 1.0,
            muted: false,
        }
    }
}

/// An application currently running on the receiver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunningApplication {
    pub app_id: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_text: Option<String>,
    /// Namespaces the application accepts sessions on.
    #[serde(default)]
    pub namespaces: Vec<String>,
}

/// Response to a status query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceStatus {
    #[serde(default)]
    pub volume: Volume,
    #[serde(default)]
    pub applications: Vec<RunningApplication>,
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_display_ipv4() {
        let ep = DeviceEndpoint::new("192.0.2.1", 8009);
        assert_eq!(ep.to_string(), "192.0.2.1:8009");
    }

    #[test]
    fn test_endpoint_display_brackets_ipv6() {
        let ep = DeviceEndpoint::new("2001:db8::1", 8009);
        assert_eq!(ep.to_string(), "[2001:db8::1]:8009");
    }

    #[test]
    fn test_with_default_port_uses_8009() {
        assert_eq!(DeviceEndpoint::with_default_port("tv").port, DEFAULT_PORT);
    }

    #[test]
    fn test_device_info_endpoint_uses_address_and_port() {
        // Arrange
        let info = DeviceInfo {
            id: "abc".to_string(),
            name: "Living Room".to_string(),
            address: "192.0.2.7".parse().unwrap(),
            port: 8010,
        };

        // Act
        let ep = info.endpoint();

        // Assert
        assert_eq!(ep, DeviceEndpoint::new("192.0.2.7", 8010));
    }

    #[test]
    fn test_connection_state_allows_connect_path() {
        use ConnectionState::*;
        assert!(Disconnected.can_transition_to(Connecting));
        assert!(Connecting.can_transition_to(Connected));
        assert!(Connected.can_transition_to(Disconnected));
    }

    #[test]
    fn test_connection_state_rejects_reconnect_after_error() {
        use ConnectionState::*;
        assert!(!Errored.can_transition_to(Connecting));
        assert!(!Errored.can_transition_to(Connected));
    }

    #[test]
    fn test_connection_state_rejects_skipping_connecting() {
        assert!(!ConnectionState::Disconnected.can_transition_to(ConnectionState::Connected));
    }

    #[test]
    fn test_device_status_deserializes_with_missing_fields() {
        // Arrange
        let json = r#"{"applications":[{"app_id":"CC1AD845","display_name":"Default Media Receiver"}]}"#;

        // Act
        let status: DeviceStatus = serde_json::from_str(json).expect("parse");

        // Assert
        assert_eq!(status.volume, Volume::default());
        assert_eq!(status.applications.len(), 1);
        assert!(status.applications[0].status_text.is_none());
    }
}
