//! UDP announcement-based device discovery.
//!
//! Receivers periodically send a small JSON [`Announcement`] datagram to the
//! discovery port.  [`scan`] binds that port and turns the announcements into
//! [`PresenceEvent`]s:
//!
//! - the first announcement from a device id → `Online`;
//! - an announcement with `"goodbye": true` → `Offline` immediately;
//! - no announcement for `offline_after` → `Offline`.
//!
//! The presence bookkeeping lives in [`PresenceTracker`], which takes the
//! current time as an argument so it can be tested without sockets.
//!
//! ```text
//! {"id":"4f1c..","name":"Living Room","port":8009}
//! {"id":"4f1c..","name":"Living Room","goodbye":true}
//! ```

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use castctl_core::{DeviceInfo, DEFAULT_PORT};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::application::transport::{PresenceEvent, ScanOptions};

/// Error type for discovery operations.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The UDP socket could not be bound.
    #[error("failed to bind discovery socket on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// Datagram a receiver sends to announce itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Announcement {
    pub id: String,
    pub name: String,
    /// TCP control port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Sent once when the receiver shuts down.
    #[serde(default)]
    pub goodbye: bool,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

// ── Presence bookkeeping ──────────────────────────────────────────────────────

/// Tracks which devices are currently online.
#[derive(Debug)]
pub struct PresenceTracker {
    offline_after: Duration,
    seen: HashMap<String, (DeviceInfo, Instant)>,
}

impl PresenceTracker {
    pub fn new(offline_after: Duration) -> Self {
        Self {
            offline_after,
            seen: HashMap::new(),
        }
    }

    /// Records an announcement received from `source` at `now`.
    ///
    /// Returns `Online` on the first sighting and `Offline` for a goodbye from
    /// a known device.  Repeat announcements only refresh the timer.
    pub fn observe(&mut self, announcement: Announcement, source: IpAddr, now: Instant) -> Option<PresenceEvent> {
        if announcement.goodbye {
            return self
                .seen
                .remove(&announcement.id)
                .map(|(info, _)| PresenceEvent::Offline(info));
        }

        let info = DeviceInfo {
            id: announcement.id,
            name: announcement.name,
            address: source,
            port: announcement.port,
        };
        match self.seen.insert(info.id.clone(), (info.clone(), now)) {
            None => Some(PresenceEvent::Online(info)),
            Some(_) => None,
        }
    }

    /// Removes every device silent for `offline_after` or longer.
    pub fn expire(&mut self, now: Instant) -> Vec<PresenceEvent> {
        let limit = self.offline_after;
        let mut gone: Vec<DeviceInfo> = Vec::new();
        self.seen.retain(|_, (info, last)| {
            let alive = now.saturating_duration_since(*last) < limit;
            if !alive {
                gone.push(info.clone());
            }
            alive
        });
        gone.sort_by(|a, b| a.id.cmp(&b.id));
        gone.into_iter().map(PresenceEvent::Offline).collect()
    }

    pub fn online(&self) -> usize {
        self.seen.len()
    }
}

// ── Listener ──────────────────────────────────────────────────────────────────

/// Binds the discovery port and starts reporting presence changes.
///
/// The listener task runs until the returned receiver is dropped.
///
/// # Errors
///
/// Returns [`DiscoveryError::BindFailed`] if the socket cannot be bound.
pub async fn scan(options: &ScanOptions) -> Result<mpsc::Receiver<PresenceEvent>, DiscoveryError> {
    let addr = SocketAddr::from(([0, 0, 0, 0], options.port));
    let socket = UdpSocket::bind(addr)
        .await
        .map_err(|source| DiscoveryError::BindFailed { addr, source })?;

    let (tx, rx) = mpsc::channel(64);
    tokio::spawn(listen(socket, tx, PresenceTracker::new(options.offline_after)));

    info!(%addr, "listening for device announcements");
    Ok(rx)
}

async fn listen(socket: UdpSocket, tx: mpsc::Sender<PresenceEvent>, mut tracker: PresenceTracker) {
    let mut buf = vec![0u8; 4096];
    let period = (tracker.offline_after / 4).max(Duration::from_millis(100));
    let mut sweep = tokio::time::interval(period);
    sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        let events = tokio::select! {
            received = socket.recv_from(&mut buf) => {
                let (len, src) = match received {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!("discovery recv error: {e}");
                        continue;
                    }
                };
                match serde_json::from_slice::<Announcement>(&buf[..len]) {
                    Ok(announcement) => {
                        debug!(%src, id = %announcement.id, goodbye = announcement.goodbye, "announcement");
                        tracker.observe(announcement, src.ip(), Instant::now()).into_iter().collect()
                    }
                    Err(e) => {
                        debug!(%src, "ignoring undecodable datagram: {e}");
                        Vec::new()
                    }
                }
            }
            _ = sweep.tick() => tracker.expire(Instant::now()),
            _ = tx.closed() => break,
        };

        for event in events {
            if tx.send(event).await.is_err() {
                debug!("presence receiver dropped; stopping discovery");
                return;
            }
        }
    }
    debug!("discovery listener stopped");
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn announce(id: &str) -> Announcement {
        Announcement {
            id: id.to_string(),
            name: format!("device {id}"),
            port: 8009,
            goodbye: false,
        }
    }

    fn goodbye(id: &str) -> Announcement {
        Announcement {
            goodbye: true,
            ..announce(id)
        }
    }

    fn src() -> IpAddr {
        "192.0.2.10".parse().unwrap()
    }

    #[test]
    fn test_first_sighting_is_online_repeat_is_silent() {
        // Arrange
        let mut tracker = PresenceTracker::new(Duration::from_secs(15));
        let now = Instant::now();

        // Act
        let first = tracker.observe(announce("a"), src(), now);
        let again = tracker.observe(announce("a"), src(), now + Duration::from_secs(1));

        // Assert
        assert!(matches!(first, Some(PresenceEvent::Online(ref d)) if d.id == "a" && d.address == src()));
        assert_eq!(again, None);
        assert_eq!(tracker.online(), 1);
    }

    #[test]
    fn test_goodbye_reports_offline_immediately() {
        let mut tracker = PresenceTracker::new(Duration::from_secs(15));
        let now = Instant::now();
        tracker.observe(announce("a"), src(), now);

        let event = tracker.observe(goodbye("a"), src(), now);

        assert!(matches!(event, Some(PresenceEvent::Offline(ref d)) if d.id == "a"));
        assert_eq!(tracker.online(), 0);
    }

    #[test]
    fn test_goodbye_from_unknown_device_is_ignored() {
        let mut tracker = PresenceTracker::new(Duration::from_secs(15));

        assert_eq!(tracker.observe(goodbye("ghost"), src(), Instant::now()), None);
    }

    #[test]
    fn test_silent_devices_expire_after_window() {
        // Arrange
        let window = Duration::from_secs(15);
        let mut tracker = PresenceTracker::new(window);
        let start = Instant::now();
        tracker.observe(announce("b"), src(), start);
        tracker.observe(announce("a"), src(), start);
        tracker.observe(announce("c"), src(), start + Duration::from_secs(10));

        // Act
        let early = tracker.expire(start + Duration::from_secs(14));
        let late = tracker.expire(start + window);

        // Assert
        assert!(early.is_empty());
        let ids: Vec<_> = late
            .iter()
            .map(|e| match e {
                PresenceEvent::Offline(d) => d.id.as_str(),
                PresenceEvent::Online(_) => panic!("unexpected online"),
            })
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(tracker.online(), 1);
    }

    #[test]
    fn test_announcement_port_defaults_when_absent() {
        let parsed: Announcement = serde_json::from_str(r#"{"id":"x","name":"Den"}"#).unwrap();

        assert_eq!(parsed.port, DEFAULT_PORT);
        assert!(!parsed.goodbye);
    }

    #[tokio::test]
    async fn test_scan_reports_announced_device() {
        // Arrange: find a free port by binding port 0 and reading it back
        let probe = std::net::UdpSocket::bind("127.0.0.1:0").expect("probe bind");
        let port = probe.local_addr().unwrap().port();
        drop(probe);
        let options = ScanOptions {
            port,
            offline_after: Duration::from_secs(15),
        };
        let mut rx = scan(&options).await.expect("scan");

        // Act
        let sender = UdpSocket::bind("127.0.0.1:0").await.expect("sender bind");
        let datagram = serde_json::to_vec(&announce("tv")).unwrap();
        sender
            .send_to(&datagram, ("127.0.0.1", port))
            .await
            .expect("send");

        // Assert
        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("event in time");
        assert!(matches!(event, Some(PresenceEvent::Online(ref d)) if d.id == "tv" && d.port == 8009));
    }

    #[tokio::test]
    async fn test_scan_reports_bind_failure() {
        // Arrange: hold the port so the scan cannot bind it
        let holder = std::net::UdpSocket::bind("0.0.0.0:0").expect("holder bind");
        let port = holder.local_addr().unwrap().port();

        // Act
        let result = scan(&ScanOptions {
            port,
            ..ScanOptions::default()
        })
        .await;

        // Assert
        assert!(matches!(result, Err(DiscoveryError::BindFailed { .. })));
    }
}
