//! `discover`: log device presence changes until cancelled.
//!
//! Holds no device handle, so there is nothing to stop.

use std::sync::Arc;

use async_trait::async_trait;
use castctl_core::DeviceInfo;
use tracing::{error, info};

use crate::application::commands::Orchestrator;
use crate::application::lifecycle::CommandOutcome;
use crate::application::transport::{PresenceEvent, ScanOptions, Transport};

pub struct DiscoverCommand {
    options: ScanOptions,
}

impl DiscoverCommand {
    pub fn new(options: ScanOptions) -> Self {
        Self { options }
    }
}

fn log_presence(event: &PresenceEvent) {
    let (state, DeviceInfo { id, name, address, port }) = match event {
        PresenceEvent::Online(info) => ("online", info),
        PresenceEvent::Offline(info) => ("offline", info),
    };
    info!(id = %id, name = %name, address = %address, port, "device {state}");
}

#[async_trait]
impl Orchestrator for DiscoverCommand {
    fn name(&self) -> &'static str {
        "discover"
    }

    async fn run(self: Box<Self>, transport: Arc<dyn Transport>) -> CommandOutcome {
        let mut presence = match transport.scan(&self.options).await {
            Ok(rx) => rx,
            Err(e) => {
                error!(command = "discover", kind = e.label(), "{e}");
                return CommandOutcome::Failed(e);
            }
        };

        while let Some(event) = presence.recv().await {
            log_presence(&event);
        }
        CommandOutcome::Done
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
