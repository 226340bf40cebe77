//! `run`: start an application, optionally opening a session on a namespace.
//!
//! Without a namespace the launch is fire-and-forget: the request is queued
//! and the handle stopped straight away.  With one, the command waits for
//! the session to start, then closes it again.  Either way it makes exactly
//! one attempt.

use std::sync::Arc;

use async_trait::async_trait;
use castctl_core::DeviceEndpoint;
use tracing::info;

use crate::application::commands::Orchestrator;
use crate::application::lifecycle::{CommandContext, CommandOutcome};
use crate::application::transport::{ConnectOptions, Transport};

pub struct RunCommand {
    endpoint: DeviceEndpoint,
    options: ConnectOptions,
    app_id: String,
    namespace: Option<String>,
}

impl RunCommand {
    pub fn new(endpoint: DeviceEndpoint, options: ConnectOptions, app_id: String, namespace: Option<String>) -> Self {
        Self {
            endpoint,
            options,
            app_id,
            namespace,
        }
    }
}

#[async_trait]
impl Orchestrator for RunCommand {
    fn name(&self) -> &'static str {
        "run"
    }

    async fn run(self: Box<Self>, transport: Arc<dyn Transport>) -> CommandOutcome {
        let RunCommand {
            endpoint,
            options,
            app_id,
            namespace,
        } = *self;
        let mut ctx = CommandContext::new("run", endpoint, options);
        let mut handle = ctx.open(transport.as_ref());

        let device = match ctx.connected(&mut handle).await {
            Ok(device) => device,
            Err(e) => return ctx.fail(&mut handle, e),
        };
        let mut app = match device.resolve_application(&app_id).await {
            Ok(app) => app,
            Err(e) => return ctx.fail(&mut handle, e),
        };

        let Some(namespace) = namespace else {
            return match app.launch() {
                Ok(()) => ctx.finish(&mut handle),
                Err(e) => ctx.fail(&mut handle, e),
            };
        };

        match app.run(Some(&namespace)).await {
            Ok(mut dispatcher) => {
                info!(app_id = %app_id, namespace = %namespace, "session started");
                dispatcher.stop();
                ctx.finish(&mut handle)
            }
            Err(e) => ctx.fail(&mut handle, e),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
