//! Command orchestrators: one per CLI subcommand.
//!
//! Each orchestrator owns a single invocation from start to finish.  The
//! device-bound ones all follow the same shape:
//!
//! ```text
//! ctx.open(transport) ─► ctx.connected(handle) ─► resolve / session / messages
//!                                  │                        │
//!                                  └──── error ─► ctx.fail  └─► ctx.finish
//! ```
//!
//! `ctx.fail` and `ctx.finish` are the only ways to a terminal state, and
//! both stop the device handle.  The two indefinite `watch` variants and
//! `discover` never reach `finish`; they run until cancelled.
//!
//! # Sub-modules
//!
//! - **`discover`**   – Log devices appearing and disappearing on the network.
//! - **`status`**     – Print one device status and exit.
//! - **`watch`**      – Log raw device or session messages until cancelled.
//! - **`run`**        – Launch an application, optionally on a namespace.
//! - **`hello`**      – Send a text message and wait for delivery.
//! - **`url_launch`** – Hand a URL to a preset receiver application.
//! - **`tictactoe`**  – Play tic-tac-toe against another player on the receiver.

pub mod discover;
pub mod hello;
pub mod run;
pub mod status;
pub mod tictactoe;
pub mod url_launch;
pub mod watch;

use std::sync::Arc;

use async_trait::async_trait;

use crate::application::lifecycle::CommandOutcome;
use crate::application::transport::Transport;

pub use discover::DiscoverCommand;
pub use hello::HelloCommand;
pub use run::RunCommand;
pub use status::StatusCommand;
pub use tictactoe::TicTacToeCommand;
pub use url_launch::{UrlLaunchCommand, UrlLauncher, UrlPayload};
pub use watch::WatchCommand;

/// A fully configured command, ready to run once.
#[async_trait]
pub trait Orchestrator: Send {
    /// Subcommand name, used in logs.
    fn name(&self) -> &'static str;

    /// Drives the command to completion.
    async fn run(self: Box<Self>, transport: Arc<dyn Transport>) -> CommandOutcome;
}
