//! Application layer: the command orchestration engine.
//!
//! Everything here talks to devices only through the traits in
//! [`transport`], so the same orchestrators run against the TCP transport
//! in production and against a scripted transport in tests.
//!
//! # Sub-modules
//!
//! - **`transport`** – Ports: the traits a transport must implement, and the
//!   events it emits.
//! - **`lifecycle`** – The per-invocation state machine and the
//!   `fail`/`finish` exits that stop the device handle exactly once.
//! - **`device`**    – Device handle lifecycle and application resolution.
//! - **`session`**   – Starting or joining a session on an application.
//! - **`dispatch`**  – Sending messages and fanning inbound ones out to
//!   handlers.
//! - **`commands`**  – One orchestrator per subcommand.

pub mod commands;
pub mod device;
pub mod dispatch;
pub mod lifecycle;
pub mod session;
pub mod transport;
