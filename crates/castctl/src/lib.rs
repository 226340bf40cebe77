//! castctl library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # Layout
//!
//! ```text
//! cli                 subcommand registry (clap builder)
//! application/
//!   commands/         one orchestrator per subcommand
//!   lifecycle         CommandContext: the single stop/report exit
//!   device, session   typestate wrappers over the transport ports
//!   dispatch          message fan-out for an open session
//!   transport         Transport / Device / Application / Session traits
//! infrastructure/
//!   transport/        TCP transport and the scripted in-memory transport
//!   discovery         UDP presence announcements
//!   config            TOML configuration
//! ```

pub mod application;
pub mod cli;
pub mod infrastructure;
pub mod test_support;
