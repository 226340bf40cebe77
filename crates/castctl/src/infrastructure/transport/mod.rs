//! Transport implementations.
//!
//! - **`tcp`**      – The reference transport: length-prefixed JSON frames over
//!   TCP, with UDP announcements for discovery.
//! - **`scripted`** – Replays a [`scripted::DeviceScript`] and records every
//!   call.  Used by the unit and integration tests.

pub mod scripted;
pub mod tcp;

pub use tcp::TcpTransport;
