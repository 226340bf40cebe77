//! Infrastructure layer: sockets and files.
//!
//! Concrete implementations of the ports declared in
//! [`crate::application::transport`], plus configuration loading.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `castctl_core`, but MUST NOT be imported by the `application` layer
//! outside its tests.

pub mod config;
pub mod discovery;
pub mod transport;
