//! # castctl-core
//!
//! Shared library for castctl containing the domain entities, the error
//! taxonomy, the tic-tac-toe game protocol, and the frame codec used by the
//! reference TCP transport.
//!
//! This crate has no dependency on sockets, async runtimes, or the command
//! line.  Everything here can be unit-tested in isolation.
//!
//! # Architecture overview
//!
//! castctl discovers media-receiver devices on the local network and drives
//! them through short multi-step interactions: connect, launch an
//! application, open a session on a namespace, exchange messages, stop.
//!
//! - **`domain`** – Device identity and status, the connection state machine,
//!   and the 3×3 game board with its move-selection rule.
//!
//! - **`protocol`** – The JSON messages exchanged with the tic-tac-toe
//!   receiver application, plus the length-prefixed frame format spoken by
//!   the reference transport.
//!
//! - **`error`** – [`CastError`], the single error type every orchestration
//!   step reports.

pub mod domain;
pub mod error;
pub mod protocol;

pub use domain::board::{Board, BoardError, Cell, Player};
pub use domain::device::{
    ConnectionState, DeviceEndpoint, DeviceInfo, DeviceStatus, RunningApplication, Volume,
    DEFAULT_PORT,
};
pub use error::CastError;
pub use protocol::codec::{decode_frame, encode_frame, FrameError};
pub use protocol::frame::{Envelope, FailureKind, Frame};
pub use protocol::game::{GameEvent, GameRequest};
