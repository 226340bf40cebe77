//! Protocol module: game messages, transport frames, and the frame codec.

pub mod codec;
pub mod frame;
pub mod game;
pub mod sequence;

pub use codec::{decode_frame, encode_frame, FrameError};
pub use frame::{Envelope, FailureKind, Frame};
pub use game::{GameEvent, GameRequest};
pub use sequence::SequenceCounter;
