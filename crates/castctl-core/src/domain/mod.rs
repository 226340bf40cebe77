//! Domain entities for castctl.
//!
//! Pure data and rules with no infrastructure dependencies:
//!
//! - **`device`** – who a receiver is (address, port, identity), what it
//!   reports about itself, and the states its connection moves through.
//! - **`board`** – the tic-tac-toe board kept locally by the game client and
//!   the rule that picks our next move.

pub mod board;
pub mod device;
