//! Messages exchanged with the tic-tac-toe receiver application.
//!
//! Requests carry a `command` tag, events an `event` tag:
//!
//! ```text
//! client ──► {"command":"join","name":"castctl"}
//!        ◄── {"event":"joined","player":"X","opponent":"phone"}
//! client ──► {"command":"board_layout_request"}
//!        ◄── {"event":"board_layout_response","board":[0,0,0,0,0,0,0,0,0]}
//! client ──► {"command":"move","row":1,"column":1}
//!        ◄── {"event":"moved","player":"X","row":1,"column":1,"game_over":false}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::board::{Cell, Player};

/// Outbound game commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum GameRequest {
    /// Ask to be seated; the receiver answers with `joined`.
    Join { name: String },
    /// Ask for the current board; the receiver answers with
    /// `board_layout_response`.
    BoardLayoutRequest,
    /// Place our token.
    Move { row: usize, column: usize },
}

impl GameRequest {
    pub fn place(cell: Cell) -> Self {
        GameRequest::Move {
            row: cell.row,
            column: cell.column,
        }
    }

    /// Serializes the request into a session payload.
    ///
    /// # Errors
    ///
    /// Propagates [`serde_json::Error`]; the request types here always
    /// serialize, so this only fails on allocator exhaustion.
    pub fn to_payload(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

/// Inbound game events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GameEvent {
    /// We were seated and assigned a token.
    Joined {
        player: Player,
        #[serde(default)]
        opponent: Option<String>,
    },
    /// Current board, row-major: `0` empty, `1` X, `2` O.
    BoardLayoutResponse { board: Vec<u8> },
    /// Somebody (possibly us) placed a token.
    Moved {
        player: Player,
        row: usize,
        column: usize,
        #[serde(default)]
        game_over: bool,
    },
    /// Final result announcement.
    Endgame {
        #[serde(default)]
        end_state: Option<String>,
    },
    /// The receiver rejected something we did.
    Error { message: String },
    /// Anything this client does not understand.
    #[serde(other)]
    Unknown,
}

impl GameEvent {
    /// Parses a session payload.
    ///
    /// # Errors
    ///
    /// Returns [`serde_json::Error`] when the payload has no `event` tag or a
    /// known event is missing required fields.
    pub fn parse(payload: &Value) -> Result<Self, serde_json::Error> {
        GameEvent::deserialize(payload)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_join_request_payload_shape() {
        let payload = GameRequest::Join {
            name: "castctl".to_string(),
        }
        .to_payload()
        .unwrap();
        assert_eq!(payload, json!({"command": "join", "name": "castctl"}));
    }

    #[test]
    fn test_board_layout_request_payload_shape() {
        let payload = GameRequest::BoardLayoutRequest.to_payload().unwrap();
        assert_eq!(payload, json!({"command": "board_layout_request"}));
    }

    #[test]
    fn test_place_builds_move_from_cell() {
        let cell = Cell::new(2, 1).unwrap();
        assert_eq!(
            GameRequest::place(cell).to_payload().unwrap(),
            json!({"command": "move", "row": 2, "column": 1})
        );
    }

    #[test]
    fn test_parse_joined_event() {
        // Arrange
        let payload = json!({"event": "joined", "player": "O", "opponent": "phone"});

        // Act
        let event = GameEvent::parse(&payload).unwrap();

        // Assert
        assert_eq!(
            event,
            GameEvent::Joined {
                player: Player::O,
                opponent: Some("phone".to_string())
            }
        );
    }

    #[test]
    fn test_parse_moved_defaults_game_over_to_false() {
        let payload = json!({"event": "moved", "player": "X", "row": 0, "column": 2});
        assert_eq!(
            GameEvent::parse(&payload).unwrap(),
            GameEvent::Moved {
                player: Player::X,
                row: 0,
                column: 2,
                game_over: false
            }
        );
    }

    #[test]
    fn test_parse_unknown_event_is_tolerated() {
        let payload = json!({"event": "spectator_joined", "name": "tv"});
        assert_eq!(GameEvent::parse(&payload).unwrap(), GameEvent::Unknown);
    }

    #[test]
    fn test_parse_without_event_tag_fails() {
        assert!(GameEvent::parse(&json!({"player": "X"})).is_err());
    }
}
