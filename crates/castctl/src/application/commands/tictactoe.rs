//! `tictactoe`: join a running tic-tac-toe game and play random moves.
//!
//! The game rules live in [`GameClient`], a plain state machine that maps
//! each inbound [`GameEvent`] to a [`GameAction`].  The orchestrator only
//! moves payloads between the session and the client.
//!
//! ```text
//! send join ─► joined(player) ─► send board_layout_request
//!          ─► board_layout_response ─► move if we are X
//!          ─► moved(opponent) ─► move        moved(us) ─► wait
//!          ─► moved(game_over) / endgame ─► stop
//!          ─► error ─► fail
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use castctl_core::{Board, CastError, Cell, DeviceEndpoint, GameEvent, GameRequest, Player};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use crate::application::commands::Orchestrator;
use crate::application::dispatch::MessageDispatcher;
use crate::application::lifecycle::{CommandContext, CommandOutcome};
use crate::application::transport::{ConnectOptions, DeviceEvent, Transport};

// ── Game state machine ────────────────────────────────────────────────────────

/// What the orchestrator should do after an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameAction {
    /// Send these requests, in order.
    Send(Vec<GameRequest>),
    /// The game is over.
    Stop,
    /// The receiver reported an error, or sent something unusable.
    Fail(CastError),
    /// Nothing to do.
    Ignore,
}

/// Client-side view of one game.
#[derive(Debug, Default)]
pub struct GameClient {
    player: Option<Player>,
    board: Board,
}

impl GameClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn player(&self) -> Option<Player> {
        self.player
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn handle<R: Rng + ?Sized>(&mut self, event: GameEvent, rng: &mut R) -> GameAction {
        match event {
            GameEvent::Joined { player, opponent } => {
                info!(?player, opponent = opponent.as_deref().unwrap_or("?"), "joined game");
                self.player = Some(player);
                GameAction::Send(vec![GameRequest::BoardLayoutRequest])
            }
            GameEvent::BoardLayoutResponse { board } => match Board::from_layout(&board) {
                Ok(board) => {
                    self.board = board;
                    match self.player {
                        Some(player) if player.moves_first() => self.next_move(rng),
                        _ => GameAction::Ignore,
                    }
                }
                Err(e) => GameAction::Fail(CastError::Protocol(format!("bad board layout: {e}"))),
            },
            GameEvent::Moved {
                player,
                row,
                column,
                game_over,
            } => {
                let cell = match Cell::new(row, column) {
                    Ok(cell) => cell,
                    Err(e) => return GameAction::Fail(CastError::Protocol(format!("bad move: {e}"))),
                };
                self.board.set(cell, player);
                debug!(?player, row, column, game_over, "moved");
                if game_over {
                    info!("game over");
                    return GameAction::Stop;
                }
                match self.player {
                    Some(me) if me != player => self.next_move(rng),
                    _ => GameAction::Ignore,
                }
            }
            GameEvent::Endgame { end_state } => {
                info!(end_state = end_state.as_deref().unwrap_or("unknown"), "game ended");
                GameAction::Stop
            }
            GameEvent::Error { message } => GameAction::Fail(CastError::Protocol(message)),
            GameEvent::Unknown => {
                debug!("ignoring unknown game event");
                GameAction::Ignore
            }
        }
    }

    fn next_move<R: Rng + ?Sized>(&self, rng: &mut R) -> GameAction {
        if self.board.is_full() {
            return GameAction::Ignore;
        }
        match self.board.choose_move(rng) {
            Some(cell) => {
                info!(row = cell.row, column = cell.column, "placing token");
                GameAction::Send(vec![GameRequest::place(cell)])
            }
            None => GameAction::Ignore,
        }
    }
}

// ── Orchestrator ──────────────────────────────────────────────────────────────

pub struct TicTacToeCommand {
    endpoint: DeviceEndpoint,
    options: ConnectOptions,
    app_id: String,
    namespace: String,
    player_name: String,
}

impl TicTacToeCommand {
    pub fn new(
        endpoint: DeviceEndpoint,
        options: ConnectOptions,
        app_id: String,
        namespace: String,
        player_name: String,
    ) -> Self {
        Self {
            endpoint,
            options,
            app_id,
            namespace,
            player_name,
        }
    }
}

fn send_all(dispatcher: &mut MessageDispatcher, requests: &[GameRequest]) -> Result<(), CastError> {
    for request in requests {
        let payload = request
            .to_payload()
            .map_err(|e| CastError::Protocol(e.to_string()))?;
        dispatcher.send(payload)?;
    }
    Ok(())
}

#[async_trait]
impl Orchestrator for TicTacToeCommand {
    fn name(&self) -> &'static str {
        "tictactoe"
    }

    async fn run(self: Box<Self>, transport: Arc<dyn Transport>) -> CommandOutcome {
        let TicTacToeCommand {
            endpoint,
            options,
            app_id,
            namespace,
            player_name,
        } = *self;
        let mut ctx = CommandContext::new("tictactoe", endpoint, options);
        let mut handle = ctx.open(transport.as_ref());

        let device = match ctx.connected(&mut handle).await {
            Ok(device) => device,
            Err(e) => return ctx.fail(&mut handle, e),
        };
        let mut app = match device.resolve_application(&app_id).await {
            Ok(app) => app,
            Err(e) => return ctx.fail(&mut handle, e),
        };
        let mut dispatcher = match app.join(&namespace).await {
            Ok(dispatcher) => dispatcher,
            Err(e) => return ctx.fail(&mut handle, e),
        };
        dispatcher.on_message(|message| debug!(%message, "game message"));

        if let Err(e) = send_all(&mut dispatcher, &[GameRequest::Join { name: player_name }]) {
            return ctx.fail(&mut handle, e);
        }

        let mut rng = StdRng::from_entropy();
        let mut game = GameClient::new();
        loop {
            tokio::select! {
                message = dispatcher.next() => {
                    let Some(message) = message else {
                        let e = CastError::Connection("game session closed by the receiver".to_string());
                        return ctx.fail(&mut handle, e);
                    };
                    let event = match GameEvent::parse(&message) {
                        Ok(event) => event,
                        Err(e) => {
                            warn!(%message, "skipping unreadable game message: {e}");
                            continue;
                        }
                    };
                    match game.handle(event, &mut rng) {
                        GameAction::Send(requests) => {
                            if let Err(e) = send_all(&mut dispatcher, &requests) {
                                return ctx.fail(&mut handle, e);
                            }
                        }
                        GameAction::Stop => {
                            dispatcher.stop();
                            return ctx.finish(&mut handle);
                        }
                        GameAction::Fail(e) => {
                            dispatcher.stop();
                            return ctx.fail(&mut handle, e);
                        }
                        GameAction::Ignore => {}
                    }
                }
                event = handle.next_event() => {
                    let cause = match event {
                        Some(DeviceEvent::Message(_)) | Some(DeviceEvent::Connected) => continue,
                        Some(DeviceEvent::Error(cause)) => cause,
                        Some(DeviceEvent::Disconnected) | None => "connection lost mid-game".to_string(),
                    };
                    return ctx.fail(&mut handle, CastError::Connection(cause));
                }
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
