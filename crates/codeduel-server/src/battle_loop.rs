use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use codeduel_core::battle::{BattleState, BattleStatus, RunOutcome};
use codeduel_core::net::messages::{
    EmojiMsg, GameOverMsg, GameOverReason, HintErrorMsg, HintResultMsg, MatchFoundMsg,
    RunErrorMsg, ServerMessage,
};
use codeduel_core::player::ConnectionId;
use codeduel_core::problem::Language;

use crate::broadcast::SessionChannel;
use crate::config::ServerConfig;
use crate::error::DuelError;
use crate::hint::{HintProvider, HintRequest};
use crate::judge::{Judge, grade};
use crate::registry::PlayerSender;

/// Longest emoji payload relayed, in bytes.
pub const MAX_EMOJI_BYTES: usize = 32;

/// Commands sent from connection handlers to a battle's actor.
#[derive(Debug)]
pub enum BattleCommand {
    RunCode {
        connection_id: ConnectionId,
        code: String,
        language: Option<String>,
    },
    GetHint {
        connection_id: ConnectionId,
        code: Option<String>,
    },
    SendEmoji {
        connection_id: ConnectionId,
        emoji: String,
    },
    PlayerLeft {
        connection_id: ConnectionId,
    },
    /// Reattach a seat to a new connection. The session token has already
    /// been resolved to `seat` by the coordinator.
    Rejoin {
        seat: usize,
        connection_id: ConnectionId,
        sender: PlayerSender,
        reply: oneshot::Sender<Result<(), DuelError>>,
    },
}

/// How the pair was formed. Selects the match notification event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BattleOrigin {
    Matchmaking,
    Room,
}

/// Returned when the actor exits. The `battle:gameOver` frame is held back
/// until [`BattleOutcome::announce`], so the caller can free both players
/// before they hear the battle is over.
pub struct BattleOutcome {
    pub state: BattleState,
    pub reason: GameOverReason,
    pub winner: Option<ConnectionId>,
    channel: SessionChannel,
}

impl BattleOutcome {
    pub fn game_over(&self) -> ServerMessage {
        let winner = self
            .winner
            .and_then(|id| self.state.seat_of(id))
            .map(|seat| &self.state.players[seat]);
        ServerMessage::GameOver(GameOverMsg {
            winner: winner.map(|p| p.name.clone()),
            winner_id: winner.map(|p| p.connection_id),
            reason: self.reason,
        })
    }

    /// Deliver `battle:gameOver` to every seat still attached.
    pub async fn announce(&self) {
        self.channel.broadcast_terminal(&self.game_over()).await;
    }
}

/// Everything needed to run one battle.
pub struct BattleSessionConfig {
    pub state: BattleState,
    pub origin: BattleOrigin,
    pub senders: [PlayerSender; 2],
    pub session_tokens: [String; 2],
    pub judge: Arc<dyn Judge>,
    pub hints: Arc<dyn HintProvider>,
    pub config: Arc<ServerConfig>,
}

/// Why the battle stopped, and the winning seat if any.
struct Ending(GameOverReason, Option<usize>);

struct BattleActor {
    state: BattleState,
    channel: SessionChannel,
    judge: Arc<dyn Judge>,
    hints: Arc<dyn HintProvider>,
    config: Arc<ServerConfig>,
    /// Most recent valid submission per seat, used for hints.
    last_code: [Option<String>; 2],
    /// Forfeit deadline per seat while its connection is gone.
    departed: [Option<Instant>; 2],
}

/// Prepare a battle actor. The caller spawns the returned future; it resolves
/// once the battle is over.
pub fn spawn_battle_session(
    session: BattleSessionConfig,
) -> (
    mpsc::UnboundedSender<BattleCommand>,
    impl Future<Output = BattleOutcome> + Send + 'static,
) {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let BattleSessionConfig {
        mut state,
        origin,
        senders,
        session_tokens,
        judge,
        hints,
        config,
    } = session;

    state.advance(BattleStatus::InProgress);
    let [a_tx, b_tx] = senders;
    let channel = SessionChannel::new(
        state.battle_id.clone(),
        [
            (state.players[0].connection_id, a_tx),
            (state.players[1].connection_id, b_tx),
        ],
    );
    let actor = BattleActor {
        state,
        channel,
        judge,
        hints,
        config,
        last_code: [None, None],
        departed: [None, None],
    };
    (cmd_tx, actor.run(origin, session_tokens, cmd_rx))
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(d) => tokio::time::sleep_until(d).await,
        None => std::future::pending().await,
    }
}

impl BattleActor {
    async fn run(
        mut self,
        origin: BattleOrigin,
        session_tokens: [String; 2],
        mut cmd_rx: mpsc::UnboundedReceiver<BattleCommand>,
    ) -> BattleOutcome {
        tracing::info!(
            battle_id = %self.state.battle_id,
            problem = %self.state.problem.id,
            a = self.state.players[0].connection_id,
            b = self.state.players[1].connection_id,
            ?origin,
            "Battle started"
        );
        self.announce(origin, session_tokens).await;

        loop {
            let deadline = self.departed.iter().flatten().min().copied();
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    let Some(cmd) = cmd else {
                        return self.finish(GameOverReason::Abandoned, None);
                    };
                    if let Some(Ending(reason, winner)) = self.handle(cmd).await {
                        return self.finish(reason, winner);
                    }
                }
                _ = sleep_until_opt(deadline) => {
                    let Ending(reason, winner) = self.forfeit_expired();
                    return self.finish(reason, winner);
                }
            }
        }
    }

    /// Send each seat its private match notification carrying its own token.
    async fn announce(&self, origin: BattleOrigin, session_tokens: [String; 2]) {
        let notices: Vec<ServerMessage> = session_tokens
            .into_iter()
            .map(|session_token| {
                let found = Box::new(MatchFoundMsg {
                    state: self.state.clone(),
                    session_token,
                });
                match origin {
                    BattleOrigin::Matchmaking => ServerMessage::MatchmakingSuccess(found),
                    BattleOrigin::Room => ServerMessage::RoomMatchFound(found),
                }
            })
            .collect();
        join_all(
            notices
                .iter()
                .enumerate()
                .map(|(seat, msg)| self.channel.send_to_seat_terminal(seat, msg)),
        )
        .await;
    }

    async fn handle(&mut self, cmd: BattleCommand) -> Option<Ending> {
        match cmd {
            BattleCommand::RunCode {
                connection_id,
                code,
                language,
            } => {
                let seat = self.seat_for(connection_id)?;
                self.run_code(seat, code, language).await
            },
            BattleCommand::GetHint {
                connection_id,
                code,
            } => {
                let seat = self.seat_for(connection_id)?;
                self.get_hint(seat, code).await;
                None
            },
            BattleCommand::SendEmoji {
                connection_id,
                emoji,
            } => {
                let seat = self.seat_for(connection_id)?;
                let emoji = emoji.trim();
                if emoji.is_empty() || emoji.len() > MAX_EMOJI_BYTES {
                    tracing::debug!(connection_id, "Ignoring invalid emoji");
                    return None;
                }
                self.channel.send_to_seat(
                    BattleState::opponent_seat(seat),
                    &ServerMessage::EmojiReceive(EmojiMsg {
                        emoji: emoji.to_string(),
                    }),
                );
                None
            },
            BattleCommand::PlayerLeft { connection_id } => {
                let seat = self.seat_for(connection_id)?;
                self.player_left(seat)
            },
            BattleCommand::Rejoin {
                seat,
                connection_id,
                sender,
                reply,
            } => {
                let result = self.rejoin(seat, connection_id, sender);
                if reply.send(result).is_err() {
                    tracing::debug!(battle_id = %self.state.battle_id, "Rejoin requester gone");
                }
                None
            },
        }
    }

    fn seat_for(&self, connection_id: ConnectionId) -> Option<usize> {
        let seat = self.state.seat_of(connection_id);
        if seat.is_none() {
            tracing::debug!(
                battle_id = %self.state.battle_id,
                connection_id,
                "Command from a connection not seated in this battle"
            );
        }
        seat
    }

    fn resolve_language(&self, language: Option<String>) -> Result<Language, DuelError> {
        match language {
            None => Ok(self.config.battle.default_language),
            Some(name) => Language::from_str_opt(&name).ok_or(DuelError::UnsupportedLanguage(name)),
        }
    }

    fn run_error(&self, seat: usize, error: &DuelError) {
        self.channel.send_to_seat(
            seat,
            &ServerMessage::RunError(RunErrorMsg {
                message: error.to_string(),
            }),
        );
    }

    async fn run_code(
        &mut self,
        seat: usize,
        code: String,
        language: Option<String>,
    ) -> Option<Ending> {
        let battle_id = self.state.battle_id.clone();
        let max = self.config.battle.max_code_bytes;
        if code.len() > max {
            self.run_error(seat, &DuelError::CodeTooLarge(max));
            return None;
        }
        let language = match self.resolve_language(language) {
            Ok(l) => l,
            Err(e) => {
                self.run_error(seat, &e);
                return None;
            },
        };
        self.last_code[seat] = Some(code.clone());

        let problem = Arc::clone(&self.state.problem);
        let version = self.config.judge.version_for(language);
        let verdicts = match grade(&*self.judge, &problem, language, version, &code).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(%battle_id, seat, error = %e, "Judge request failed");
                self.run_error(seat, &DuelError::from(e));
                return None;
            },
        };

        match self.state.record_run(seat, &verdicts) {
            Ok(RunOutcome::Won) => Some(Ending(GameOverReason::Solved, Some(seat))),
            Ok(RunOutcome::Progress) => {
                tracing::debug!(
                    %battle_id,
                    seat,
                    score = self.state.players[seat].score,
                    "Run recorded"
                );
                self.channel
                    .broadcast(&ServerMessage::state_update(self.state.clone()));
                None
            },
            Err(e) => {
                tracing::warn!(%battle_id, seat, error = %e, "Run rejected");
                self.run_error(seat, &DuelError::from(e));
                None
            },
        }
    }

    async fn get_hint(&self, seat: usize, code: Option<String>) {
        let code = code
            .filter(|c| !c.trim().is_empty())
            .or_else(|| self.last_code[seat].clone())
            .unwrap_or_default();
        let request = HintRequest {
            title: self.state.problem.title.clone(),
            description: self.state.problem.description.clone(),
            code,
        };
        let msg = match self.hints.hint(request).await {
            Ok(hint) => ServerMessage::HintResult(HintResultMsg { hint }),
            Err(e) => {
                tracing::warn!(battle_id = %self.state.battle_id, seat, error = %e, "Hint request failed");
                ServerMessage::HintError(HintErrorMsg {
                    message: e.to_string(),
                })
            },
        };
        self.channel.send_to_seat(seat, &msg);
    }

    fn player_left(&mut self, seat: usize) -> Option<Ending> {
        self.channel.detach(seat);
        if self.channel.attached_count() == 0 {
            return Some(Ending(GameOverReason::Abandoned, None));
        }
        let grace = self.config.battle.disconnect_grace();
        self.departed[seat] = Some(Instant::now() + grace);
        tracing::info!(
            battle_id = %self.state.battle_id,
            seat,
            grace_secs = grace.as_secs(),
            "Player disconnected, forfeit armed"
        );
        None
    }

    fn rejoin(
        &mut self,
        seat: usize,
        connection_id: ConnectionId,
        sender: PlayerSender,
    ) -> Result<(), DuelError> {
        if seat >= self.departed.len() || self.departed[seat].is_none() {
            return Err(DuelError::Busy("Seat is still connected"));
        }
        self.departed[seat] = None;
        self.state.rebind_seat(seat, connection_id);
        self.channel.attach(seat, connection_id, sender);
        tracing::info!(
            battle_id = %self.state.battle_id,
            seat,
            connection_id,
            "Player rejoined"
        );
        self.channel
            .broadcast(&ServerMessage::state_update(self.state.clone()));
        Ok(())
    }

    fn forfeit_expired(&self) -> Ending {
        let now = Instant::now();
        let winner = self
            .departed
            .iter()
            .position(|d| d.is_some_and(|d| d <= now))
            .map(BattleState::opponent_seat);
        match winner {
            Some(seat) if self.channel.is_attached(seat) => {
                Ending(GameOverReason::Forfeit, Some(seat))
            },
            _ => Ending(GameOverReason::Abandoned, None),
        }
    }

    /// Mark the battle finished and hand its result, with the channel that
    /// will carry `battle:gameOver`, back to the caller.
    fn finish(mut self, reason: GameOverReason, winner_seat: Option<usize>) -> BattleOutcome {
        if self.state.status != BattleStatus::Finished {
            self.state.advance(BattleStatus::Finished);
        }
        let winner = winner_seat.map(|s| self.state.players[s].connection_id);
        tracing::info!(
            battle_id = %self.state.battle_id,
            ?reason,
            winner,
            "Battle finished"
        );
        BattleOutcome {
            state: self.state,
            reason,
            winner,
            channel: self.channel,
        }
    }
}
