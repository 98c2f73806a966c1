use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::player::ConnectionId;
use crate::problem::Problem;

/// Unique identifier of one battle session.
pub type BattleId = String;

pub fn new_battle_id() -> BattleId {
    Uuid::new_v4().to_string()
}

/// Battle lifecycle. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BattleStatus {
    Waiting,
    InProgress,
    Finished,
}

impl BattleStatus {
    pub fn can_advance_to(self, next: BattleStatus) -> bool {
        next > self
    }
}

/// Result of one test case. Pending cases are `None` and serialize as `null`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Passed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BattleError {
    #[error("a battle needs two distinct players")]
    DuplicatePlayer,
    #[error("expected {expected} verdicts, got {actual}")]
    VerdictCountMismatch { expected: usize, actual: usize },
    #[error("battle is not in progress")]
    NotInProgress,
}

/// One duelist's view of the battle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerBattleState {
    pub connection_id: ConnectionId,
    pub name: String,
    /// Always equals the number of `Passed` entries in `test_cases`.
    pub score: u32,
    pub test_cases: Vec<Option<Verdict>>,
}

impl PlayerBattleState {
    pub fn new(connection_id: ConnectionId, name: String, test_case_count: usize) -> Self {
        Self {
            connection_id,
            name,
            score: 0,
            test_cases: vec![None; test_case_count],
        }
    }

    /// Replace the verdict vector and recompute the score. The vector length is
    /// fixed at construction; a mismatched run leaves the state untouched.
    pub fn apply_verdicts(&mut self, verdicts: &[Verdict]) -> Result<(), BattleError> {
        if verdicts.len() != self.test_cases.len() {
            return Err(BattleError::VerdictCountMismatch {
                expected: self.test_cases.len(),
                actual: verdicts.len(),
            });
        }
        for (slot, verdict) in self.test_cases.iter_mut().zip(verdicts) {
            *slot = Some(*verdict);
        }
        self.score = self
            .test_cases
            .iter()
            .filter(|v| matches!(v, Some(Verdict::Passed)))
            .count() as u32;
        Ok(())
    }

    pub fn has_passed_all(&self) -> bool {
        !self.test_cases.is_empty() && self.score as usize == self.test_cases.len()
    }
}

/// What a recorded run did to the battle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Verdicts stored; battle continues.
    Progress,
    /// The submitter passed every case and the battle is now finished.
    Won,
}

/// Authoritative state of one two-player battle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BattleState {
    pub battle_id: BattleId,
    pub problem: Arc<Problem>,
    pub status: BattleStatus,
    pub players: [PlayerBattleState; 2],
}

impl BattleState {
    /// Build a waiting battle over two distinct connections.
    pub fn new(
        battle_id: BattleId,
        problem: Arc<Problem>,
        seats: [(ConnectionId, String); 2],
    ) -> Result<Self, BattleError> {
        if seats[0].0 == seats[1].0 {
            return Err(BattleError::DuplicatePlayer);
        }
        let cases = problem.test_case_count();
        let [(a_id, a_name), (b_id, b_name)] = seats;
        Ok(Self {
            battle_id,
            problem,
            status: BattleStatus::Waiting,
            players: [
                PlayerBattleState::new(a_id, a_name, cases),
                PlayerBattleState::new(b_id, b_name, cases),
            ],
        })
    }

    /// Move to `next` if that is a forward transition. Returns whether it happened.
    pub fn advance(&mut self, next: BattleStatus) -> bool {
        if self.status.can_advance_to(next) {
            self.status = next;
            true
        } else {
            tracing::warn!(
                battle_id = %self.battle_id,
                from = ?self.status,
                to = ?next,
                "Rejected backward battle status transition"
            );
            false
        }
    }

    pub fn is_in_progress(&self) -> bool {
        self.status == BattleStatus::InProgress
    }

    pub fn seat_of(&self, connection_id: ConnectionId) -> Option<usize> {
        self.players
            .iter()
            .position(|p| p.connection_id == connection_id)
    }

    pub fn opponent_seat(seat: usize) -> usize {
        1 - seat
    }

    /// Store a run's verdicts for one seat. Finishes the battle on a full pass.
    pub fn record_run(
        &mut self,
        seat: usize,
        verdicts: &[Verdict],
    ) -> Result<RunOutcome, BattleError> {
        if !self.is_in_progress() {
            return Err(BattleError::NotInProgress);
        }
        let player = &mut self.players[seat];
        player.apply_verdicts(verdicts)?;
        if player.has_passed_all() {
            self.advance(BattleStatus::Finished);
            Ok(RunOutcome::Won)
        } else {
            Ok(RunOutcome::Progress)
        }
    }

    /// Point a seat at a new connection after a rejoin.
    pub fn rebind_seat(&mut self, seat: usize, connection_id: ConnectionId) {
        self.players[seat].connection_id = connection_id;
    }
}
