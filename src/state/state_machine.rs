//! Game lifecycle transitions.

use thiserror::Error;

use crate::dao::models::{GameEntity, GameStatus, PhaseEntity, PhaseId, PhaseState};

/// Lifecycle commands a game master can issue on a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleCommand {
    /// Leave the lobby and brief the first phase.
    Start,
    /// Let players vote on the current phase.
    OpenForDecisions,
    /// Close voting, aggregate every team and score the decisions.
    LockDecisions,
    /// Reveal the outcome of the current phase.
    Resolve,
    /// Move to the next phase, or finish the game after the last one.
    CompleteAndNext,
    /// Finish the game immediately.
    End,
}

impl LifecycleCommand {
    /// Name used in routes and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleCommand::Start => "start",
            LifecycleCommand::OpenForDecisions => "open_for_decisions",
            LifecycleCommand::LockDecisions => "lock_decisions",
            LifecycleCommand::Resolve => "resolve",
            LifecycleCommand::CompleteAndNext => "complete_and_next",
            LifecycleCommand::End => "end",
        }
    }
}

/// Where a game stands in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecyclePosition {
    /// Outer game status.
    pub status: GameStatus,
    /// State of the current phase.
    pub phase_state: PhaseState,
    /// Phase being played, if any.
    pub current_phase_id: Option<PhaseId>,
}

impl LifecyclePosition {
    /// Position stored on a game row.
    pub fn of(game: &GameEntity) -> Self {
        Self {
            status: game.status,
            phase_state: game.phase_state,
            current_phase_id: game.current_phase_id,
        }
    }

    /// Write this position back onto a game row.
    pub fn write_to(&self, game: &mut GameEntity) {
        game.status = self.status;
        game.phase_state = self.phase_state;
        game.current_phase_id = self.current_phase_id;
    }
}

/// Error returned when a command cannot be applied from the current position.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "invalid transition: {} cannot be applied while {:?}/{:?}: {reason}",
    .command.as_str(),
    .from.status,
    .from.phase_state
)]
pub struct InvalidTransition {
    /// Position the game was in when the command was received.
    pub from: LifecyclePosition,
    /// Command that cannot be applied.
    pub command: LifecycleCommand,
    /// Unmet precondition.
    pub reason: &'static str,
}

/// Phase following `current` in `order_index` order.
fn next_phase(phases: &[PhaseEntity], current: PhaseId) -> Option<PhaseId> {
    let current_order = phases.iter().find(|phase| phase.id == current)?.order_index;
    phases
        .iter()
        .filter(|phase| phase.order_index > current_order)
        .min_by_key(|phase| phase.order_index)
        .map(|phase| phase.id)
}

/// Position reached by applying `command` from `from`, given the phases of the game's scenario.
///
/// Pure: the caller persists the returned position in the same transaction as the command's
/// side effects. `lock_decisions` is accepted again from `decision_lock` so a repeated lock is a
/// no-op on already scored decisions.
pub fn transition(
    from: LifecyclePosition,
    phases: &[PhaseEntity],
    command: LifecycleCommand,
) -> Result<LifecyclePosition, InvalidTransition> {
    let reject = |reason| InvalidTransition {
        from,
        command,
        reason,
    };
    let finished = LifecyclePosition {
        status: GameStatus::Finished,
        phase_state: PhaseState::Complete,
        current_phase_id: from.current_phase_id,
    };

    let next = match (command, from.status, from.phase_state, from.current_phase_id) {
        (LifecycleCommand::Start, GameStatus::Lobby, _, _) => {
            let first = phases
                .iter()
                .min_by_key(|phase| phase.order_index)
                .ok_or_else(|| reject("scenario has no phases"))?;
            LifecyclePosition {
                status: GameStatus::InProgress,
                phase_state: PhaseState::Briefing,
                current_phase_id: Some(first.id),
            }
        }
        (LifecycleCommand::Start, ..) => return Err(reject("game already started")),

        (LifecycleCommand::End, ..) => finished,

        (_, GameStatus::Finished, ..) => return Err(reject("game is finished")),
        (_, _, _, None) => return Err(reject("no current phase")),

        (LifecycleCommand::OpenForDecisions, _, PhaseState::Briefing, Some(_)) => {
            LifecyclePosition {
                phase_state: PhaseState::OpenForDecisions,
                ..from
            }
        }
        (LifecycleCommand::OpenForDecisions, ..) => {
            return Err(reject("phase is not in briefing"));
        }

        (
            LifecycleCommand::LockDecisions,
            _,
            PhaseState::OpenForDecisions | PhaseState::DecisionLock,
            Some(_),
        ) => LifecyclePosition {
            phase_state: PhaseState::DecisionLock,
            ..from
        },
        (LifecycleCommand::LockDecisions, ..) => {
            return Err(reject("phase is not open for decisions"));
        }

        (LifecycleCommand::Resolve, _, _, Some(_)) => LifecyclePosition {
            phase_state: PhaseState::Resolution,
            ..from
        },

        (LifecycleCommand::CompleteAndNext, _, _, Some(current)) => {
            match next_phase(phases, current) {
                Some(next) => LifecyclePosition {
                    phase_state: PhaseState::Briefing,
                    current_phase_id: Some(next),
                    ..from
                },
                None => finished,
            }
        }
    };

    Ok(next)
}
