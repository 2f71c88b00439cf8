//! DTO definitions used by the game master REST API and documentation layer.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    dao::models::{
        DecisionActions, DecisionEntity, DecisionId, DecisionStatus, GameEntity, GameId,
        GameStatus, PhaseEntity, PhaseId, PhaseState, ScenarioId, ScoreEventEntity, TeamEntity,
        TeamId, TeamRole,
    },
    dto::{format_system_time, scenario::ScenarioListItem},
};

/// Payload creating a game from a scenario.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreateGameRequest {
    #[validate(range(min = 1))]
    pub scenario_id: ScenarioId,
    /// Free-form settings stored with the game.
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub settings: Option<serde_json::Map<String, serde_json::Value>>,
}

/// Snapshot of a game row.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GameSummary {
    pub id: GameId,
    pub scenario_id: ScenarioId,
    pub status: GameStatus,
    pub phase_state: PhaseState,
    pub current_phase_id: Option<PhaseId>,
    pub red_team_code: String,
    pub blue_team_code: String,
    pub audience_code: String,
    #[schema(value_type = Object)]
    pub settings: serde_json::Map<String, serde_json::Value>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<GameEntity> for GameSummary {
    fn from(game: GameEntity) -> Self {
        Self {
            id: game.id,
            scenario_id: game.scenario_id,
            status: game.status,
            phase_state: game.phase_state,
            current_phase_id: game.current_phase_id,
            red_team_code: game.red_team_code,
            blue_team_code: game.blue_team_code,
            audience_code: game.audience_code,
            settings: game.settings,
            created_at: format_system_time(game.created_at),
            updated_at: format_system_time(game.updated_at),
        }
    }
}

/// Team of a game with its join code.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TeamSummary {
    pub id: TeamId,
    pub name: String,
    pub role: TeamRole,
    pub code: String,
    pub player_count: usize,
}

impl TeamSummary {
    pub(crate) fn new(team: TeamEntity, player_count: usize) -> Self {
        Self {
            id: team.id,
            name: team.name,
            role: team.role,
            code: team.code,
            player_count,
        }
    }
}

/// Phase the game is currently on.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CurrentPhaseView {
    pub id: PhaseId,
    pub order_index: i32,
    pub name: String,
    pub briefing_text: String,
    pub default_duration_seconds: Option<i32>,
    pub gm_prompt_questions: Vec<String>,
}

impl From<PhaseEntity> for CurrentPhaseView {
    fn from(phase: PhaseEntity) -> Self {
        Self {
            id: phase.id,
            order_index: phase.order_index,
            name: phase.name,
            briefing_text: phase.briefing_text,
            default_duration_seconds: phase.default_duration_seconds,
            gm_prompt_questions: phase.gm_prompt_questions,
        }
    }
}

/// Game with its scenario, teams and current phase.
#[derive(Debug, Serialize, ToSchema)]
pub struct GameDetail {
    pub game: GameSummary,
    pub scenario: ScenarioListItem,
    pub current_phase: Option<CurrentPhaseView>,
    pub teams: Vec<TeamSummary>,
}

/// Outcome of a lifecycle command.
#[derive(Debug, Serialize, ToSchema)]
pub struct TransitionResponse {
    pub command: String,
    pub game: GameSummary,
    /// Score events emitted by the command; only `lock_decisions` produces any.
    pub score_events: Vec<ScoreEventView>,
}

/// Score delta attributed to a team.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ScoreEventView {
    pub id: i64,
    pub team_id: TeamId,
    pub phase_id: PhaseId,
    pub delta: i32,
    pub reason: String,
    pub created_at: String,
}

impl From<ScoreEventEntity> for ScoreEventView {
    fn from(event: ScoreEventEntity) -> Self {
        Self {
            id: event.id,
            team_id: event.team_id,
            phase_id: event.phase_id,
            delta: event.delta,
            reason: event.reason,
            created_at: format_system_time(event.created_at),
        }
    }
}

/// Team decision as seen by the game master.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DecisionView {
    pub id: DecisionId,
    pub team_id: TeamId,
    pub team_name: String,
    pub team_role: TeamRole,
    pub phase_id: PhaseId,
    pub selected: Vec<String>,
    pub vote_counts: IndexMap<String, i64>,
    pub justification: Option<String>,
    pub status: DecisionStatus,
    pub score_awarded: Option<i32>,
    pub gm_notes: Option<String>,
    pub submitted_at: String,
}

impl DecisionView {
    pub(crate) fn new(decision: DecisionEntity, team: &TeamEntity) -> Self {
        let vote_counts = match &decision.actions {
            DecisionActions::Tally { vote_counts, .. } => vote_counts.clone(),
            DecisionActions::Plain(_) => IndexMap::new(),
        };
        Self {
            id: decision.id,
            team_id: decision.team_id,
            team_name: team.name.clone(),
            team_role: team.role,
            phase_id: decision.phase_id,
            selected: decision.actions.selected().to_vec(),
            vote_counts,
            justification: decision.free_text_justification,
            status: decision.status,
            score_awarded: decision.score_awarded,
            gm_notes: decision.gm_notes,
            submitted_at: format_system_time(decision.submitted_at),
        }
    }
}

/// Manual score assigned by the game master.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct ManualScoreRequest {
    #[validate(range(min = 0, max = 10))]
    pub score: i32,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

/// Result of a manual score.
#[derive(Debug, Serialize, ToSchema)]
pub struct ManualScoreResponse {
    pub decision: DecisionView,
    pub score_event: ScoreEventView,
}

/// Acknowledgement of a deletion.
#[derive(Debug, Serialize, ToSchema)]
pub struct DeleteGameResponse {
    pub game_id: GameId,
    pub votes_deleted: u64,
    pub decisions_deleted: u64,
    pub score_events_deleted: u64,
}
