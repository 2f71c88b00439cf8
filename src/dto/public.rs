use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    dao::models::{GameId, GameStatus, PhaseId, PhaseState, TeamId, TeamRole},
    dto::admin::ScoreEventView,
};

/// Points of a team in one phase.
#[derive(Debug, Serialize, ToSchema)]
pub struct PhaseScore {
    pub phase_id: PhaseId,
    pub order_index: i32,
    pub name: String,
    pub score: i64,
}

/// Standing of one team.
#[derive(Debug, Serialize, ToSchema)]
pub struct TeamStanding {
    pub team_id: TeamId,
    pub name: String,
    pub role: TeamRole,
    pub total_score: i64,
    pub phase_scores: Vec<PhaseScore>,
    pub recent_events: Vec<ScoreEventView>,
}

/// Vote counts of a team without revealing choices.
#[derive(Debug, Serialize, ToSchema)]
pub struct TeamVotingSummary {
    pub team_id: TeamId,
    pub team_name: String,
    pub player_count: usize,
    pub votes_submitted: usize,
    pub all_voted: bool,
}

/// Public scoreboard of a game.
#[derive(Debug, Serialize, ToSchema)]
pub struct ScoreboardResponse {
    pub game_id: GameId,
    pub scenario_name: String,
    pub status: GameStatus,
    pub phase_state: PhaseState,
    pub current_phase_id: Option<PhaseId>,
    pub current_phase_name: Option<String>,
    pub teams: Vec<TeamStanding>,
    /// Last ten events across every team, newest first.
    pub recent_events: Vec<ScoreEventView>,
    /// Present while the current phase is open for decisions.
    pub voting_status: Option<Vec<TeamVotingSummary>>,
}
