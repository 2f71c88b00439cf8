//! DTOs exchanged with players; the join code and player id act as capabilities.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    dao::models::{
        DecisionActions, DecisionEntity, DecisionId, DecisionStatus, GameId, GameStatus,
        PhaseId, PhaseState, PlayerId, TeamId, TeamRole, VoteEntity, VoteId,
    },
    dto::{
        admin::CurrentPhaseView,
        format_system_time,
        scenario::ArtifactView,
        validation::{validate_join_code, validate_not_blank},
    },
};

/// Join a team using its code.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct JoinRequest {
    #[validate(length(min = 1, max = 32), custom(function = "validate_join_code"))]
    pub team_code: String,
    #[validate(length(min = 1, max = 100), custom(function = "validate_not_blank"))]
    pub display_name: String,
}

/// Minimal view of the joined game.
#[derive(Debug, Serialize, ToSchema)]
pub struct JoinGameInfo {
    pub id: GameId,
    pub scenario_name: String,
    pub status: GameStatus,
    pub phase_state: PhaseState,
}

/// Identity handed back to a joining player.
#[derive(Debug, Serialize, ToSchema)]
pub struct JoinResponse {
    pub player_id: PlayerId,
    pub team_id: TeamId,
    pub game_id: GameId,
    pub team_role: TeamRole,
    pub team_name: String,
    pub display_name: String,
    /// False when an existing player with the same name was reused.
    pub created: bool,
    pub game: JoinGameInfo,
}

/// A player's vote.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct VoteView {
    pub id: VoteId,
    pub player_id: PlayerId,
    pub phase_id: PhaseId,
    pub selected_action: String,
    pub effectiveness_rating: i32,
    pub comments: Option<String>,
    pub justification: Option<String>,
    pub voted_at: String,
}

impl From<VoteEntity> for VoteView {
    fn from(vote: VoteEntity) -> Self {
        Self {
            id: vote.id,
            player_id: vote.player_id,
            phase_id: vote.phase_id,
            selected_action: vote.selected_action,
            effectiveness_rating: vote.effectiveness_rating,
            comments: vote.comments,
            justification: vote.justification,
            voted_at: format_system_time(vote.voted_at),
        }
    }
}

/// Team decision as seen by its members.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TeamDecisionView {
    pub id: DecisionId,
    pub selected: Vec<String>,
    pub vote_counts: IndexMap<String, i64>,
    pub justification: Option<String>,
    pub status: DecisionStatus,
    pub score_awarded: Option<i32>,
}

impl From<DecisionEntity> for TeamDecisionView {
    fn from(decision: DecisionEntity) -> Self {
        let selected = decision.actions.selected().to_vec();
        let vote_counts = match decision.actions {
            DecisionActions::Tally { vote_counts, .. } => vote_counts,
            DecisionActions::Plain(_) => IndexMap::new(),
        };
        Self {
            id: decision.id,
            selected,
            vote_counts,
            justification: decision.free_text_justification,
            status: decision.status,
            score_awarded: decision.score_awarded,
        }
    }
}

/// Voting progress of one team member.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MemberVoteStatus {
    pub player_id: PlayerId,
    pub display_name: String,
    pub has_voted: bool,
    pub selected_action: Option<String>,
    pub effectiveness_rating: Option<i32>,
}

/// Voting progress of a team for one phase.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TeamVotingStatus {
    pub team_id: TeamId,
    pub team_name: String,
    pub team_role: TeamRole,
    pub player_count: usize,
    pub votes_submitted: usize,
    pub all_voted: bool,
    pub members: Vec<MemberVoteStatus>,
}

/// Voting progress of every team for one phase.
#[derive(Debug, Serialize, ToSchema)]
pub struct VotingStatusResponse {
    pub game_id: GameId,
    pub phase_id: PhaseId,
    pub phase_state: PhaseState,
    pub teams: Vec<TeamVotingStatus>,
}

/// Action a role may choose.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
pub struct ActionOption {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Everything a player client renders, assembled from one store snapshot.
#[derive(Debug, Serialize, ToSchema)]
pub struct PlayerStateResponse {
    pub game_id: GameId,
    pub player_id: PlayerId,
    pub display_name: String,
    pub team_id: TeamId,
    pub team_name: String,
    pub team_role: TeamRole,
    pub game_status: GameStatus,
    pub phase_state: PhaseState,
    pub current_phase: Option<CurrentPhaseView>,
    pub team_objective: Option<String>,
    pub artifacts: Vec<ArtifactView>,
    pub decision: Option<TeamDecisionView>,
    pub has_voted: bool,
    pub my_vote: Option<VoteView>,
    /// Present while the phase is open for decisions.
    pub team_voting_status: Option<TeamVotingStatus>,
    pub available_actions: Option<Vec<ActionOption>>,
}

/// A player's vote for the current phase.
#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
pub struct VoteRequest {
    #[validate(range(min = 1))]
    pub player_id: PlayerId,
    #[validate(length(min = 1, max = 200), custom(function = "validate_not_blank"))]
    pub selected_action: String,
    #[validate(range(min = 1, max = 10))]
    pub effectiveness_rating: i32,
    /// Stored truncated to 500 characters.
    #[serde(default)]
    pub comments: Option<String>,
    #[serde(default)]
    #[validate(length(max = 5000))]
    pub justification: Option<String>,
}

/// Result of a vote submission.
#[derive(Debug, Serialize, ToSchema)]
pub struct VoteResponse {
    pub vote: VoteView,
    /// True when this vote completed the team and created its decision.
    pub decision_created: bool,
    pub decision: Option<TeamDecisionView>,
}

/// One phase of a player's report card.
#[derive(Debug, Serialize, ToSchema)]
pub struct ReportCardPhase {
    pub phase_id: PhaseId,
    pub order_index: i32,
    pub name: String,
    pub my_vote: Option<VoteView>,
    pub team_decision: Option<TeamDecisionView>,
    pub matched_team_decision: bool,
    pub max_possible_score: i32,
}

/// End-of-game summary for one player.
#[derive(Debug, Serialize, ToSchema)]
pub struct ReportCardResponse {
    pub game_id: GameId,
    pub player_id: PlayerId,
    pub player_name: String,
    pub team_name: String,
    pub team_role: TeamRole,
    pub scenario_name: String,
    pub team_total_score: i64,
    pub average_rating: Option<f64>,
    pub game_completed_at: Option<String>,
    pub phases: Vec<ReportCardPhase>,
}
