//! DTOs of the game master review tools: comments, notes and the after-action report.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    dao::models::{
        GameId, PhaseAnalysis, PhaseId, PlayerId, ReportEntity, RiskRating, TeamRole, VoteId,
    },
    dto::format_system_time,
};

/// A vote comment left during a phase.
#[derive(Debug, Serialize, ToSchema)]
pub struct PhaseCommentView {
    pub vote_id: VoteId,
    pub player_id: PlayerId,
    pub player_name: String,
    pub team_name: String,
    pub team_role: TeamRole,
    pub effectiveness_rating: i32,
    pub comments: String,
    pub voted_at: String,
}

/// Replace the notes of a phase.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct GmNotesRequest {
    #[validate(length(max = 20000))]
    pub notes: String,
}

/// Notes of a phase; empty when none were written.
#[derive(Debug, Serialize, ToSchema)]
pub struct GmNotesResponse {
    pub game_id: GameId,
    pub phase_id: PhaseId,
    pub notes: String,
    pub updated_at: Option<String>,
}

/// Stored after-action report.
#[derive(Debug, Serialize, ToSchema)]
pub struct ReportResponse {
    pub game_id: GameId,
    pub overall_risk_rating: RiskRating,
    pub overall_risk_score: f64,
    pub phase_analyses: Vec<PhaseAnalysis>,
    pub generated_at: String,
}

impl From<ReportEntity> for ReportResponse {
    fn from(report: ReportEntity) -> Self {
        Self {
            game_id: report.game_id,
            overall_risk_rating: report.overall_risk_rating,
            overall_risk_score: report.overall_risk_score,
            phase_analyses: report.phase_analyses,
            generated_at: format_system_time(report.generated_at),
        }
    }
}
