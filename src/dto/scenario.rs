//! DTOs describing scenario content to game masters.

use serde::Serialize;
use utoipa::ToSchema;

use crate::dao::models::{
    ArtifactEntity, ArtifactId, ArtifactKind, PhaseArtifactLink, PhaseEntity, PhaseId,
    ScenarioEntity, ScenarioId, TeamRole,
};

/// Scenario entry in the catalog listing.
#[derive(Debug, Serialize, ToSchema)]
pub struct ScenarioListItem {
    pub id: ScenarioId,
    pub name: String,
    pub description: Option<String>,
    pub board_url: Option<String>,
    pub phase_count: usize,
}

impl ScenarioListItem {
    pub(crate) fn new(scenario: ScenarioEntity, phase_count: usize) -> Self {
        Self {
            id: scenario.id,
            name: scenario.name,
            description: scenario.description,
            board_url: scenario.board_url,
            phase_count,
        }
    }
}

/// Artifact as shown to players; GM notes are never included.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ArtifactView {
    pub id: ArtifactId,
    pub name: String,
    pub kind: ArtifactKind,
    pub description: Option<String>,
    pub file_url: Option<String>,
    pub embed_url: Option<String>,
    pub content: Option<String>,
}

impl From<ArtifactEntity> for ArtifactView {
    fn from(artifact: ArtifactEntity) -> Self {
        Self {
            id: artifact.id,
            name: artifact.name,
            kind: artifact.kind,
            description: artifact.description,
            file_url: artifact.file_url,
            embed_url: artifact.embed_url,
            content: artifact.content,
        }
    }
}

/// Artifact as shown to the game master, with its audience and notes.
#[derive(Debug, Serialize, ToSchema)]
pub struct GmArtifactView {
    #[serde(flatten)]
    pub artifact: ArtifactView,
    /// `null` when both teams see the artifact.
    pub team_role: Option<TeamRole>,
    pub notes_for_gm: Option<String>,
}

impl From<(PhaseArtifactLink, ArtifactEntity)> for GmArtifactView {
    fn from((link, mut artifact): (PhaseArtifactLink, ArtifactEntity)) -> Self {
        let notes_for_gm = artifact.notes_for_gm.take();
        Self {
            artifact: artifact.into(),
            team_role: link.team_role,
            notes_for_gm,
        }
    }
}

/// Full phase content.
#[derive(Debug, Serialize, ToSchema)]
pub struct PhaseDetail {
    pub id: PhaseId,
    pub order_index: i32,
    pub name: String,
    pub briefing_text: String,
    pub red_objective: Option<String>,
    pub blue_objective: Option<String>,
    pub default_duration_seconds: Option<i32>,
    #[schema(value_type = Option<Object>)]
    pub available_actions: Option<serde_json::Value>,
    pub gm_prompt_questions: Vec<String>,
    pub artifacts: Vec<GmArtifactView>,
}

impl PhaseDetail {
    pub(crate) fn new(phase: PhaseEntity, artifacts: Vec<GmArtifactView>) -> Self {
        Self {
            id: phase.id,
            order_index: phase.order_index,
            name: phase.name,
            briefing_text: phase.briefing_text,
            red_objective: phase.red_objective,
            blue_objective: phase.blue_objective,
            default_duration_seconds: phase.default_duration_seconds,
            available_actions: phase.available_actions,
            gm_prompt_questions: phase.gm_prompt_questions,
            artifacts,
        }
    }
}

/// Scenario with every phase and artifact.
#[derive(Debug, Serialize, ToSchema)]
pub struct ScenarioDetail {
    pub id: ScenarioId,
    pub name: String,
    pub description: Option<String>,
    pub board_url: Option<String>,
    pub phases: Vec<PhaseDetail>,
}

/// Scoring coverage of one role within a phase.
#[derive(Debug, Serialize, ToSchema)]
pub struct RoleCoverage {
    pub role: TeamRole,
    /// Whether the scoring table has an entry for this phase and role.
    pub has_table_entry: bool,
    /// Actions offered to the role.
    pub available_actions: Vec<String>,
    /// Offered actions that would score 0 because the table does not know them.
    pub unscored_actions: Vec<String>,
}

/// Scoring coverage of one phase.
#[derive(Debug, Serialize, ToSchema)]
pub struct PhaseCoverage {
    pub phase_id: PhaseId,
    pub order_index: i32,
    pub name: String,
    pub roles: Vec<RoleCoverage>,
}

/// How well the scoring table covers a scenario.
#[derive(Debug, Serialize, ToSchema)]
pub struct ScoringCoverageResponse {
    pub scenario_id: ScenarioId,
    pub scenario_name: String,
    /// True when the scenario has no table and decisions are scored with the fallback one.
    pub uses_fallback_table: bool,
    pub fallback_scenario: String,
    pub phases: Vec<PhaseCoverage>,
}
