//! Scenario content: catalog import at startup and the read-only views offered to game masters.

use std::time::SystemTime;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::{
    dao::{
        game_store::StoreTxn,
        models::{
            ArtifactEntity, ArtifactKind, PhaseArtifactLink, PhaseEntity, ScenarioEntity,
            ScenarioId, TeamRole,
        },
        storage::EntityKind,
    },
    dto::{
        player::ActionOption,
        scenario::{
            GmArtifactView, PhaseCoverage, PhaseDetail, RoleCoverage, ScenarioDetail,
            ScenarioListItem, ScoringCoverageResponse,
        },
    },
    error::ServiceError,
    services::scoring::{FALLBACK_SCENARIO, ScoringTable},
    state::SharedState,
};

/// Scenario catalog document.
#[derive(Debug, Deserialize)]
pub struct Catalog {
    pub scenarios: Vec<CatalogScenario>,
}

/// Scenario with its phases in play order.
#[derive(Debug, Deserialize)]
pub struct CatalogScenario {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub board_url: Option<String>,
    pub phases: Vec<CatalogPhase>,
}

#[derive(Debug, Deserialize)]
pub struct CatalogPhase {
    pub name: String,
    pub briefing_text: String,
    #[serde(default)]
    pub red_objective: Option<String>,
    #[serde(default)]
    pub blue_objective: Option<String>,
    #[serde(default)]
    pub default_duration_seconds: Option<i32>,
    #[serde(default)]
    pub available_actions: Option<serde_json::Value>,
    #[serde(default)]
    pub gm_prompt_questions: Vec<String>,
    #[serde(default)]
    pub artifacts: Vec<CatalogArtifact>,
}

/// Artifact linked to the enclosing phase. A missing or null `team_role` shares it with both
/// teams; any value other than `red` or `blue` fails to parse.
#[derive(Debug, Deserialize)]
pub struct CatalogArtifact {
    pub name: String,
    pub kind: ArtifactKind,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub file_url: Option<String>,
    #[serde(default)]
    pub embed_url: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub notes_for_gm: Option<String>,
    #[serde(default)]
    pub team_role: Option<TeamRole>,
}

/// Outcome of a catalog import.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportSummary {
    /// Scenarios created by this import.
    pub imported: Vec<String>,
    /// Scenarios already present and left untouched.
    pub skipped: Vec<String>,
}

/// Parse a catalog document.
pub fn parse_catalog(json: &str) -> Result<Catalog, ServiceError> {
    serde_json::from_str(json)
        .map_err(|err| ServiceError::InvalidInput(format!("invalid scenario catalog: {err}")))
}

/// Import every scenario of `catalog` whose name is not stored yet, in one transaction.
pub async fn import_catalog(
    state: &SharedState,
    catalog: Catalog,
) -> Result<ImportSummary, ServiceError> {
    let mut txn = state.begin().await?;
    let mut summary = ImportSummary::default();

    for scenario in catalog.scenarios {
        if txn
            .find_scenario_by_name(scenario.name.clone())
            .await?
            .is_some()
        {
            debug!(scenario = %scenario.name, "scenario already imported");
            summary.skipped.push(scenario.name);
            continue;
        }
        let name = scenario.name.clone();
        insert_scenario(txn.as_mut(), scenario).await?;
        summary.imported.push(name);
    }

    txn.commit().await?;
    info!(
        imported = summary.imported.len(),
        skipped = summary.skipped.len(),
        "scenario catalog imported"
    );
    Ok(summary)
}

async fn insert_scenario(
    txn: &mut dyn StoreTxn,
    scenario: CatalogScenario,
) -> Result<ScenarioId, ServiceError> {
    let scenario_id = txn.allocate_id(EntityKind::Scenario).await?;
    txn.insert_scenario(ScenarioEntity {
        id: scenario_id,
        name: scenario.name,
        description: scenario.description,
        board_url: scenario.board_url,
        created_at: SystemTime::now(),
    })
    .await?;

    for (position, phase) in scenario.phases.into_iter().enumerate() {
        let phase_id = txn.allocate_id(EntityKind::Phase).await?;
        let order_index = i32::try_from(position)
            .map_err(|_| ServiceError::InvalidInput("scenario has too many phases".into()))?;
        txn.insert_phase(PhaseEntity {
            id: phase_id,
            scenario_id,
            order_index,
            name: phase.name,
            briefing_text: phase.briefing_text,
            red_objective: phase.red_objective,
            blue_objective: phase.blue_objective,
            default_duration_seconds: phase.default_duration_seconds,
            available_actions: phase.available_actions,
            gm_prompt_questions: phase.gm_prompt_questions,
        })
        .await?;

        for artifact in phase.artifacts {
            let artifact_id = txn.allocate_id(EntityKind::Artifact).await?;
            let team_role = artifact.team_role;
            txn.insert_artifact(ArtifactEntity {
                id: artifact_id,
                name: artifact.name,
                kind: artifact.kind,
                description: artifact.description,
                file_url: artifact.file_url,
                embed_url: artifact.embed_url,
                content: artifact.content,
                notes_for_gm: artifact.notes_for_gm,
            })
            .await?;
            txn.insert_artifact_link(PhaseArtifactLink {
                phase_id,
                artifact_id,
                team_role,
            })
            .await?;
        }
    }
    Ok(scenario_id)
}

/// Decode the actions a phase offers to `role`.
///
/// `Ok(None)` when the phase declares no actions or none for the role.
pub(crate) fn actions_for_role(
    phase: &PhaseEntity,
    role: TeamRole,
) -> Result<Option<Vec<ActionOption>>, serde_json::Error> {
    let Some(serde_json::Value::Object(by_role)) = &phase.available_actions else {
        return Ok(None);
    };
    by_role
        .get(role.as_str())
        .map(|actions| serde_json::from_value(actions.clone()))
        .transpose()
}

/// Like [`actions_for_role`] but logs and drops malformed declarations.
pub(crate) fn actions_for_role_lenient(
    phase: &PhaseEntity,
    role: TeamRole,
) -> Option<Vec<ActionOption>> {
    actions_for_role(phase, role).unwrap_or_else(|err| {
        warn!(
            phase_id = phase.id,
            role = role.as_str(),
            error = %err,
            "malformed available_actions; ignoring"
        );
        None
    })
}

/// List every stored scenario with its phase count.
pub async fn list_scenarios(state: &SharedState) -> Result<Vec<ScenarioListItem>, ServiceError> {
    let mut txn = state.begin().await?;
    let scenarios = txn.list_scenarios().await?;
    let mut items = Vec::with_capacity(scenarios.len());
    for scenario in scenarios {
        let phase_count = txn.list_phases(scenario.id).await?.len();
        items.push(ScenarioListItem::new(scenario, phase_count));
    }
    Ok(items)
}

/// Full scenario content including GM-only artifact notes.
pub async fn get_scenario(
    state: &SharedState,
    scenario_id: ScenarioId,
) -> Result<ScenarioDetail, ServiceError> {
    let mut txn = state.begin().await?;
    let scenario = load_scenario(txn.as_mut(), scenario_id).await?;

    let phases = txn.list_phases(scenario_id).await?;
    let mut details = Vec::with_capacity(phases.len());
    for phase in phases {
        let artifacts = txn
            .list_phase_artifacts(phase.id)
            .await?
            .into_iter()
            .map(GmArtifactView::from)
            .collect();
        details.push(PhaseDetail::new(phase, artifacts));
    }

    Ok(ScenarioDetail {
        id: scenario.id,
        name: scenario.name,
        description: scenario.description,
        board_url: scenario.board_url,
        phases: details,
    })
}

/// Report the offered actions the scoring table cannot score.
pub async fn check_scoring_coverage(
    state: &SharedState,
    scenario_id: ScenarioId,
) -> Result<ScoringCoverageResponse, ServiceError> {
    let mut txn = state.begin().await?;
    let scenario = load_scenario(txn.as_mut(), scenario_id).await?;
    let phases = txn.list_phases(scenario_id).await?;
    Ok(coverage(state.scoring(), scenario, &phases))
}

fn coverage(
    scoring: &ScoringTable,
    scenario: ScenarioEntity,
    phases: &[PhaseEntity],
) -> ScoringCoverageResponse {
    let lookup = scoring.lookup(&scenario.name);
    let phases = phases
        .iter()
        .map(|phase| {
            let roles = [TeamRole::Red, TeamRole::Blue]
                .into_iter()
                .map(|role| {
                    let table_actions = lookup.table.actions(phase.order_index, role);
                    let available_actions: Vec<String> = actions_for_role_lenient(phase, role)
                        .unwrap_or_default()
                        .into_iter()
                        .map(|action| action.name)
                        .collect();
                    let unscored_actions = available_actions
                        .iter()
                        .filter(|name| {
                            table_actions.is_none_or(|actions| !actions.contains_key(name.as_str()))
                        })
                        .cloned()
                        .collect();
                    RoleCoverage {
                        role,
                        has_table_entry: table_actions.is_some(),
                        available_actions,
                        unscored_actions,
                    }
                })
                .collect();
            PhaseCoverage {
                phase_id: phase.id,
                order_index: phase.order_index,
                name: phase.name.clone(),
                roles,
            }
        })
        .collect();

    ScoringCoverageResponse {
        scenario_id: scenario.id,
        scenario_name: scenario.name,
        uses_fallback_table: lookup.fallback_used,
        fallback_scenario: FALLBACK_SCENARIO.to_owned(),
        phases,
    }
}

async fn load_scenario(
    txn: &mut dyn StoreTxn,
    scenario_id: ScenarioId,
) -> Result<ScenarioEntity, ServiceError> {
    txn.find_scenario(scenario_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("scenario {scenario_id} not found")))
}
