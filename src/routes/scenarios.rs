use axum::{
    Json, Router,
    extract::{Path, State},
    middleware,
    routing::get,
};

use crate::{
    dao::models::ScenarioId,
    dto::scenario::{ScenarioDetail, ScenarioListItem, ScoringCoverageResponse},
    error::AppError,
    routes::admin::require_gm,
    services::scenario_catalog,
    state::SharedState,
};

/// Scenario catalog browsing for game masters.
pub fn router(state: SharedState) -> Router<SharedState> {
    Router::new()
        .route("/scenarios", get(list_scenarios))
        .route("/scenarios/{scenario_id}", get(get_scenario))
        .route(
            "/scenarios/{scenario_id}/scoring-coverage",
            get(scoring_coverage),
        )
        .route_layer(middleware::from_fn_with_state(state, require_gm))
}

/// Every imported scenario.
#[utoipa::path(
    get,
    path = "/scenarios",
    tag = "scenarios",
    params(("x-gm-token" = String, Header, description = "Game master token")),
    responses((status = 200, description = "Scenarios", body = [ScenarioListItem]))
)]
pub async fn list_scenarios(
    State(state): State<SharedState>,
) -> Result<Json<Vec<ScenarioListItem>>, AppError> {
    Ok(Json(scenario_catalog::list_scenarios(&state).await?))
}

/// A scenario with its phases and artifacts, including game master notes.
#[utoipa::path(
    get,
    path = "/scenarios/{scenario_id}",
    tag = "scenarios",
    params(
        ("x-gm-token" = String, Header, description = "Game master token"),
        ("scenario_id" = i64, Path, description = "Scenario identifier")
    ),
    responses(
        (status = 200, description = "Scenario", body = ScenarioDetail),
        (status = 404, description = "Unknown scenario")
    )
)]
pub async fn get_scenario(
    State(state): State<SharedState>,
    Path(scenario_id): Path<ScenarioId>,
) -> Result<Json<ScenarioDetail>, AppError> {
    Ok(Json(scenario_catalog::get_scenario(&state, scenario_id).await?))
}

/// Which offered actions the scoring table knows for each phase.
#[utoipa::path(
    get,
    path = "/scenarios/{scenario_id}/scoring-coverage",
    tag = "scenarios",
    params(
        ("x-gm-token" = String, Header, description = "Game master token"),
        ("scenario_id" = i64, Path, description = "Scenario identifier")
    ),
    responses((status = 200, description = "Scoring coverage", body = ScoringCoverageResponse))
)]
pub async fn scoring_coverage(
    State(state): State<SharedState>,
    Path(scenario_id): Path<ScenarioId>,
) -> Result<Json<ScoringCoverageResponse>, AppError> {
    Ok(Json(
        scenario_catalog::check_scoring_coverage(&state, scenario_id).await?,
    ))
}
