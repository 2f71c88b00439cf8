use axum::{
    Extension, Json, Router,
    body::Body,
    extract::{Path, State},
    http::Request,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
};
use axum_valid::Valid;

use crate::{
    dao::models::{DecisionId, GameId, GmId, PhaseId},
    dto::{
        admin::{
            CreateGameRequest, DecisionView, DeleteGameResponse, GameDetail, GameSummary,
            ManualScoreRequest, ManualScoreResponse, TransitionResponse,
        },
        review::{GmNotesRequest, GmNotesResponse, PhaseCommentView, ReportResponse},
    },
    error::AppError,
    services::{admin_service, review_service},
    state::{SharedState, state_machine::LifecycleCommand},
};

const GM_TOKEN_HEADER: &str = "x-gm-token";

/// Authenticated game master, inserted by [`require_gm`].
#[derive(Debug, Clone, Copy)]
pub struct GmIdentity(pub GmId);

/// Game master endpoints: game setup, lifecycle, scoring and review.
pub fn router(state: SharedState) -> Router<SharedState> {
    Router::new()
        .route("/games", get(list_games).post(create_game))
        .route("/games/{game_id}", get(get_game).delete(delete_game))
        .route("/games/{game_id}/start", post(start_game))
        .route(
            "/games/{game_id}/phase/open_for_decisions",
            post(open_for_decisions),
        )
        .route("/games/{game_id}/phase/lock_decisions", post(lock_decisions))
        .route("/games/{game_id}/phase/resolve", post(resolve_phase))
        .route(
            "/games/{game_id}/phase/complete_and_next",
            post(complete_and_next),
        )
        .route("/games/{game_id}/end", post(end_game))
        .route(
            "/games/{game_id}/phases/{phase_id}/decisions",
            get(get_decisions),
        )
        .route(
            "/games/{game_id}/phases/{phase_id}/decisions/{decision_id}/score",
            post(score_decision),
        )
        .route(
            "/games/{game_id}/phases/{phase_id}/comments",
            get(get_phase_comments),
        )
        .route(
            "/games/{game_id}/phases/{phase_id}/gm-notes",
            get(get_gm_notes).put(upsert_gm_notes),
        )
        .route(
            "/games/{game_id}/after-action-report",
            get(get_report).post(generate_report),
        )
        .route_layer(middleware::from_fn_with_state(state, require_gm))
}

/// List the games owned by the caller.
#[utoipa::path(
    get,
    path = "/games",
    tag = "games",
    params(("x-gm-token" = String, Header, description = "Game master token")),
    responses((status = 200, description = "Games of the caller", body = [GameSummary]))
)]
pub async fn list_games(
    State(state): State<SharedState>,
    Extension(GmIdentity(gm_id)): Extension<GmIdentity>,
) -> Result<Json<Vec<GameSummary>>, AppError> {
    Ok(Json(admin_service::list_games(&state, gm_id).await?))
}

/// Create a game from a scenario with a red and a blue team.
#[utoipa::path(
    post,
    path = "/games",
    tag = "games",
    params(("x-gm-token" = String, Header, description = "Game master token")),
    request_body = CreateGameRequest,
    responses(
        (status = 200, description = "Game created", body = GameSummary),
        (status = 404, description = "Unknown scenario")
    )
)]
pub async fn create_game(
    State(state): State<SharedState>,
    Extension(GmIdentity(gm_id)): Extension<GmIdentity>,
    Valid(Json(payload)): Valid<Json<CreateGameRequest>>,
) -> Result<Json<GameSummary>, AppError> {
    Ok(Json(admin_service::create_game(&state, gm_id, payload).await?))
}

/// Game with its scenario, teams and current phase.
#[utoipa::path(
    get,
    path = "/games/{game_id}",
    tag = "games",
    params(
        ("x-gm-token" = String, Header, description = "Game master token"),
        ("game_id" = i64, Path, description = "Game identifier")
    ),
    responses(
        (status = 200, description = "Game", body = GameDetail),
        (status = 403, description = "Game owned by another game master"),
        (status = 404, description = "Unknown game")
    )
)]
pub async fn get_game(
    State(state): State<SharedState>,
    Extension(GmIdentity(gm_id)): Extension<GmIdentity>,
    Path(game_id): Path<GameId>,
) -> Result<Json<GameDetail>, AppError> {
    Ok(Json(admin_service::get_game(&state, gm_id, game_id).await?))
}

/// Delete a game with its votes, decisions and score events.
#[utoipa::path(
    delete,
    path = "/games/{game_id}",
    tag = "games",
    params(
        ("x-gm-token" = String, Header, description = "Game master token"),
        ("game_id" = i64, Path, description = "Game identifier")
    ),
    responses((status = 200, description = "Game deleted", body = DeleteGameResponse))
)]
pub async fn delete_game(
    State(state): State<SharedState>,
    Extension(GmIdentity(gm_id)): Extension<GmIdentity>,
    Path(game_id): Path<GameId>,
) -> Result<Json<DeleteGameResponse>, AppError> {
    Ok(Json(admin_service::delete_game(&state, gm_id, game_id).await?))
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

async fn run_command(
    state: &SharedState,
    gm_id: GmId,
    game_id: GameId,
    command: LifecycleCommand,
) -> Result<Json<TransitionResponse>, AppError> {
    Ok(Json(
        admin_service::run_command(state, gm_id, game_id, command).await?,
    ))
}

/// Leave the lobby and brief the first phase.
#[utoipa::path(
    post,
    path = "/games/{game_id}/start",
    tag = "lifecycle",
    params(
        ("x-gm-token" = String, Header, description = "Game master token"),
        ("game_id" = i64, Path, description = "Game identifier")
    ),
    responses(
        (status = 200, description = "Game started", body = TransitionResponse),
        (status = 409, description = "Game is not in the lobby")
    )
)]
pub async fn start_game(
    State(state): State<SharedState>,
    Extension(GmIdentity(gm_id)): Extension<GmIdentity>,
    Path(game_id): Path<GameId>,
) -> Result<Json<TransitionResponse>, AppError> {
    run_command(&state, gm_id, game_id, LifecycleCommand::Start).await
}

/// Let players vote on the current phase.
#[utoipa::path(
    post,
    path = "/games/{game_id}/phase/open_for_decisions",
    tag = "lifecycle",
    params(
        ("x-gm-token" = String, Header, description = "Game master token"),
        ("game_id" = i64, Path, description = "Game identifier")
    ),
    responses(
        (status = 200, description = "Voting opened", body = TransitionResponse),
        (status = 409, description = "Phase is not in briefing")
    )
)]
pub async fn open_for_decisions(
    State(state): State<SharedState>,
    Extension(GmIdentity(gm_id)): Extension<GmIdentity>,
    Path(game_id): Path<GameId>,
) -> Result<Json<TransitionResponse>, AppError> {
    run_command(&state, gm_id, game_id, LifecycleCommand::OpenForDecisions).await
}

/// Close voting, aggregate every team and score the submitted decisions.
#[utoipa::path(
    post,
    path = "/games/{game_id}/phase/lock_decisions",
    tag = "lifecycle",
    params(
        ("x-gm-token" = String, Header, description = "Game master token"),
        ("game_id" = i64, Path, description = "Game identifier")
    ),
    responses(
        (status = 200, description = "Decisions locked and scored", body = TransitionResponse),
        (status = 409, description = "Phase is not open for decisions")
    )
)]
pub async fn lock_decisions(
    State(state): State<SharedState>,
    Extension(GmIdentity(gm_id)): Extension<GmIdentity>,
    Path(game_id): Path<GameId>,
) -> Result<Json<TransitionResponse>, AppError> {
    run_command(&state, gm_id, game_id, LifecycleCommand::LockDecisions).await
}

/// Reveal the outcome of the current phase.
#[utoipa::path(
    post,
    path = "/games/{game_id}/phase/resolve",
    tag = "lifecycle",
    params(
        ("x-gm-token" = String, Header, description = "Game master token"),
        ("game_id" = i64, Path, description = "Game identifier")
    ),
    responses(
        (status = 200, description = "Phase resolved", body = TransitionResponse),
        (status = 409, description = "No phase to resolve")
    )
)]
pub async fn resolve_phase(
    State(state): State<SharedState>,
    Extension(GmIdentity(gm_id)): Extension<GmIdentity>,
    Path(game_id): Path<GameId>,
) -> Result<Json<TransitionResponse>, AppError> {
    run_command(&state, gm_id, game_id, LifecycleCommand::Resolve).await
}

/// Move to the next phase, or finish the game after the last one.
#[utoipa::path(
    post,
    path = "/games/{game_id}/phase/complete_and_next",
    tag = "lifecycle",
    params(
        ("x-gm-token" = String, Header, description = "Game master token"),
        ("game_id" = i64, Path, description = "Game identifier")
    ),
    responses(
        (status = 200, description = "Next phase briefed or game finished", body = TransitionResponse),
        (status = 409, description = "Phase is not resolved")
    )
)]
pub async fn complete_and_next(
    State(state): State<SharedState>,
    Extension(GmIdentity(gm_id)): Extension<GmIdentity>,
    Path(game_id): Path<GameId>,
) -> Result<Json<TransitionResponse>, AppError> {
    run_command(&state, gm_id, game_id, LifecycleCommand::CompleteAndNext).await
}

/// Finish the game immediately.
#[utoipa::path(
    post,
    path = "/games/{game_id}/end",
    tag = "lifecycle",
    params(
        ("x-gm-token" = String, Header, description = "Game master token"),
        ("game_id" = i64, Path, description = "Game identifier")
    ),
    responses(
        (status = 200, description = "Game finished", body = TransitionResponse),
        (status = 409, description = "Game already finished")
    )
)]
pub async fn end_game(
    State(state): State<SharedState>,
    Extension(GmIdentity(gm_id)): Extension<GmIdentity>,
    Path(game_id): Path<GameId>,
) -> Result<Json<TransitionResponse>, AppError> {
    run_command(&state, gm_id, game_id, LifecycleCommand::End).await
}

// ---------------------------------------------------------------------------
// Decisions
// ---------------------------------------------------------------------------

/// Team decisions of a phase with their vote tallies.
#[utoipa::path(
    get,
    path = "/games/{game_id}/phases/{phase_id}/decisions",
    tag = "decisions",
    params(
        ("x-gm-token" = String, Header, description = "Game master token"),
        ("game_id" = i64, Path, description = "Game identifier"),
        ("phase_id" = i64, Path, description = "Phase identifier")
    ),
    responses((status = 200, description = "Decisions of the phase", body = [DecisionView]))
)]
pub async fn get_decisions(
    State(state): State<SharedState>,
    Extension(GmIdentity(gm_id)): Extension<GmIdentity>,
    Path((game_id, phase_id)): Path<(GameId, PhaseId)>,
) -> Result<Json<Vec<DecisionView>>, AppError> {
    Ok(Json(
        admin_service::get_decisions(&state, gm_id, game_id, phase_id).await?,
    ))
}

/// Score a decision by hand and record the difference as a score event.
#[utoipa::path(
    post,
    path = "/games/{game_id}/phases/{phase_id}/decisions/{decision_id}/score",
    tag = "decisions",
    params(
        ("x-gm-token" = String, Header, description = "Game master token"),
        ("game_id" = i64, Path, description = "Game identifier"),
        ("phase_id" = i64, Path, description = "Phase identifier"),
        ("decision_id" = i64, Path, description = "Decision identifier")
    ),
    request_body = ManualScoreRequest,
    responses(
        (status = 200, description = "Decision scored", body = ManualScoreResponse),
        (status = 400, description = "Score out of range"),
        (status = 404, description = "Unknown decision")
    )
)]
pub async fn score_decision(
    State(state): State<SharedState>,
    Extension(GmIdentity(gm_id)): Extension<GmIdentity>,
    Path((game_id, phase_id, decision_id)): Path<(GameId, PhaseId, DecisionId)>,
    Valid(Json(payload)): Valid<Json<ManualScoreRequest>>,
) -> Result<Json<ManualScoreResponse>, AppError> {
    let response = admin_service::score_decision_manually(
        &state,
        gm_id,
        game_id,
        phase_id,
        decision_id,
        payload,
    )
    .await?;
    Ok(Json(response))
}

// ---------------------------------------------------------------------------
// Review
// ---------------------------------------------------------------------------

/// Vote comments left during a phase.
#[utoipa::path(
    get,
    path = "/games/{game_id}/phases/{phase_id}/comments",
    tag = "review",
    params(
        ("x-gm-token" = String, Header, description = "Game master token"),
        ("game_id" = i64, Path, description = "Game identifier"),
        ("phase_id" = i64, Path, description = "Phase identifier")
    ),
    responses((status = 200, description = "Comments of the phase", body = [PhaseCommentView]))
)]
pub async fn get_phase_comments(
    State(state): State<SharedState>,
    Extension(GmIdentity(gm_id)): Extension<GmIdentity>,
    Path((game_id, phase_id)): Path<(GameId, PhaseId)>,
) -> Result<Json<Vec<PhaseCommentView>>, AppError> {
    Ok(Json(
        review_service::get_phase_comments(&state, gm_id, game_id, phase_id).await?,
    ))
}

/// Private notes of a phase.
#[utoipa::path(
    get,
    path = "/games/{game_id}/phases/{phase_id}/gm-notes",
    tag = "review",
    params(
        ("x-gm-token" = String, Header, description = "Game master token"),
        ("game_id" = i64, Path, description = "Game identifier"),
        ("phase_id" = i64, Path, description = "Phase identifier")
    ),
    responses((status = 200, description = "Notes of the phase", body = GmNotesResponse))
)]
pub async fn get_gm_notes(
    State(state): State<SharedState>,
    Extension(GmIdentity(gm_id)): Extension<GmIdentity>,
    Path((game_id, phase_id)): Path<(GameId, PhaseId)>,
) -> Result<Json<GmNotesResponse>, AppError> {
    Ok(Json(
        review_service::get_gm_notes(&state, gm_id, game_id, phase_id).await?,
    ))
}

/// Replace the private notes of a phase.
#[utoipa::path(
    put,
    path = "/games/{game_id}/phases/{phase_id}/gm-notes",
    tag = "review",
    params(
        ("x-gm-token" = String, Header, description = "Game master token"),
        ("game_id" = i64, Path, description = "Game identifier"),
        ("phase_id" = i64, Path, description = "Phase identifier")
    ),
    request_body = GmNotesRequest,
    responses((status = 200, description = "Notes saved", body = GmNotesResponse))
)]
pub async fn upsert_gm_notes(
    State(state): State<SharedState>,
    Extension(GmIdentity(gm_id)): Extension<GmIdentity>,
    Path((game_id, phase_id)): Path<(GameId, PhaseId)>,
    Valid(Json(payload)): Valid<Json<GmNotesRequest>>,
) -> Result<Json<GmNotesResponse>, AppError> {
    let notes = review_service::upsert_gm_notes(&state, gm_id, game_id, phase_id, payload).await?;
    Ok(Json(notes))
}

/// The stored after-action report.
#[utoipa::path(
    get,
    path = "/games/{game_id}/after-action-report",
    tag = "review",
    params(
        ("x-gm-token" = String, Header, description = "Game master token"),
        ("game_id" = i64, Path, description = "Game identifier")
    ),
    responses(
        (status = 200, description = "After-action report", body = ReportResponse),
        (status = 404, description = "No report generated yet")
    )
)]
pub async fn get_report(
    State(state): State<SharedState>,
    Extension(GmIdentity(gm_id)): Extension<GmIdentity>,
    Path(game_id): Path<GameId>,
) -> Result<Json<ReportResponse>, AppError> {
    Ok(Json(review_service::get_report(&state, gm_id, game_id).await?))
}

/// Build the after-action report from votes, comments and notes.
#[utoipa::path(
    post,
    path = "/games/{game_id}/after-action-report",
    tag = "review",
    params(
        ("x-gm-token" = String, Header, description = "Game master token"),
        ("game_id" = i64, Path, description = "Game identifier")
    ),
    responses((status = 200, description = "Report generated", body = ReportResponse))
)]
pub async fn generate_report(
    State(state): State<SharedState>,
    Extension(GmIdentity(gm_id)): Extension<GmIdentity>,
    Path(game_id): Path<GameId>,
) -> Result<Json<ReportResponse>, AppError> {
    Ok(Json(
        review_service::generate_report(&state, gm_id, game_id).await?,
    ))
}

/// Resolve the `x-gm-token` header to a configured game master.
pub(crate) async fn require_gm(
    State(state): State<SharedState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let provided = req
        .headers()
        .get(GM_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("missing game master token header `x-gm-token`".into()))?;

    let gm_id = state
        .config()
        .game_master_for_token(provided)
        .map(|gm| gm.id)
        .ok_or_else(|| AppError::Unauthorized("invalid game master token".into()))?;

    req.extensions_mut().insert(GmIdentity(gm_id));
    Ok(next.run(req).await)
}
