use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use axum_valid::Valid;

use crate::{
    dao::models::{GameId, PhaseId, PlayerId},
    dto::player::{
        JoinRequest, JoinResponse, PlayerStateResponse, ReportCardResponse, VoteRequest,
        VoteResponse, VotingStatusResponse,
    },
    error::AppError,
    services::player_service,
    state::SharedState,
};

/// Player endpoints. The team code and the returned player id act as capabilities.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/players/join", post(join))
        .route(
            "/players/games/{game_id}/player/{player_id}/state",
            get(player_state),
        )
        .route(
            "/players/games/{game_id}/player/{player_id}/report-card",
            get(report_card),
        )
        .route("/games/{game_id}/phases/{phase_id}/votes", post(submit_vote))
        .route(
            "/games/{game_id}/phases/{phase_id}/voting-status",
            get(voting_status),
        )
}

/// Join the team owning a join code.
#[utoipa::path(
    post,
    path = "/players/join",
    tag = "players",
    request_body = JoinRequest,
    responses(
        (status = 200, description = "Player joined or reused", body = JoinResponse),
        (status = 404, description = "Invalid team code")
    )
)]
pub async fn join(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<JoinRequest>>,
) -> Result<Json<JoinResponse>, AppError> {
    Ok(Json(player_service::join(&state, payload).await?))
}

/// Everything the player client renders for the current phase.
#[utoipa::path(
    get,
    path = "/players/games/{game_id}/player/{player_id}/state",
    tag = "players",
    params(
        ("game_id" = i64, Path, description = "Game identifier"),
        ("player_id" = i64, Path, description = "Player identifier")
    ),
    responses(
        (status = 200, description = "Player projection", body = PlayerStateResponse),
        (status = 404, description = "Unknown game or player")
    )
)]
pub async fn player_state(
    State(state): State<SharedState>,
    Path((game_id, player_id)): Path<(GameId, PlayerId)>,
) -> Result<Json<PlayerStateResponse>, AppError> {
    Ok(Json(
        player_service::player_state(&state, game_id, player_id).await?,
    ))
}

/// The player's votes compared with their team's decisions.
#[utoipa::path(
    get,
    path = "/players/games/{game_id}/player/{player_id}/report-card",
    tag = "players",
    params(
        ("game_id" = i64, Path, description = "Game identifier"),
        ("player_id" = i64, Path, description = "Player identifier")
    ),
    responses((status = 200, description = "Report card", body = ReportCardResponse))
)]
pub async fn report_card(
    State(state): State<SharedState>,
    Path((game_id, player_id)): Path<(GameId, PlayerId)>,
) -> Result<Json<ReportCardResponse>, AppError> {
    Ok(Json(
        player_service::report_card(&state, game_id, player_id).await?,
    ))
}

/// Cast or replace a vote on the current phase.
#[utoipa::path(
    post,
    path = "/games/{game_id}/phases/{phase_id}/votes",
    tag = "players",
    params(
        ("game_id" = i64, Path, description = "Game identifier"),
        ("phase_id" = i64, Path, description = "Phase identifier")
    ),
    request_body = VoteRequest,
    responses(
        (status = 200, description = "Vote recorded", body = VoteResponse),
        (status = 400, description = "Invalid vote or not the current phase"),
        (status = 409, description = "Phase is not open for decisions")
    )
)]
pub async fn submit_vote(
    State(state): State<SharedState>,
    Path((game_id, phase_id)): Path<(GameId, PhaseId)>,
    Valid(Json(payload)): Valid<Json<VoteRequest>>,
) -> Result<Json<VoteResponse>, AppError> {
    Ok(Json(
        player_service::submit_vote(&state, game_id, phase_id, payload).await?,
    ))
}

/// Voting progress of every team.
#[utoipa::path(
    get,
    path = "/games/{game_id}/phases/{phase_id}/voting-status",
    tag = "players",
    params(
        ("game_id" = i64, Path, description = "Game identifier"),
        ("phase_id" = i64, Path, description = "Phase identifier")
    ),
    responses((status = 200, description = "Voting progress", body = VotingStatusResponse))
)]
pub async fn voting_status(
    State(state): State<SharedState>,
    Path((game_id, phase_id)): Path<(GameId, PhaseId)>,
) -> Result<Json<VotingStatusResponse>, AppError> {
    Ok(Json(
        player_service::voting_status(&state, game_id, phase_id).await?,
    ))
}
