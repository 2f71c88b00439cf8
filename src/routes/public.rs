use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};

use crate::{
    dto::public::ScoreboardResponse, error::AppError, services::public_service,
    state::SharedState,
};

/// Audience endpoints; the audience code is enough to read a scoreboard.
pub fn router() -> Router<SharedState> {
    Router::new().route("/scoreboard/{game_identifier}", get(get_scoreboard))
}

#[utoipa::path(
    get,
    path = "/scoreboard/{game_identifier}",
    tag = "public",
    params(("game_identifier" = String, Path, description = "Numeric game id or audience code")),
    responses(
        (status = 200, description = "Scoreboard", body = ScoreboardResponse),
        (status = 404, description = "Unknown game")
    )
)]
/// Return team totals, per-phase scores and recent score events.
pub async fn get_scoreboard(
    State(state): State<SharedState>,
    Path(identifier): Path<String>,
) -> Result<Json<ScoreboardResponse>, AppError> {
    let payload = public_service::scoreboard(&state, &identifier).await?;
    Ok(Json(payload))
}
