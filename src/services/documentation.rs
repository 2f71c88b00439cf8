use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the tabletop exercise backend.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::scenarios::list_scenarios,
        crate::routes::scenarios::get_scenario,
        crate::routes::scenarios::scoring_coverage,
        crate::routes::admin::list_games,
        crate::routes::admin::create_game,
        crate::routes::admin::get_game,
        crate::routes::admin::delete_game,
        crate::routes::admin::start_game,
        crate::routes::admin::open_for_decisions,
        crate::routes::admin::lock_decisions,
        crate::routes::admin::resolve_phase,
        crate::routes::admin::complete_and_next,
        crate::routes::admin::end_game,
        crate::routes::admin::get_decisions,
        crate::routes::admin::score_decision,
        crate::routes::admin::get_phase_comments,
        crate::routes::admin::get_gm_notes,
        crate::routes::admin::upsert_gm_notes,
        crate::routes::admin::get_report,
        crate::routes::admin::generate_report,
        crate::routes::player::join,
        crate::routes::player::player_state,
        crate::routes::player::report_card,
        crate::routes::player::submit_vote,
        crate::routes::player::voting_status,
        crate::routes::public::get_scoreboard,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::health::StorageHealth,
            crate::dao::models::TeamRole,
            crate::dao::models::GameStatus,
            crate::dao::models::PhaseState,
            crate::dao::models::DecisionStatus,
            crate::dao::models::ArtifactKind,
            crate::dao::models::RiskRating,
            crate::dao::models::PhaseAnalysis,
            crate::dao::models::ReportComment,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "scenarios", description = "Scenario catalog"),
        (name = "games", description = "Game setup owned by a game master"),
        (name = "lifecycle", description = "Game and phase lifecycle commands"),
        (name = "decisions", description = "Team decisions and manual scoring"),
        (name = "review", description = "Comments, game master notes and after-action reports"),
        (name = "players", description = "Joining, voting and player projections"),
        (name = "public", description = "Audience scoreboard"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_gameplay_paths() {
        let doc = ApiDoc::openapi();
        for path in [
            "/games/{game_id}/phase/lock_decisions",
            "/games/{game_id}/phases/{phase_id}/votes",
            "/players/join",
            "/scoreboard/{game_identifier}",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
