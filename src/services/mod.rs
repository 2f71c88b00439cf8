/// Game master operations: game setup, lifecycle commands and decision scoring.
pub mod admin_service;
/// Team decision aggregation from player votes.
pub mod aggregation;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Join and audience code generation.
pub mod join_codes;
/// Player-facing operations: join, projections and voting.
pub mod player_service;
/// Public scoreboard projections.
pub mod public_service;
/// Comments, game master notes and after-action reports.
pub mod review_service;
/// Scenario catalog import and browsing.
pub mod scenario_catalog;
/// Scoring tables and score event emission.
pub mod scoring;
/// Storage backend supervision and reconnection.
pub mod storage_supervisor;
