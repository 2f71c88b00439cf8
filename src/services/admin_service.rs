//! Business logic powering the game master REST routes: game creation, lifecycle commands,
//! deletion and decision review. Every mutating command runs inside the game's gate and a single
//! store transaction, so a failure at any step leaves the game untouched.

use std::{collections::HashMap, time::SystemTime};

use tracing::{debug, info};
use validator::Validate;

use crate::{
    dao::{
        game_store::StoreTxn,
        models::{
            DecisionId, DecisionStatus, GameEntity, GameId, GameStatus, GmId, PhaseEntity,
            PhaseId, PhaseState, ScenarioEntity, ScoreEventEntity, TeamEntity, TeamRole,
        },
        storage::{EntityKind, StorageError},
    },
    dto::{
        admin::{
            CreateGameRequest, CurrentPhaseView, DecisionView, DeleteGameResponse, GameDetail,
            GameSummary, ManualScoreRequest, ManualScoreResponse, ScoreEventView, TeamSummary,
            TransitionResponse,
        },
        scenario::ScenarioListItem,
    },
    error::ServiceError,
    services::{
        aggregation,
        join_codes::{generate_audience_code, generate_team_code, unique_code},
        scoring::PhaseScoring,
    },
    state::{LifecycleCommand, LifecyclePosition, SharedState, transition},
};

const RED_TEAM_NAME: &str = "Red";
const BLUE_TEAM_NAME: &str = "Blue 1";

/// Load a game and check that `gm_id` owns it.
pub(crate) async fn load_owned_game(
    txn: &mut dyn StoreTxn,
    game_id: GameId,
    gm_id: GmId,
) -> Result<GameEntity, ServiceError> {
    let game = txn
        .find_game(game_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("game {game_id} not found")))?;
    if game.gm_id != gm_id {
        return Err(ServiceError::Forbidden(format!(
            "game {game_id} belongs to another game master"
        )));
    }
    Ok(game)
}

/// Load a phase and check that it belongs to the scenario of `game`.
pub(crate) async fn load_game_phase(
    txn: &mut dyn StoreTxn,
    game: &GameEntity,
    phase_id: PhaseId,
) -> Result<PhaseEntity, ServiceError> {
    txn.find_phase(phase_id)
        .await?
        .filter(|phase| phase.scenario_id == game.scenario_id)
        .ok_or_else(|| {
            ServiceError::NotFound(format!("phase {phase_id} not found in game {}", game.id))
        })
}

pub(crate) async fn load_game_scenario(
    txn: &mut dyn StoreTxn,
    game: &GameEntity,
) -> Result<ScenarioEntity, ServiceError> {
    txn.find_scenario(game.scenario_id).await?.ok_or_else(|| {
        ServiceError::NotFound(format!("scenario {} not found", game.scenario_id))
    })
}

// ---------------------------------------------------------------------------
// Game creation and read-only projections
// ---------------------------------------------------------------------------

/// Create a game in the lobby with its red and blue teams and three fresh join codes.
pub async fn create_game(
    state: &SharedState,
    gm_id: GmId,
    request: CreateGameRequest,
) -> Result<GameSummary, ServiceError> {
    request.validate()?;
    let mut txn = state.begin().await?;

    let scenario = txn
        .find_scenario(request.scenario_id)
        .await?
        .ok_or_else(|| {
            ServiceError::NotFound(format!("scenario {} not found", request.scenario_id))
        })?;

    let red_code = unique_code(txn.as_mut(), &[], generate_team_code).await?;
    let blue_code = unique_code(txn.as_mut(), &[red_code.clone()], generate_team_code).await?;
    let audience_code = unique_code(
        txn.as_mut(),
        &[red_code.clone(), blue_code.clone()],
        generate_audience_code,
    )
    .await?;

    let now = SystemTime::now();
    let game = GameEntity {
        id: txn.allocate_id(EntityKind::Game).await?,
        scenario_id: scenario.id,
        gm_id,
        status: GameStatus::Lobby,
        phase_state: PhaseState::NotStarted,
        current_phase_id: None,
        red_team_code: red_code.clone(),
        blue_team_code: blue_code.clone(),
        audience_code,
        settings: request.settings.unwrap_or_default(),
        created_at: now,
        updated_at: now,
    };
    txn.insert_game(game.clone()).await?;

    for (name, role, code) in [
        (RED_TEAM_NAME, TeamRole::Red, red_code),
        (BLUE_TEAM_NAME, TeamRole::Blue, blue_code),
    ] {
        let team = TeamEntity {
            id: txn.allocate_id(EntityKind::Team).await?,
            game_id: game.id,
            name: name.to_owned(),
            role,
            code,
        };
        txn.insert_team(team).await?;
    }

    txn.commit().await?;
    info!(game_id = game.id, scenario = %scenario.name, gm_id = %gm_id, "game created");
    Ok(game.into())
}

/// Games owned by the caller, newest first.
pub async fn list_games(state: &SharedState, gm_id: GmId) -> Result<Vec<GameSummary>, ServiceError> {
    let mut txn = state.begin().await?;
    let games = txn.list_games_for_gm(gm_id).await?;
    Ok(games.into_iter().map(GameSummary::from).collect())
}

/// Game with its scenario, current phase and teams.
pub async fn get_game(
    state: &SharedState,
    gm_id: GmId,
    game_id: GameId,
) -> Result<GameDetail, ServiceError> {
    let mut txn = state.begin().await?;
    let game = load_owned_game(txn.as_mut(), game_id, gm_id).await?;
    let scenario = load_game_scenario(txn.as_mut(), &game).await?;
    let phases = txn.list_phases(scenario.id).await?;

    let current_phase = game
        .current_phase_id
        .and_then(|id| phases.iter().find(|phase| phase.id == id))
        .cloned()
        .map(CurrentPhaseView::from);

    let players = txn.list_players(game_id).await?;
    let teams = txn
        .list_teams(game_id)
        .await?
        .into_iter()
        .map(|team| {
            let player_count = players.iter().filter(|p| p.team_id == team.id).count();
            TeamSummary::new(team, player_count)
        })
        .collect();

    Ok(GameDetail {
        game: game.into(),
        scenario: ScenarioListItem::new(scenario, phases.len()),
        current_phase,
        teams,
    })
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// Apply a lifecycle command to a game owned by `gm_id`.
///
/// `lock_decisions` aggregates the votes of every team and scores every submitted decision of
/// the current phase in the same transaction that moves the phase state. A lock that loses the
/// race to insert a team decision is replayed once.
pub async fn run_command(
    state: &SharedState,
    gm_id: GmId,
    game_id: GameId,
    command: LifecycleCommand,
) -> Result<TransitionResponse, ServiceError> {
    state
        .run_in_game_gate(game_id, move || {
            aggregation::retry_after_decision_race(move || {
                apply_command(state, gm_id, game_id, command)
            })
        })
        .await
}

async fn apply_command(
    state: &SharedState,
    gm_id: GmId,
    game_id: GameId,
    command: LifecycleCommand,
) -> Result<TransitionResponse, ServiceError> {
    let mut txn = state.begin().await?;
    let mut game = load_owned_game(txn.as_mut(), game_id, gm_id).await?;
    let phases = txn.list_phases(game.scenario_id).await?;

    let next = transition(LifecyclePosition::of(&game), &phases, command)?;

    let score_events = match (command, game.current_phase_id) {
        (LifecycleCommand::LockDecisions, Some(phase_id)) => {
            let phase = phases
                .iter()
                .find(|phase| phase.id == phase_id)
                .ok_or_else(|| {
                    ServiceError::PreconditionViolated(format!(
                        "current phase {phase_id} is not part of the scenario"
                    ))
                })?;
            lock_phase(state, txn.as_mut(), &game, phase).await?
        }
        _ => Vec::new(),
    };

    next.write_to(&mut game);
    game.updated_at = SystemTime::now();
    txn.update_game(game.clone()).await?;
    txn.commit().await?;

    info!(
        game_id,
        command = command.as_str(),
        status = ?game.status,
        phase_state = ?game.phase_state,
        phase_id = ?game.current_phase_id,
        "game transition applied"
    );

    Ok(TransitionResponse {
        command: command.as_str().to_owned(),
        game: game.into(),
        score_events: score_events.into_iter().map(ScoreEventView::from).collect(),
    })
}

async fn lock_phase(
    state: &SharedState,
    txn: &mut dyn StoreTxn,
    game: &GameEntity,
    phase: &PhaseEntity,
) -> Result<Vec<ScoreEventEntity>, ServiceError> {
    let teams = txn.list_teams(game.id).await?;
    for team in teams {
        aggregation::aggregate_team(txn, game.id, phase.id, team.id).await?;
    }

    let scenario = load_game_scenario(txn, game).await?;
    let scoring = PhaseScoring::load(
        txn,
        state.scoring(),
        state.config().normalize_team_size(),
        &scenario.name,
        phase,
        game.id,
    )
    .await?;
    let events = scoring.score_submitted(txn, game.id).await?;
    debug!(
        game_id = game.id,
        phase_id = phase.id,
        scored = events.len(),
        "phase decisions scored"
    );
    Ok(events)
}

/// Delete a game with every row that references it.
pub async fn delete_game(
    state: &SharedState,
    gm_id: GmId,
    game_id: GameId,
) -> Result<DeleteGameResponse, ServiceError> {
    let response = state
        .run_in_game_gate(game_id, || async move {
            let mut txn = state.begin().await?;
            load_owned_game(txn.as_mut(), game_id, gm_id).await?;

            let votes_deleted = txn.purge_game_rows(EntityKind::Vote, game_id).await?;
            let decisions_deleted = txn.purge_game_rows(EntityKind::Decision, game_id).await?;
            let score_events_deleted = txn.purge_game_rows(EntityKind::ScoreEvent, game_id).await?;
            txn.purge_game_rows(EntityKind::GmNotes, game_id).await?;
            txn.purge_game_rows(EntityKind::Report, game_id).await?;
            txn.delete_game(game_id).await?;
            txn.commit().await?;

            Ok(DeleteGameResponse {
                game_id,
                votes_deleted,
                decisions_deleted,
                score_events_deleted,
            })
        })
        .await?;

    state.forget_game(game_id);
    info!(
        game_id,
        votes = response.votes_deleted,
        decisions = response.decisions_deleted,
        score_events = response.score_events_deleted,
        "game deleted"
    );
    Ok(response)
}

// ---------------------------------------------------------------------------
// Decision review
// ---------------------------------------------------------------------------

/// Every team decision of a phase.
pub async fn get_decisions(
    state: &SharedState,
    gm_id: GmId,
    game_id: GameId,
    phase_id: PhaseId,
) -> Result<Vec<DecisionView>, ServiceError> {
    let mut txn = state.begin().await?;
    let game = load_owned_game(txn.as_mut(), game_id, gm_id).await?;
    load_game_phase(txn.as_mut(), &game, phase_id).await?;

    let teams: HashMap<_, _> = txn
        .list_teams(game_id)
        .await?
        .into_iter()
        .map(|team| (team.id, team))
        .collect();
    let decisions = txn.list_decisions(game_id, phase_id).await?;

    Ok(decisions
        .into_iter()
        .filter_map(|decision| {
            let team = teams.get(&decision.team_id)?;
            Some(DecisionView::new(decision, team))
        })
        .collect())
}

/// Overwrite the score of a decision and emit the matching score event.
///
/// Rescoring an already scored decision emits the difference, so a team's total always equals
/// the sum of its decisions' scores.
pub async fn score_decision_manually(
    state: &SharedState,
    gm_id: GmId,
    game_id: GameId,
    phase_id: PhaseId,
    decision_id: DecisionId,
    request: ManualScoreRequest,
) -> Result<ManualScoreResponse, ServiceError> {
    request.validate()?;

    state
        .run_in_game_gate(game_id, || async move {
            let mut txn = state.begin().await?;
            let game = load_owned_game(txn.as_mut(), game_id, gm_id).await?;
            let phase = load_game_phase(txn.as_mut(), &game, phase_id).await?;

            let mut decision = txn
                .find_decision(decision_id)
                .await?
                .filter(|d| d.game_id == game_id && d.phase_id == phase_id)
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("decision {decision_id} not found"))
                })?;
            let team = txn
                .find_team(decision.team_id)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("team {} not found", decision.team_id)))?;

            let previous = match (decision.status, decision.score_awarded) {
                (DecisionStatus::Scored, Some(score)) => score,
                (DecisionStatus::Scored, None) => {
                    return Err(StorageError::Integrity {
                        message: format!("decision {decision_id} is scored without a score"),
                    }
                    .into());
                }
                _ => 0,
            };
            decision.score_awarded = Some(request.score);
            decision.status = DecisionStatus::Scored;
            if let Some(notes) = request.notes {
                decision.gm_notes = Some(notes);
            }
            txn.update_decision(decision.clone()).await?;

            let event = ScoreEventEntity {
                id: txn.allocate_id(EntityKind::ScoreEvent).await?,
                game_id,
                team_id: decision.team_id,
                phase_id,
                delta: request.score - previous,
                reason: format!("Phase {} decision scored", phase.order_index + 1),
                created_at: SystemTime::now(),
            };
            txn.insert_score_event(event.clone()).await?;
            txn.commit().await?;

            info!(
                game_id,
                phase_id,
                decision_id,
                team_id = decision.team_id,
                score = request.score,
                delta = event.delta,
                "decision scored manually"
            );

            Ok(ManualScoreResponse {
                decision: DecisionView::new(decision, &team),
                score_event: event.into(),
            })
        })
        .await
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use uuid::Uuid;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            game_store::memory::MemoryStore,
            models::{DecisionActions, DecisionEntity},
        },
        services::scenario_catalog::{import_catalog, parse_catalog},
        state::AppState,
    };

    const CATALOG: &str = r#"{"scenarios":[{"name":"Tutorial: Basic Security Incident","phases":[
        {"name":"One","briefing_text":"b"},{"name":"Two","briefing_text":"b"}]},
        {"name":"Empty","phases":[]}]}"#;

    async fn setup() -> SharedState {
        let state =
            AppState::with_game_store(AppConfig::default(), Arc::new(MemoryStore::new())).await;
        import_catalog(&state, parse_catalog(CATALOG).unwrap())
            .await
            .unwrap();
        state
    }

    fn request(scenario_id: i64) -> CreateGameRequest {
        CreateGameRequest {
            scenario_id,
            settings: None,
        }
    }

    #[tokio::test]
    async fn created_game_has_two_teams_and_distinct_codes() {
        let state = setup().await;
        let gm = Uuid::new_v4();
        let game = create_game(&state, gm, request(1)).await.unwrap();

        assert_eq!(game.status, GameStatus::Lobby);
        assert_eq!(game.phase_state, PhaseState::NotStarted);
        assert_eq!(game.red_team_code.len(), 8);
        assert_ne!(game.red_team_code, game.blue_team_code);
        assert!(game.audience_code.len() > 8);

        let detail = get_game(&state, gm, game.id).await.unwrap();
        let names: Vec<&str> = detail.teams.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["Red", "Blue 1"]);
        assert_eq!(detail.teams[0].code, game.red_team_code);
        assert_eq!(detail.scenario.phase_count, 2);
        assert!(detail.current_phase.is_none());
    }

    #[tokio::test]
    async fn unknown_scenario_is_not_found() {
        let state = setup().await;
        let err = create_game(&state, Uuid::new_v4(), request(99))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn other_game_masters_are_forbidden() {
        let state = setup().await;
        let owner = Uuid::new_v4();
        let game = create_game(&state, owner, request(1)).await.unwrap();

        let intruder = Uuid::new_v4();
        assert!(matches!(
            get_game(&state, intruder, game.id).await,
            Err(ServiceError::Forbidden(_))
        ));
        assert!(matches!(
            run_command(&state, intruder, game.id, LifecycleCommand::Start).await,
            Err(ServiceError::Forbidden(_))
        ));
        assert!(list_games(&state, intruder).await.unwrap().is_empty());
        assert_eq!(list_games(&state, owner).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn commands_walk_the_lifecycle() {
        let state = setup().await;
        let gm = Uuid::new_v4();
        let game = create_game(&state, gm, request(1)).await.unwrap();

        let started = run_command(&state, gm, game.id, LifecycleCommand::Start)
            .await
            .unwrap();
        assert_eq!(started.game.status, GameStatus::InProgress);
        assert_eq!(started.game.phase_state, PhaseState::Briefing);
        let first_phase = started.game.current_phase_id;

        let err = run_command(&state, gm, game.id, LifecycleCommand::Start)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::PreconditionViolated(_)));

        for command in [
            LifecycleCommand::OpenForDecisions,
            LifecycleCommand::LockDecisions,
            LifecycleCommand::Resolve,
        ] {
            run_command(&state, gm, game.id, command).await.unwrap();
        }
        let next = run_command(&state, gm, game.id, LifecycleCommand::CompleteAndNext)
            .await
            .unwrap();
        assert_eq!(next.game.phase_state, PhaseState::Briefing);
        assert_ne!(next.game.current_phase_id, first_phase);

        let ended = run_command(&state, gm, game.id, LifecycleCommand::End)
            .await
            .unwrap();
        assert_eq!(ended.game.status, GameStatus::Finished);
        assert_eq!(ended.game.phase_state, PhaseState::Complete);
    }

    #[tokio::test]
    async fn rejected_command_leaves_game_unchanged() {
        let state = setup().await;
        let gm = Uuid::new_v4();
        let game = create_game(&state, gm, request(1)).await.unwrap();
        run_command(&state, gm, game.id, LifecycleCommand::Start)
            .await
            .unwrap();

        let err = run_command(&state, gm, game.id, LifecycleCommand::LockDecisions)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::PreconditionViolated(_)));
        let detail = get_game(&state, gm, game.id).await.unwrap();
        assert_eq!(detail.game.status, GameStatus::InProgress);
        assert_eq!(detail.game.phase_state, PhaseState::Briefing);
        assert!(
            get_decisions(&state, gm, game.id, detail.game.current_phase_id.unwrap())
                .await
                .unwrap()
                .is_empty()
        );

        run_command(&state, gm, game.id, LifecycleCommand::OpenForDecisions)
            .await
            .unwrap();
        run_command(&state, gm, game.id, LifecycleCommand::LockDecisions)
            .await
            .unwrap();
        let err = run_command(&state, gm, game.id, LifecycleCommand::OpenForDecisions)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::PreconditionViolated(_)));
        let detail = get_game(&state, gm, game.id).await.unwrap();
        assert_eq!(detail.game.phase_state, PhaseState::DecisionLock);
    }

    #[tokio::test]
    async fn scored_decision_without_score_is_an_integrity_error() {
        let state = setup().await;
        let gm = Uuid::new_v4();
        let game = create_game(&state, gm, request(1)).await.unwrap();
        let started = run_command(&state, gm, game.id, LifecycleCommand::Start)
            .await
            .unwrap();
        let phase_id = started.game.current_phase_id.unwrap();

        let mut txn = state.begin().await.unwrap();
        let team = txn.list_teams(game.id).await.unwrap().remove(0);
        let decision_id = txn.allocate_id(EntityKind::Decision).await.unwrap();
        txn.insert_decision(DecisionEntity {
            id: decision_id,
            game_id: game.id,
            team_id: team.id,
            phase_id,
            actions: DecisionActions::Plain(vec!["isolate_host".into()]),
            free_text_justification: None,
            status: DecisionStatus::Scored,
            score_awarded: None,
            gm_notes: None,
            submitted_at: SystemTime::now(),
        })
        .await
        .unwrap();
        txn.commit().await.unwrap();

        let request = ManualScoreRequest {
            score: 5,
            notes: None,
        };
        let err = score_decision_manually(&state, gm, game.id, phase_id, decision_id, request)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Unavailable(StorageError::Integrity { .. })
        ));

        let board = get_decisions(&state, gm, game.id, phase_id).await.unwrap();
        assert_eq!(board[0].score_awarded, None);
    }

    #[tokio::test]
    async fn scenario_without_phases_cannot_start() {
        let state = setup().await;
        let gm = Uuid::new_v4();
        let game = create_game(&state, gm, request(2)).await.unwrap();
        let err = run_command(&state, gm, game.id, LifecycleCommand::Start)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::PreconditionViolated(_)));
    }

    #[tokio::test]
    async fn deleting_an_untouched_game_removes_it() {
        let state = setup().await;
        let gm = Uuid::new_v4();
        let game = create_game(&state, gm, request(1)).await.unwrap();

        let deleted = delete_game(&state, gm, game.id).await.unwrap();
        assert_eq!(deleted.votes_deleted, 0);
        assert!(matches!(
            get_game(&state, gm, game.id).await,
            Err(ServiceError::NotFound(_))
        ));
    }
}
