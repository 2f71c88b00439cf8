//! Player-facing operations. Players are not authenticated: the team join code grants
//! membership and the player id returned by [`join`] identifies them afterwards.

use std::time::SystemTime;

use tracing::{debug, info};
use validator::Validate;

use crate::{
    dao::{
        game_store::StoreTxn,
        models::{
            GameEntity, GameId, GameStatus, PhaseId, PhaseState, PlayerEntity, PlayerId,
            TeamEntity, VoteEntity,
        },
        storage::EntityKind,
    },
    dto::{
        admin::CurrentPhaseView,
        format_system_time,
        player::{
            JoinGameInfo, JoinRequest, JoinResponse, MemberVoteStatus, PlayerStateResponse,
            ReportCardPhase, ReportCardResponse, TeamDecisionView, TeamVotingStatus,
            VoteRequest, VoteResponse, VoteView, VotingStatusResponse,
        },
        scenario::ArtifactView,
        validation::truncate_comment,
    },
    error::ServiceError,
    services::{
        admin_service::{load_game_phase, load_game_scenario},
        aggregation,
        review_service::round_rating,
        scenario_catalog::actions_for_role_lenient,
    },
    state::SharedState,
};

/// Best score assumed when the scoring table has no entry for a phase and role.
const DEFAULT_MAX_SCORE: i32 = 10;

async fn load_game(txn: &mut dyn StoreTxn, game_id: GameId) -> Result<GameEntity, ServiceError> {
    txn.find_game(game_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("game {game_id} not found")))
}

/// Player of `game_id` with their team.
async fn load_member(
    txn: &mut dyn StoreTxn,
    game_id: GameId,
    player_id: PlayerId,
) -> Result<(PlayerEntity, TeamEntity), ServiceError> {
    let player = txn
        .find_player(player_id)
        .await?
        .filter(|player| player.game_id == game_id)
        .ok_or_else(|| ServiceError::NotFound(format!("player {player_id} not found")))?;
    let team = txn
        .find_team(player.team_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("team {} not found", player.team_id)))?;
    Ok((player, team))
}

/// Voting progress of `team`, given every player and every vote of the phase.
pub(crate) fn team_voting_status(
    team: &TeamEntity,
    players: &[PlayerEntity],
    votes: &[VoteEntity],
) -> TeamVotingStatus {
    let members: Vec<MemberVoteStatus> = players
        .iter()
        .filter(|player| player.team_id == team.id)
        .map(|player| {
            let vote = votes.iter().find(|vote| vote.player_id == player.id);
            MemberVoteStatus {
                player_id: player.id,
                display_name: player.display_name.clone(),
                has_voted: vote.is_some(),
                selected_action: vote.map(|v| v.selected_action.clone()),
                effectiveness_rating: vote.map(|v| v.effectiveness_rating),
            }
        })
        .collect();
    let votes_submitted = members.iter().filter(|m| m.has_voted).count();

    TeamVotingStatus {
        team_id: team.id,
        team_name: team.name.clone(),
        team_role: team.role,
        player_count: members.len(),
        votes_submitted,
        all_voted: !members.is_empty() && votes_submitted == members.len(),
        members,
    }
}

// ---------------------------------------------------------------------------
// Join
// ---------------------------------------------------------------------------

/// Attach a player to the team owning `team_code`, reusing a player of the same name.
pub async fn join(state: &SharedState, request: JoinRequest) -> Result<JoinResponse, ServiceError> {
    request.validate()?;
    let code = request.team_code.trim().to_uppercase();
    let display_name = request.display_name.trim().to_owned();

    let team = {
        let mut txn = state.begin().await?;
        txn.find_team_by_code(code)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Invalid team code".into()))?
    };

    state
        .run_in_game_gate(team.game_id, || async move {
            let mut txn = state.begin().await?;
            let game = load_game(txn.as_mut(), team.game_id).await?;
            let scenario = load_game_scenario(txn.as_mut(), &game).await?;

            let existing = txn
                .find_player_by_name(game.id, team.id, display_name.clone())
                .await?;
            let (player, created) = match existing {
                Some(player) => (player, false),
                None => {
                    let player = PlayerEntity {
                        id: txn.allocate_id(EntityKind::Player).await?,
                        game_id: game.id,
                        team_id: team.id,
                        display_name,
                        joined_at: SystemTime::now(),
                    };
                    txn.insert_player(player.clone()).await?;
                    txn.commit().await?;
                    info!(
                        game_id = game.id,
                        team_id = team.id,
                        player_id = player.id,
                        "player joined"
                    );
                    (player, true)
                }
            };

            Ok(JoinResponse {
                player_id: player.id,
                team_id: team.id,
                game_id: game.id,
                team_role: team.role,
                team_name: team.name,
                display_name: player.display_name,
                created,
                game: JoinGameInfo {
                    id: game.id,
                    scenario_name: scenario.name,
                    status: game.status,
                    phase_state: game.phase_state,
                },
            })
        })
        .await
}

// ---------------------------------------------------------------------------
// Projections
// ---------------------------------------------------------------------------

/// Everything a player client renders, read from a single transaction.
pub async fn player_state(
    state: &SharedState,
    game_id: GameId,
    player_id: PlayerId,
) -> Result<PlayerStateResponse, ServiceError> {
    let mut txn = state.begin().await?;
    let game = load_game(txn.as_mut(), game_id).await?;
    let (player, team) = load_member(txn.as_mut(), game_id, player_id).await?;

    let mut response = PlayerStateResponse {
        game_id,
        player_id,
        display_name: player.display_name,
        team_id: team.id,
        team_name: team.name.clone(),
        team_role: team.role,
        game_status: game.status,
        phase_state: game.phase_state,
        current_phase: None,
        team_objective: None,
        artifacts: Vec::new(),
        decision: None,
        has_voted: false,
        my_vote: None,
        team_voting_status: None,
        available_actions: None,
    };

    let Some(phase_id) = game.current_phase_id else {
        return Ok(response);
    };
    let phase = load_game_phase(txn.as_mut(), &game, phase_id).await?;

    response.artifacts = txn
        .list_phase_artifacts(phase_id)
        .await?
        .into_iter()
        .filter(|(link, _)| link.visible_to(team.role))
        .map(|(_, artifact)| ArtifactView::from(artifact))
        .collect();
    response.team_objective = phase.objective_for(team.role).map(str::to_owned);
    response.decision = txn
        .find_team_decision(game_id, team.id, phase_id)
        .await?
        .map(TeamDecisionView::from);

    let my_vote = txn.find_vote(player_id, phase_id).await?;
    response.has_voted = my_vote.is_some();
    response.my_vote = my_vote.map(VoteView::from);

    if game.phase_state == PhaseState::OpenForDecisions {
        let players = txn.list_players(game_id).await?;
        let votes = txn.list_votes(game_id, phase_id).await?;
        response.team_voting_status = Some(team_voting_status(&team, &players, &votes));
    }

    response.available_actions = actions_for_role_lenient(&phase, team.role);
    response.current_phase = Some(CurrentPhaseView::from(phase));
    Ok(response)
}

/// Voting progress of every team for a phase.
pub async fn voting_status(
    state: &SharedState,
    game_id: GameId,
    phase_id: PhaseId,
) -> Result<VotingStatusResponse, ServiceError> {
    let mut txn = state.begin().await?;
    let game = load_game(txn.as_mut(), game_id).await?;
    load_game_phase(txn.as_mut(), &game, phase_id).await?;

    let teams = txn.list_teams(game_id).await?;
    let players = txn.list_players(game_id).await?;
    let votes = txn.list_votes(game_id, phase_id).await?;

    Ok(VotingStatusResponse {
        game_id,
        phase_id,
        phase_state: game.phase_state,
        teams: teams
            .iter()
            .map(|team| team_voting_status(team, &players, &votes))
            .collect(),
    })
}

/// Per-phase summary of a player's votes against their team's decisions.
pub async fn report_card(
    state: &SharedState,
    game_id: GameId,
    player_id: PlayerId,
) -> Result<ReportCardResponse, ServiceError> {
    let mut txn = state.begin().await?;
    let game = load_game(txn.as_mut(), game_id).await?;
    let (player, team) = load_member(txn.as_mut(), game_id, player_id).await?;
    let scenario = load_game_scenario(txn.as_mut(), &game).await?;
    let phases = txn.list_phases(scenario.id).await?;

    let reached = match (game.status, game.current_phase_id) {
        (GameStatus::Finished, _) => i32::MAX,
        (_, Some(current)) => phases
            .iter()
            .find(|phase| phase.id == current)
            .map_or(-1, |phase| phase.order_index),
        (_, None) => -1,
    };

    let votes: Vec<VoteEntity> = txn
        .list_game_votes(game_id)
        .await?
        .into_iter()
        .filter(|vote| vote.player_id == player_id)
        .collect();
    let decisions: Vec<_> = txn
        .list_game_decisions(game_id)
        .await?
        .into_iter()
        .filter(|decision| decision.team_id == team.id)
        .collect();
    let team_total_score = txn
        .list_score_events(game_id)
        .await?
        .iter()
        .filter(|event| event.team_id == team.id)
        .map(|event| i64::from(event.delta))
        .sum();

    let table = state.scoring().lookup(&scenario.name).table;
    let report_phases = phases
        .iter()
        .filter(|phase| phase.order_index <= reached)
        .map(|phase| {
            let my_vote = votes.iter().find(|vote| vote.phase_id == phase.id).cloned();
            let decision = decisions
                .iter()
                .find(|decision| decision.phase_id == phase.id)
                .cloned();
            let matched_team_decision = match (&my_vote, &decision) {
                (Some(vote), Some(decision)) => {
                    decision.actions.primary() == Some(vote.selected_action.as_str())
                }
                _ => false,
            };
            ReportCardPhase {
                phase_id: phase.id,
                order_index: phase.order_index,
                name: phase.name.clone(),
                my_vote: my_vote.map(VoteView::from),
                team_decision: decision.map(TeamDecisionView::from),
                matched_team_decision,
                max_possible_score: table
                    .max_points(phase.order_index, team.role)
                    .unwrap_or(DEFAULT_MAX_SCORE),
            }
        })
        .collect();

    let average_rating = (!votes.is_empty()).then(|| {
        let total: i32 = votes.iter().map(|vote| vote.effectiveness_rating).sum();
        round_rating(f64::from(total) / votes.len() as f64)
    });

    Ok(ReportCardResponse {
        game_id,
        player_id,
        player_name: player.display_name,
        team_name: team.name,
        team_role: team.role,
        scenario_name: scenario.name,
        team_total_score,
        average_rating,
        game_completed_at: (game.status == GameStatus::Finished)
            .then(|| format_system_time(game.updated_at)),
        phases: report_phases,
    })
}

// ---------------------------------------------------------------------------
// Voting
// ---------------------------------------------------------------------------

/// Record or replace a player's vote for the current phase.
///
/// When the vote completes the team, the team decision is created right away. A decision that
/// already exists is never recomputed. A vote that loses the race to insert the decision is
/// replayed once in a fresh transaction.
pub async fn submit_vote(
    state: &SharedState,
    game_id: GameId,
    phase_id: PhaseId,
    request: VoteRequest,
) -> Result<VoteResponse, ServiceError> {
    request.validate()?;

    let request = &request;
    state
        .run_in_game_gate(game_id, move || {
            aggregation::retry_after_decision_race(move || {
                record_vote(state, game_id, phase_id, request.clone())
            })
        })
        .await
}

async fn record_vote(
    state: &SharedState,
    game_id: GameId,
    phase_id: PhaseId,
    request: VoteRequest,
) -> Result<VoteResponse, ServiceError> {
    let mut txn = state.begin().await?;
    let game = load_game(txn.as_mut(), game_id).await?;
    let (player, _team) = load_member(txn.as_mut(), game_id, request.player_id).await?;

    if game.current_phase_id != Some(phase_id) {
        return Err(ServiceError::PhaseMismatch(format!(
            "phase {phase_id} is not the current phase of game {game_id}"
        )));
    }
    if game.phase_state != PhaseState::OpenForDecisions {
        return Err(ServiceError::PreconditionViolated(format!(
            "phase is not open for decisions (state {:?})",
            game.phase_state
        )));
    }

    let comments = request.comments.map(truncate_comment);
    let vote = match txn.find_vote(player.id, phase_id).await? {
        Some(mut vote) => {
            vote.selected_action = request.selected_action;
            vote.effectiveness_rating = request.effectiveness_rating;
            vote.comments = comments;
            vote.justification = request.justification;
            vote.voted_at = SystemTime::now();
            txn.update_vote(vote.clone()).await?;
            vote
        }
        None => {
            let vote = VoteEntity {
                id: txn.allocate_id(EntityKind::Vote).await?,
                game_id,
                team_id: player.team_id,
                phase_id,
                player_id: player.id,
                selected_action: request.selected_action,
                effectiveness_rating: request.effectiveness_rating,
                comments,
                justification: request.justification,
                voted_at: SystemTime::now(),
            };
            txn.insert_vote(vote.clone()).await?;
            vote
        }
    };

    let created =
        aggregation::aggregate_if_complete(txn.as_mut(), game_id, phase_id, player.team_id)
            .await?;
    let decision_created = created.is_some();
    let decision = match created {
        Some(decision) => Some(decision),
        None => txn.find_team_decision(game_id, player.team_id, phase_id).await?,
    };

    txn.commit().await?;
    debug!(
        game_id,
        phase_id,
        player_id = player.id,
        team_id = player.team_id,
        decision_created,
        "vote recorded"
    );

    Ok(VoteResponse {
        vote: vote.into(),
        decision_created,
        decision: decision.map(TeamDecisionView::from),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use uuid::Uuid;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{game_store::memory::MemoryStore, models::TeamRole},
        dto::admin::{CreateGameRequest, GameSummary},
        services::{
            admin_service::{create_game, run_command},
            scenario_catalog::{import_catalog, parse_catalog},
        },
        state::{AppState, LifecycleCommand},
    };

    const CATALOG: &str = r#"{"scenarios":[{"name":"Tutorial: Basic Security Incident","phases":[
        {"name":"One","briefing_text":"b","red_objective":"get in","blue_objective":"keep out",
         "available_actions":{"red":[{"name":"Establish persistence","description":"stay"}]},
         "artifacts":[
            {"name":"A1","kind":"tool_output","team_role":"red","notes_for_gm":"secret"},
            {"name":"A2","kind":"log_snippet","team_role":"blue"},
            {"name":"A3","kind":"intel_report","team_role":null}]},
        {"name":"Two","briefing_text":"b"}]}]}"#;

    async fn setup() -> (SharedState, Uuid, GameSummary) {
        let state =
            AppState::with_game_store(AppConfig::default(), Arc::new(MemoryStore::new())).await;
        import_catalog(&state, parse_catalog(CATALOG).unwrap())
            .await
            .unwrap();
        let gm = Uuid::new_v4();
        let game = create_game(
            &state,
            gm,
            CreateGameRequest {
                scenario_id: 1,
                settings: None,
            },
        )
        .await
        .unwrap();
        (state, gm, game)
    }

    async fn join_as(state: &SharedState, code: &str, name: &str) -> JoinResponse {
        join(
            state,
            JoinRequest {
                team_code: code.to_owned(),
                display_name: name.to_owned(),
            },
        )
        .await
        .unwrap()
    }

    fn vote(player_id: PlayerId, action: &str) -> VoteRequest {
        VoteRequest {
            player_id,
            selected_action: action.to_owned(),
            effectiveness_rating: 6,
            comments: None,
            justification: None,
        }
    }

    #[tokio::test]
    async fn join_is_case_insensitive_and_idempotent_by_name() {
        let (state, _, game) = setup().await;
        let first = join_as(&state, &game.red_team_code.to_lowercase(), "Alice").await;
        assert!(first.created);
        assert_eq!(first.team_role, TeamRole::Red);
        assert_eq!(first.team_name, "Red");

        let again = join_as(&state, &game.red_team_code, " Alice ").await;
        assert!(!again.created);
        assert_eq!(again.player_id, first.player_id);

        let err = join(
            &state,
            JoinRequest {
                team_code: "ZZZZZZZZ".into(),
                display_name: "Mallory".into(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(message) if message == "Invalid team code"));
    }

    #[tokio::test]
    async fn lobby_projection_is_minimal() {
        let (state, _, game) = setup().await;
        let red = join_as(&state, &game.red_team_code, "Alice").await;
        let projection = player_state(&state, game.id, red.player_id).await.unwrap();
        assert_eq!(projection.phase_state, PhaseState::NotStarted);
        assert!(projection.current_phase.is_none());
        assert!(projection.artifacts.is_empty());
        assert!(projection.available_actions.is_none());
    }

    #[tokio::test]
    async fn projection_filters_artifacts_and_objectives_by_role() {
        let (state, gm, game) = setup().await;
        let red = join_as(&state, &game.red_team_code, "Alice").await;
        let blue = join_as(&state, &game.blue_team_code, "Bob").await;
        run_command(&state, gm, game.id, LifecycleCommand::Start)
            .await
            .unwrap();

        let red_view = player_state(&state, game.id, red.player_id).await.unwrap();
        let names: Vec<&str> = red_view.artifacts.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, ["A1", "A3"]);
        assert_eq!(red_view.team_objective.as_deref(), Some("get in"));
        assert_eq!(red_view.available_actions.unwrap()[0].name, "Establish persistence");
        assert!(red_view.team_voting_status.is_none());

        let blue_view = player_state(&state, game.id, blue.player_id).await.unwrap();
        let names: Vec<&str> = blue_view.artifacts.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, ["A2", "A3"]);
        assert_eq!(blue_view.team_objective.as_deref(), Some("keep out"));
        assert!(blue_view.available_actions.is_none());
    }

    #[tokio::test]
    async fn votes_require_the_open_current_phase() {
        let (state, gm, game) = setup().await;
        let red = join_as(&state, &game.red_team_code, "Alice").await;
        let started = run_command(&state, gm, game.id, LifecycleCommand::Start)
            .await
            .unwrap();
        let phase_id = started.game.current_phase_id.unwrap();

        let err = submit_vote(&state, game.id, phase_id, vote(red.player_id, "Cover tracks"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::PreconditionViolated(_)));

        run_command(&state, gm, game.id, LifecycleCommand::OpenForDecisions)
            .await
            .unwrap();
        let err = submit_vote(&state, game.id, phase_id + 1, vote(red.player_id, "Cover tracks"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::PhaseMismatch(_)));

        let err = submit_vote(&state, game.id, phase_id, vote(999, "Cover tracks"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));

        let mut out_of_range = vote(red.player_id, "Cover tracks");
        out_of_range.effectiveness_rating = 11;
        let err = submit_vote(&state, game.id, phase_id, out_of_range)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn last_member_vote_creates_the_decision() {
        let (state, gm, game) = setup().await;
        let alice = join_as(&state, &game.red_team_code, "Alice").await;
        let carol = join_as(&state, &game.red_team_code, "Carol").await;
        let started = run_command(&state, gm, game.id, LifecycleCommand::Start)
            .await
            .unwrap();
        let phase_id = started.game.current_phase_id.unwrap();
        run_command(&state, gm, game.id, LifecycleCommand::OpenForDecisions)
            .await
            .unwrap();

        let mut first = vote(alice.player_id, "Cover tracks");
        first.comments = Some("x".repeat(600));
        let response = submit_vote(&state, game.id, phase_id, first).await.unwrap();
        assert!(!response.decision_created);
        assert_eq!(response.vote.comments.unwrap().chars().count(), 500);

        let status = voting_status(&state, game.id, phase_id).await.unwrap();
        assert_eq!(status.teams[0].votes_submitted, 1);
        assert!(!status.teams[0].all_voted);

        let response = submit_vote(&state, game.id, phase_id, vote(carol.player_id, "Cover tracks"))
            .await
            .unwrap();
        assert!(response.decision_created);
        assert_eq!(response.decision.unwrap().selected, ["Cover tracks"]);

        let projection = player_state(&state, game.id, alice.player_id).await.unwrap();
        assert!(projection.has_voted);
        assert!(projection.decision.is_some());
        assert!(projection.team_voting_status.unwrap().all_voted);
    }

    #[tokio::test]
    async fn report_card_covers_reached_phases() {
        let (state, gm, game) = setup().await;
        let alice = join_as(&state, &game.red_team_code, "Alice").await;
        let started = run_command(&state, gm, game.id, LifecycleCommand::Start)
            .await
            .unwrap();
        let phase_id = started.game.current_phase_id.unwrap();
        run_command(&state, gm, game.id, LifecycleCommand::OpenForDecisions)
            .await
            .unwrap();
        submit_vote(
            &state,
            game.id,
            phase_id,
            vote(alice.player_id, "Establish persistence"),
        )
        .await
        .unwrap();
        run_command(&state, gm, game.id, LifecycleCommand::LockDecisions)
            .await
            .unwrap();

        let card = report_card(&state, game.id, alice.player_id).await.unwrap();
        assert_eq!(card.phases.len(), 1);
        assert!(card.phases[0].matched_team_decision);
        assert_eq!(card.phases[0].max_possible_score, 8);
        assert_eq!(card.team_total_score, 8);
        assert_eq!(card.average_rating, Some(6.0));
        assert!(card.game_completed_at.is_none());

        run_command(&state, gm, game.id, LifecycleCommand::End)
            .await
            .unwrap();
        let card = report_card(&state, game.id, alice.player_id).await.unwrap();
        assert_eq!(card.phases.len(), 2);
        assert!(card.phases[1].my_vote.is_none());
        assert!(card.game_completed_at.is_some());
    }
}
