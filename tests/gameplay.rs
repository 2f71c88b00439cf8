mod common;

use common::{Harness, RANSOMWARE, TUTORIAL};
use tabletop_back::{
    dao::models::{DecisionStatus, GameStatus, PhaseState, RiskRating, TeamRole},
    dto::{admin::ManualScoreRequest, player::VoteRequest, review::GmNotesRequest},
    error::ServiceError,
    services::{admin_service, player_service, public_service, review_service},
    state::LifecycleCommand,
};
use uuid::Uuid;

/// Full tutorial round: one red and one blue player vote, the GM locks and both teams are scored.
#[tokio::test]
async fn tutorial_round_scores_both_teams() {
    let h = Harness::new().await;
    let game = h.create_game(TUTORIAL).await;
    let red = h.join(&game.red_team_code, "Mallory").await;
    let blue = h.join(&game.blue_team_code, "Bob").await;

    let started = admin_service::run_command(&h.state, h.gm, game.id, LifecycleCommand::Start)
        .await
        .unwrap();
    assert_eq!(started.game.status, GameStatus::InProgress);
    assert_eq!(started.game.phase_state, PhaseState::Briefing);

    let detail = admin_service::get_game(&h.state, h.gm, game.id).await.unwrap();
    let phase = detail.current_phase.unwrap();
    assert_eq!(phase.order_index, 0);

    admin_service::run_command(&h.state, h.gm, game.id, LifecycleCommand::OpenForDecisions)
        .await
        .unwrap();

    let red_vote = h
        .vote(game.id, phase.id, red.player_id, "Establish persistence", 5)
        .await
        .unwrap();
    assert!(red_vote.decision_created);
    let blue_vote = h
        .vote(game.id, phase.id, blue.player_id, "Isolate host", 8)
        .await
        .unwrap();
    assert!(blue_vote.decision_created);

    let locked =
        admin_service::run_command(&h.state, h.gm, game.id, LifecycleCommand::LockDecisions)
            .await
            .unwrap();
    assert_eq!(locked.game.phase_state, PhaseState::DecisionLock);
    assert_eq!(locked.score_events.len(), 2);

    let decisions = admin_service::get_decisions(&h.state, h.gm, game.id, phase.id)
        .await
        .unwrap();
    assert_eq!(decisions.len(), 2);
    for decision in &decisions {
        let expected = match decision.team_role {
            TeamRole::Red => 8,
            TeamRole::Blue => 9,
        };
        assert_eq!(decision.status, DecisionStatus::Scored);
        assert_eq!(decision.score_awarded, Some(expected));

        let events: Vec<_> = locked
            .score_events
            .iter()
            .filter(|event| event.team_id == decision.team_id)
            .collect();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].delta, expected);
    }

    let board = public_service::scoreboard(&h.state, &game.audience_code)
        .await
        .unwrap();
    let totals: Vec<(TeamRole, i64)> = board
        .teams
        .iter()
        .map(|team| (team.role, team.total_score))
        .collect();
    assert!(totals.contains(&(TeamRole::Red, 8)));
    assert!(totals.contains(&(TeamRole::Blue, 9)));
    assert_eq!(board.recent_events.len(), 2);
    assert!(board.voting_status.is_none());

    admin_service::run_command(&h.state, h.gm, game.id, LifecycleCommand::Resolve)
        .await
        .unwrap();
    let next =
        admin_service::run_command(&h.state, h.gm, game.id, LifecycleCommand::CompleteAndNext)
            .await
            .unwrap();
    assert_eq!(next.game.phase_state, PhaseState::Briefing);
    assert_ne!(next.game.current_phase_id, Some(phase.id));
}

/// Three red players split their votes; the first action to reach the highest count wins and a
/// later change of heart does not rewrite the decision.
#[tokio::test]
async fn plurality_decision_is_created_once() {
    let h = Harness::new().await;
    let game = h.create_game(TUTORIAL).await;
    let p1 = h.join(&game.red_team_code, "P1").await;
    let p2 = h.join(&game.red_team_code, "P2").await;
    let p3 = h.join(&game.red_team_code, "P3").await;

    admin_service::run_command(&h.state, h.gm, game.id, LifecycleCommand::Start)
        .await
        .unwrap();
    admin_service::run_command(&h.state, h.gm, game.id, LifecycleCommand::OpenForDecisions)
        .await
        .unwrap();
    let phase_id = h.current_phase(game.id).await;

    h.vote(game.id, phase_id, p1.player_id, "A", 6).await.unwrap();
    h.vote(game.id, phase_id, p2.player_id, "B", 6).await.unwrap();
    let last = h.vote(game.id, phase_id, p3.player_id, "A", 6).await.unwrap();

    assert!(last.decision_created);
    let decision = last.decision.unwrap();
    assert_eq!(decision.selected, vec!["A".to_owned()]);
    assert_eq!(decision.vote_counts.get("A"), Some(&2));
    assert_eq!(decision.vote_counts.get("B"), Some(&1));

    let revote = h.vote(game.id, phase_id, p1.player_id, "B", 7).await.unwrap();
    assert!(!revote.decision_created);
    assert_eq!(revote.vote.selected_action, "B");
    assert_eq!(revote.decision.unwrap().selected, vec!["A".to_owned()]);

    let status = player_service::voting_status(&h.state, game.id, phase_id)
        .await
        .unwrap();
    let red = status
        .teams
        .iter()
        .find(|team| team.team_role == TeamRole::Red)
        .unwrap();
    assert_eq!(red.votes_submitted, 3);
    assert!(red.all_voted);
}

/// Locking with only part of a team voted still aggregates and scores that team.
#[tokio::test]
async fn lock_aggregates_incomplete_teams() {
    let h = Harness::new().await;
    let game = h.create_game(TUTORIAL).await;
    let voter = h.join(&game.red_team_code, "Eve").await;
    h.join(&game.red_team_code, "Trudy").await;
    h.join(&game.red_team_code, "Oscar").await;

    admin_service::run_command(&h.state, h.gm, game.id, LifecycleCommand::Start)
        .await
        .unwrap();
    admin_service::run_command(&h.state, h.gm, game.id, LifecycleCommand::OpenForDecisions)
        .await
        .unwrap();
    let phase_id = h.current_phase(game.id).await;

    let vote = h
        .vote(game.id, phase_id, voter.player_id, "Establish persistence", 4)
        .await
        .unwrap();
    assert!(!vote.decision_created);
    assert!(vote.decision.is_none());

    let locked =
        admin_service::run_command(&h.state, h.gm, game.id, LifecycleCommand::LockDecisions)
            .await
            .unwrap();
    assert_eq!(locked.score_events.len(), 1);

    let decisions = admin_service::get_decisions(&h.state, h.gm, game.id, phase_id)
        .await
        .unwrap();
    assert_eq!(decisions.len(), 1);
    assert_eq!(decisions[0].team_role, TeamRole::Red);
    assert_eq!(decisions[0].status, DecisionStatus::Scored);
    assert_eq!(decisions[0].selected, vec!["Establish persistence".to_owned()]);
    assert_eq!(decisions[0].score_awarded, Some(locked.score_events[0].delta));
}

/// An action missing from the table scores zero and still emits its score event.
#[tokio::test]
async fn unknown_action_scores_zero() {
    let h = Harness::new().await;
    let game = h.create_game(TUTORIAL).await;
    let red = h.join(&game.red_team_code, "Mallory").await;

    admin_service::run_command(&h.state, h.gm, game.id, LifecycleCommand::Start)
        .await
        .unwrap();
    admin_service::run_command(&h.state, h.gm, game.id, LifecycleCommand::OpenForDecisions)
        .await
        .unwrap();
    let phase_id = h.current_phase(game.id).await;
    h.vote(game.id, phase_id, red.player_id, "Tap dance", 3)
        .await
        .unwrap();

    let locked =
        admin_service::run_command(&h.state, h.gm, game.id, LifecycleCommand::LockDecisions)
            .await
            .unwrap();
    assert_eq!(locked.score_events.len(), 1);
    assert_eq!(locked.score_events[0].delta, 0);
    assert_eq!(
        locked.score_events[0].reason,
        "Phase 1 auto-scored: Invalid or counterproductive action: Tap dance"
    );

    let decisions = admin_service::get_decisions(&h.state, h.gm, game.id, phase_id)
        .await
        .unwrap();
    assert_eq!(decisions[0].score_awarded, Some(0));
    assert_eq!(
        decisions[0].gm_notes.as_deref(),
        Some("Auto-scored: Invalid or counterproductive action: Tap dance")
    );
}

/// Players only see artifacts linked to their role or to both teams.
#[tokio::test]
async fn artifacts_follow_team_role() {
    let h = Harness::new().await;
    let game = h.create_game(TUTORIAL).await;
    let red = h.join(&game.red_team_code, "Mallory").await;
    let blue = h.join(&game.blue_team_code, "Bob").await;

    let lobby = player_service::player_state(&h.state, game.id, red.player_id)
        .await
        .unwrap();
    assert_eq!(lobby.phase_state, PhaseState::NotStarted);
    assert!(lobby.artifacts.is_empty());

    admin_service::run_command(&h.state, h.gm, game.id, LifecycleCommand::Start)
        .await
        .unwrap();

    let names = |artifacts: &[tabletop_back::dto::scenario::ArtifactView]| {
        let mut names: Vec<String> = artifacts.iter().map(|a| a.name.clone()).collect();
        names.sort();
        names
    };

    let red_state = player_service::player_state(&h.state, game.id, red.player_id)
        .await
        .unwrap();
    assert_eq!(
        names(&red_state.artifacts),
        vec![
            "Phishing Campaign Status",
            "Target Information",
            "Tutorial Game Guide"
        ]
    );
    assert!(red_state.team_objective.is_some());
    assert_eq!(red_state.available_actions.map(|a| a.len()), Some(5));

    let blue_state = player_service::player_state(&h.state, game.id, blue.player_id)
        .await
        .unwrap();
    assert_eq!(
        names(&blue_state.artifacts),
        vec![
            "Email Security Alert",
            "Tutorial Game Guide",
            "User Workstation Status"
        ]
    );
    assert!(blue_state.team_voting_status.is_none());
}

/// Deleting a played game removes its dependent rows and frees its join codes.
#[tokio::test]
async fn delete_game_removes_dependents() {
    let h = Harness::new().await;
    let game = h.create_game(TUTORIAL).await;
    let red = h.join(&game.red_team_code, "Mallory").await;
    let blue = h.join(&game.blue_team_code, "Bob").await;

    admin_service::run_command(&h.state, h.gm, game.id, LifecycleCommand::Start)
        .await
        .unwrap();
    admin_service::run_command(&h.state, h.gm, game.id, LifecycleCommand::OpenForDecisions)
        .await
        .unwrap();
    let phase_id = h.current_phase(game.id).await;
    h.vote(game.id, phase_id, red.player_id, "Establish persistence", 5)
        .await
        .unwrap();
    h.vote(game.id, phase_id, blue.player_id, "Isolate host", 8)
        .await
        .unwrap();
    admin_service::run_command(&h.state, h.gm, game.id, LifecycleCommand::LockDecisions)
        .await
        .unwrap();

    let deleted = admin_service::delete_game(&h.state, h.gm, game.id)
        .await
        .unwrap();
    assert_eq!(deleted.votes_deleted, 2);
    assert_eq!(deleted.decisions_deleted, 2);
    assert_eq!(deleted.score_events_deleted, 2);

    assert!(matches!(
        admin_service::get_game(&h.state, h.gm, game.id).await,
        Err(ServiceError::NotFound(_))
    ));
    assert!(matches!(
        public_service::scoreboard(&h.state, &game.id.to_string()).await,
        Err(ServiceError::NotFound(_))
    ));
}

#[tokio::test]
async fn commands_out_of_order_leave_the_game_untouched() {
    let h = Harness::new().await;
    let game = h.create_game(RANSOMWARE).await;

    for command in [
        LifecycleCommand::OpenForDecisions,
        LifecycleCommand::LockDecisions,
        LifecycleCommand::CompleteAndNext,
    ] {
        let err = admin_service::run_command(&h.state, h.gm, game.id, command)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::PreconditionViolated(_)));
    }

    let detail = admin_service::get_game(&h.state, h.gm, game.id).await.unwrap();
    assert_eq!(detail.game.status, GameStatus::Lobby);
    assert_eq!(detail.game.phase_state, PhaseState::NotStarted);

    let ended = admin_service::run_command(&h.state, h.gm, game.id, LifecycleCommand::End)
        .await
        .unwrap();
    assert_eq!(ended.game.status, GameStatus::Finished);
    assert!(matches!(
        admin_service::run_command(&h.state, h.gm, game.id, LifecycleCommand::Start).await,
        Err(ServiceError::PreconditionViolated(_))
    ));
}

/// Locking straight from the briefing skips the voting window and is refused.
#[tokio::test]
async fn lock_during_briefing_is_refused() {
    let h = Harness::new().await;
    let game = h.create_game(TUTORIAL).await;
    h.join(&game.red_team_code, "Mallory").await;

    admin_service::run_command(&h.state, h.gm, game.id, LifecycleCommand::Start)
        .await
        .unwrap();
    let phase_id = h.current_phase(game.id).await;

    let err = admin_service::run_command(&h.state, h.gm, game.id, LifecycleCommand::LockDecisions)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::PreconditionViolated(_)));

    let detail = admin_service::get_game(&h.state, h.gm, game.id).await.unwrap();
    assert_eq!(detail.game.status, GameStatus::InProgress);
    assert_eq!(detail.game.phase_state, PhaseState::Briefing);
    assert_eq!(detail.game.current_phase_id, Some(phase_id));
    assert!(
        admin_service::get_decisions(&h.state, h.gm, game.id, phase_id)
            .await
            .unwrap()
            .is_empty()
    );
}

/// A second lock of the same phase neither rescores decisions nor appends score events.
#[tokio::test]
async fn relocking_a_phase_changes_nothing() {
    let h = Harness::new().await;
    let game = h.create_game(TUTORIAL).await;
    let red = h.join(&game.red_team_code, "Mallory").await;

    admin_service::run_command(&h.state, h.gm, game.id, LifecycleCommand::Start)
        .await
        .unwrap();
    admin_service::run_command(&h.state, h.gm, game.id, LifecycleCommand::OpenForDecisions)
        .await
        .unwrap();
    let phase_id = h.current_phase(game.id).await;
    h.vote(game.id, phase_id, red.player_id, "Establish persistence", 5)
        .await
        .unwrap();

    let first =
        admin_service::run_command(&h.state, h.gm, game.id, LifecycleCommand::LockDecisions)
            .await
            .unwrap();
    assert_eq!(first.score_events.len(), 1);
    let board_before = public_service::scoreboard(&h.state, &game.audience_code)
        .await
        .unwrap();
    let decisions_before = admin_service::get_decisions(&h.state, h.gm, game.id, phase_id)
        .await
        .unwrap();

    let second =
        admin_service::run_command(&h.state, h.gm, game.id, LifecycleCommand::LockDecisions)
            .await
            .unwrap();
    assert_eq!(second.game.phase_state, PhaseState::DecisionLock);
    assert!(second.score_events.is_empty());

    let board_after = public_service::scoreboard(&h.state, &game.audience_code)
        .await
        .unwrap();
    assert_eq!(board_after.recent_events.len(), board_before.recent_events.len());
    for (before, after) in board_before.teams.iter().zip(&board_after.teams) {
        assert_eq!(before.role, after.role);
        assert_eq!(before.total_score, after.total_score);
    }

    let decisions_after = admin_service::get_decisions(&h.state, h.gm, game.id, phase_id)
        .await
        .unwrap();
    assert_eq!(decisions_after.len(), decisions_before.len());
    for (before, after) in decisions_before.iter().zip(&decisions_after) {
        assert_eq!(after.id, before.id);
        assert_eq!(after.status, DecisionStatus::Scored);
        assert_eq!(after.score_awarded, before.score_awarded);
    }
}

#[tokio::test]
async fn games_are_private_to_their_game_master() {
    let h = Harness::new().await;
    let game = h.create_game(TUTORIAL).await;
    let intruder = Uuid::new_v4();

    assert!(matches!(
        admin_service::get_game(&h.state, intruder, game.id).await,
        Err(ServiceError::Forbidden(_))
    ));
    assert!(matches!(
        admin_service::run_command(&h.state, intruder, game.id, LifecycleCommand::Start).await,
        Err(ServiceError::Forbidden(_))
    ));
    assert!(
        admin_service::list_games(&h.state, intruder)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn votes_are_validated_and_comments_truncated() {
    let h = Harness::new().await;
    let game = h.create_game(TUTORIAL).await;
    let red = h.join(&game.red_team_code, "Mallory").await;
    h.join(&game.red_team_code, "Trudy").await;

    admin_service::run_command(&h.state, h.gm, game.id, LifecycleCommand::Start)
        .await
        .unwrap();
    let phase_id = h.current_phase(game.id).await;

    assert!(matches!(
        h.vote(game.id, phase_id, red.player_id, "Cover tracks", 5).await,
        Err(ServiceError::PreconditionViolated(_))
    ));

    admin_service::run_command(&h.state, h.gm, game.id, LifecycleCommand::OpenForDecisions)
        .await
        .unwrap();

    for rating in [0, 11] {
        assert!(matches!(
            h.vote(game.id, phase_id, red.player_id, "Cover tracks", rating).await,
            Err(ServiceError::InvalidInput(_))
        ));
    }
    assert!(matches!(
        h.vote(game.id, phase_id + 1, red.player_id, "Cover tracks", 5).await,
        Err(ServiceError::PhaseMismatch(_))
    ));

    let response = player_service::submit_vote(
        &h.state,
        game.id,
        phase_id,
        VoteRequest {
            player_id: red.player_id,
            selected_action: "Cover tracks".into(),
            effectiveness_rating: 5,
            comments: Some("x".repeat(501)),
            justification: Some("Stay hidden".into()),
        },
    )
    .await
    .unwrap();
    assert_eq!(response.vote.comments.map(|c| c.chars().count()), Some(500));

    let comments = review_service::get_phase_comments(&h.state, h.gm, game.id, phase_id)
        .await
        .unwrap();
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0].player_name, "Mallory");
}

/// The GM rescoring a decision records only the difference as a new score event.
#[tokio::test]
async fn manual_rescore_emits_the_difference() {
    let h = Harness::new().await;
    let game = h.create_game(TUTORIAL).await;
    let red = h.join(&game.red_team_code, "Mallory").await;

    admin_service::run_command(&h.state, h.gm, game.id, LifecycleCommand::Start)
        .await
        .unwrap();
    admin_service::run_command(&h.state, h.gm, game.id, LifecycleCommand::OpenForDecisions)
        .await
        .unwrap();
    let phase_id = h.current_phase(game.id).await;
    h.vote(game.id, phase_id, red.player_id, "Establish persistence", 5)
        .await
        .unwrap();
    admin_service::run_command(&h.state, h.gm, game.id, LifecycleCommand::LockDecisions)
        .await
        .unwrap();

    let decision = admin_service::get_decisions(&h.state, h.gm, game.id, phase_id)
        .await
        .unwrap()
        .remove(0);
    assert_eq!(decision.score_awarded, Some(8));

    let rescored = admin_service::score_decision_manually(
        &h.state,
        h.gm,
        game.id,
        phase_id,
        decision.id,
        ManualScoreRequest {
            score: 10,
            notes: Some("Textbook persistence".into()),
        },
    )
    .await
    .unwrap();
    assert_eq!(rescored.decision.score_awarded, Some(10));
    assert_eq!(rescored.score_event.delta, 2);

    let board = public_service::scoreboard(&h.state, &game.id.to_string())
        .await
        .unwrap();
    let red_total = board
        .teams
        .iter()
        .find(|team| team.role == TeamRole::Red)
        .map(|team| team.total_score);
    assert_eq!(red_total, Some(10));
}

/// After-action report built from ratings, comments and GM notes.
#[tokio::test]
async fn after_action_report_summarises_the_game() {
    let h = Harness::new().await;
    let game = h.create_game(TUTORIAL).await;
    let red = h.join(&game.red_team_code, "Mallory").await;
    let blue = h.join(&game.blue_team_code, "Bob").await;

    assert!(matches!(
        review_service::get_report(&h.state, h.gm, game.id).await,
        Err(ServiceError::NotFound(_))
    ));

    admin_service::run_command(&h.state, h.gm, game.id, LifecycleCommand::Start)
        .await
        .unwrap();
    admin_service::run_command(&h.state, h.gm, game.id, LifecycleCommand::OpenForDecisions)
        .await
        .unwrap();
    let phase_id = h.current_phase(game.id).await;
    h.vote(game.id, phase_id, red.player_id, "Establish persistence", 5)
        .await
        .unwrap();
    player_service::submit_vote(
        &h.state,
        game.id,
        phase_id,
        VoteRequest {
            player_id: blue.player_id,
            selected_action: "Isolate host".into(),
            effectiveness_rating: 8,
            comments: Some("Containment was quick".into()),
            justification: None,
        },
    )
    .await
    .unwrap();

    let notes = review_service::upsert_gm_notes(
        &h.state,
        h.gm,
        game.id,
        phase_id,
        GmNotesRequest {
            notes: "Blue spotted the phish early".into(),
        },
    )
    .await
    .unwrap();
    assert!(notes.updated_at.is_some());

    let report = review_service::generate_report(&h.state, h.gm, game.id)
        .await
        .unwrap();
    assert_eq!(report.overall_risk_score, 6.5);
    assert_eq!(report.overall_risk_rating, RiskRating::Low);
    assert_eq!(report.phase_analyses.len(), 2);

    let first = &report.phase_analyses[0];
    assert_eq!(first.average_rating, Some(6.5));
    assert_eq!(first.total_responses, 2);
    assert_eq!(first.comments.len(), 1);
    assert_eq!(first.gm_notes.as_deref(), Some("Blue spotted the phish early"));

    let second = &report.phase_analyses[1];
    assert_eq!(second.risk_rating, RiskRating::NotRated);
    assert_eq!(second.total_responses, 0);

    let stored = review_service::get_report(&h.state, h.gm, game.id)
        .await
        .unwrap();
    assert_eq!(stored.overall_risk_score, 6.5);
}
