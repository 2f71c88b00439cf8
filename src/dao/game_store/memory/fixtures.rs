//! Row builders shared by unit tests.

use std::time::SystemTime;

use uuid::Uuid;

use crate::dao::{
    game_store::StoreTxn,
    models::{
        GameEntity, GameId, GameStatus, PhaseState, PlayerEntity, PlayerId, TeamEntity, TeamId,
        TeamRole,
    },
};

pub(crate) fn game(id: GameId, codes: [&str; 3]) -> GameEntity {
    GameEntity {
        id,
        scenario_id: 1,
        gm_id: Uuid::nil(),
        status: GameStatus::Lobby,
        phase_state: PhaseState::NotStarted,
        current_phase_id: None,
        red_team_code: codes[0].into(),
        blue_team_code: codes[1].into(),
        audience_code: codes[2].into(),
        settings: Default::default(),
        created_at: SystemTime::now(),
        updated_at: SystemTime::now(),
    }
}

pub(crate) fn team(id: TeamId, game_id: GameId, role: TeamRole, code: &str) -> TeamEntity {
    TeamEntity {
        id,
        game_id,
        name: match role {
            TeamRole::Red => "Red".into(),
            TeamRole::Blue => "Blue 1".into(),
        },
        role,
        code: code.into(),
    }
}

pub(crate) fn player(id: PlayerId, game_id: GameId, team_id: TeamId) -> PlayerEntity {
    PlayerEntity {
        id,
        game_id,
        team_id,
        display_name: format!("player-{id}"),
        joined_at: SystemTime::now(),
    }
}

/// Game 1 with red team 1 and blue team 2.
pub(crate) async fn seed_game(txn: &mut dyn StoreTxn) {
    txn.insert_game(game(1, ["REDTEAM1", "BLUETEAM", "audience-1"]))
        .await
        .unwrap();
    txn.insert_team(team(1, 1, TeamRole::Red, "REDTEAM1"))
        .await
        .unwrap();
    txn.insert_team(team(2, 1, TeamRole::Blue, "BLUETEAM"))
        .await
        .unwrap();
}
