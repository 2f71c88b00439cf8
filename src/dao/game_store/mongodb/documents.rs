use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::MongoDaoError;
use crate::dao::{
    models::{GameEntity, GameId, GameStatus, PhaseId, PhaseState, ScenarioId},
    storage::EntityKind,
};

/// Game row as stored in MongoDB. The owner is kept as a string so it can be filtered on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoGameDocument {
    id: GameId,
    scenario_id: ScenarioId,
    gm_id: String,
    status: GameStatus,
    phase_state: PhaseState,
    current_phase_id: Option<PhaseId>,
    red_team_code: String,
    blue_team_code: String,
    audience_code: String,
    #[serde(default)]
    settings: serde_json::Map<String, serde_json::Value>,
    created_at: DateTime,
    updated_at: DateTime,
}

impl From<GameEntity> for MongoGameDocument {
    fn from(value: GameEntity) -> Self {
        Self {
            id: value.id,
            scenario_id: value.scenario_id,
            gm_id: value.gm_id.to_string(),
            status: value.status,
            phase_state: value.phase_state,
            current_phase_id: value.current_phase_id,
            red_team_code: value.red_team_code,
            blue_team_code: value.blue_team_code,
            audience_code: value.audience_code,
            settings: value.settings,
            created_at: DateTime::from_system_time(value.created_at),
            updated_at: DateTime::from_system_time(value.updated_at),
        }
    }
}

impl TryFrom<MongoGameDocument> for GameEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoGameDocument) -> Result<Self, Self::Error> {
        let gm_id = Uuid::parse_str(&value.gm_id).map_err(|err| {
            MongoDaoError::MalformedDocument {
                collection: EntityKind::Game.table(),
                message: format!("game {} has an invalid owner: {err}", value.id),
            }
        })?;
        Ok(Self {
            id: value.id,
            scenario_id: value.scenario_id,
            gm_id,
            status: value.status,
            phase_state: value.phase_state,
            current_phase_id: value.current_phase_id,
            red_team_code: value.red_team_code,
            blue_team_code: value.blue_team_code,
            audience_code: value.audience_code,
            settings: value.settings,
            created_at: value.created_at.to_system_time(),
            updated_at: value.updated_at.to_system_time(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use super::*;

    #[test]
    fn game_documents_keep_every_field() {
        let created = SystemTime::UNIX_EPOCH + Duration::from_millis(1_700_000_000_000);
        let game = GameEntity {
            id: 3,
            scenario_id: 1,
            gm_id: Uuid::new_v4(),
            status: GameStatus::InProgress,
            phase_state: PhaseState::OpenForDecisions,
            current_phase_id: Some(2),
            red_team_code: "7K3M9QXT".into(),
            blue_team_code: "P4W8ZR2N".into(),
            audience_code: "aud-code".into(),
            settings: serde_json::Map::new(),
            created_at: created,
            updated_at: created,
        };

        let document = MongoGameDocument::from(game.clone());
        let restored = GameEntity::try_from(document).unwrap();
        assert_eq!(restored, game);
    }

    #[test]
    fn invalid_owner_is_reported() {
        let mut document = MongoGameDocument::from(GameEntity {
            id: 1,
            scenario_id: 1,
            gm_id: Uuid::nil(),
            status: GameStatus::Lobby,
            phase_state: PhaseState::NotStarted,
            current_phase_id: None,
            red_team_code: "A".into(),
            blue_team_code: "B".into(),
            audience_code: "C".into(),
            settings: serde_json::Map::new(),
            created_at: SystemTime::UNIX_EPOCH,
            updated_at: SystemTime::UNIX_EPOCH,
        });
        document.gm_id = "nope".into();
        assert!(matches!(
            GameEntity::try_from(document),
            Err(MongoDaoError::MalformedDocument { .. })
        ));
    }
}
