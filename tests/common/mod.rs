//! Shared setup for the gameplay tests: an in-memory store seeded with the shipped catalog.

#![allow(dead_code)]

use std::sync::Arc;

use tabletop_back::{
    config::AppConfig,
    dao::{
        game_store::memory::MemoryStore,
        models::{GameId, GmId, PhaseId, PlayerId, ScenarioId},
    },
    dto::{
        admin::{CreateGameRequest, GameSummary},
        player::{JoinRequest, JoinResponse, VoteRequest, VoteResponse},
    },
    error::ServiceError,
    services::{admin_service, player_service, scenario_catalog},
    state::{AppState, SharedState},
};
use uuid::Uuid;

pub const TUTORIAL: &str = "Tutorial: Basic Security Incident";
pub const RANSOMWARE: &str = "Ransomware Incident Response";

const CATALOG: &str = include_str!("../../config/scenarios.json");

pub struct Harness {
    pub state: SharedState,
    pub gm: GmId,
}

impl Harness {
    pub async fn new() -> Self {
        let state =
            AppState::with_game_store(AppConfig::default(), Arc::new(MemoryStore::new())).await;
        let catalog = scenario_catalog::parse_catalog(CATALOG).unwrap();
        scenario_catalog::import_catalog(&state, catalog).await.unwrap();
        Self {
            state,
            gm: Uuid::new_v4(),
        }
    }

    pub async fn scenario_id(&self, name: &str) -> ScenarioId {
        scenario_catalog::list_scenarios(&self.state)
            .await
            .unwrap()
            .into_iter()
            .find(|scenario| scenario.name == name)
            .map(|scenario| scenario.id)
            .unwrap()
    }

    pub async fn create_game(&self, scenario: &str) -> GameSummary {
        let scenario_id = self.scenario_id(scenario).await;
        admin_service::create_game(
            &self.state,
            self.gm,
            CreateGameRequest {
                scenario_id,
                settings: None,
            },
        )
        .await
        .unwrap()
    }

    pub async fn join(&self, code: &str, name: &str) -> JoinResponse {
        player_service::join(
            &self.state,
            JoinRequest {
                team_code: code.into(),
                display_name: name.into(),
            },
        )
        .await
        .unwrap()
    }

    /// Current phase of a started game.
    pub async fn current_phase(&self, game_id: GameId) -> PhaseId {
        admin_service::get_game(&self.state, self.gm, game_id)
            .await
            .unwrap()
            .game
            .current_phase_id
            .unwrap()
    }

    pub async fn vote(
        &self,
        game_id: GameId,
        phase_id: PhaseId,
        player_id: PlayerId,
        action: &str,
        rating: i32,
    ) -> Result<VoteResponse, ServiceError> {
        player_service::submit_vote(
            &self.state,
            game_id,
            phase_id,
            VoteRequest {
                player_id,
                selected_action: action.into(),
                effectiveness_rating: rating,
                comments: None,
                justification: None,
            },
        )
        .await
    }
}
