pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use futures::future::BoxFuture;

use crate::dao::models::{
    ArtifactEntity, DecisionEntity, GameEntity, GameId, GmId, GmNotesEntity, PhaseArtifactLink,
    PhaseEntity, PhaseId, PlayerEntity, PlayerId, ReportEntity, ScenarioEntity, ScenarioId,
    ScoreEventEntity, TeamEntity, TeamId, VoteEntity,
};
use crate::dao::storage::{EntityKind, StorageResult};

/// Future returned by transaction operations, borrowing the transaction.
pub type TxnFuture<'a, T> = BoxFuture<'a, StorageResult<T>>;

/// Abstraction over the persistence layer for games and their dependent rows.
pub trait GameStore: Send + Sync {
    /// Open a transaction. Dropping it without [`StoreTxn::commit`] discards every write.
    fn begin(&self) -> BoxFuture<'static, StorageResult<Box<dyn StoreTxn>>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}

/// Row-level operations executed inside one atomic unit of work.
///
/// Inserts fail with [`crate::dao::storage::StorageError::Conflict`] when they would break one
/// of the unique constraints (vote per player and phase, decision per team and phase, join
/// codes, notes per game and phase, report per game). List operations return rows in id order
/// unless stated otherwise.
pub trait StoreTxn: Send {
    /// Reserve the next identifier of `kind`.
    fn allocate_id(&mut self, kind: EntityKind) -> TxnFuture<'_, i64>;

    fn insert_scenario(&mut self, scenario: ScenarioEntity) -> TxnFuture<'_, ()>;
    fn find_scenario(&mut self, id: ScenarioId) -> TxnFuture<'_, Option<ScenarioEntity>>;
    fn find_scenario_by_name(&mut self, name: String) -> TxnFuture<'_, Option<ScenarioEntity>>;
    fn list_scenarios(&mut self) -> TxnFuture<'_, Vec<ScenarioEntity>>;
    fn insert_phase(&mut self, phase: PhaseEntity) -> TxnFuture<'_, ()>;
    fn find_phase(&mut self, id: PhaseId) -> TxnFuture<'_, Option<PhaseEntity>>;
    /// Phases of a scenario ordered by `order_index`.
    fn list_phases(&mut self, scenario_id: ScenarioId) -> TxnFuture<'_, Vec<PhaseEntity>>;
    fn insert_artifact(&mut self, artifact: ArtifactEntity) -> TxnFuture<'_, ()>;
    fn insert_artifact_link(&mut self, link: PhaseArtifactLink) -> TxnFuture<'_, ()>;
    /// Every artifact linked to a phase together with the link carrying its role.
    fn list_phase_artifacts(
        &mut self,
        phase_id: PhaseId,
    ) -> TxnFuture<'_, Vec<(PhaseArtifactLink, ArtifactEntity)>>;

    fn insert_game(&mut self, game: GameEntity) -> TxnFuture<'_, ()>;
    fn update_game(&mut self, game: GameEntity) -> TxnFuture<'_, ()>;
    fn find_game(&mut self, id: GameId) -> TxnFuture<'_, Option<GameEntity>>;
    fn find_game_by_audience_code(&mut self, code: String)
    -> TxnFuture<'_, Option<GameEntity>>;
    /// Games owned by a GM, newest first.
    fn list_games_for_gm(&mut self, gm_id: GmId) -> TxnFuture<'_, Vec<GameEntity>>;
    /// Whether a team or audience code is already assigned.
    fn is_code_taken(&mut self, code: String) -> TxnFuture<'_, bool>;
    /// Remove a game with its teams and players. Fails while votes, decisions, score events,
    /// notes or reports still reference it.
    fn delete_game(&mut self, id: GameId) -> TxnFuture<'_, bool>;
    /// Remove every row of `kind` belonging to a game, returning how many were removed.
    fn purge_game_rows(&mut self, kind: EntityKind, game_id: GameId) -> TxnFuture<'_, u64>;

    fn insert_team(&mut self, team: TeamEntity) -> TxnFuture<'_, ()>;
    fn find_team(&mut self, id: TeamId) -> TxnFuture<'_, Option<TeamEntity>>;
    fn find_team_by_code(&mut self, code: String) -> TxnFuture<'_, Option<TeamEntity>>;
    fn list_teams(&mut self, game_id: GameId) -> TxnFuture<'_, Vec<TeamEntity>>;

    fn insert_player(&mut self, player: PlayerEntity) -> TxnFuture<'_, ()>;
    fn find_player(&mut self, id: PlayerId) -> TxnFuture<'_, Option<PlayerEntity>>;
    fn find_player_by_name(
        &mut self,
        game_id: GameId,
        team_id: TeamId,
        display_name: String,
    ) -> TxnFuture<'_, Option<PlayerEntity>>;
    fn list_players(&mut self, game_id: GameId) -> TxnFuture<'_, Vec<PlayerEntity>>;

    fn insert_vote(&mut self, vote: VoteEntity) -> TxnFuture<'_, ()>;
    fn update_vote(&mut self, vote: VoteEntity) -> TxnFuture<'_, ()>;
    fn find_vote(
        &mut self,
        player_id: PlayerId,
        phase_id: PhaseId,
    ) -> TxnFuture<'_, Option<VoteEntity>>;
    fn list_votes(&mut self, game_id: GameId, phase_id: PhaseId)
    -> TxnFuture<'_, Vec<VoteEntity>>;
    fn list_game_votes(&mut self, game_id: GameId) -> TxnFuture<'_, Vec<VoteEntity>>;

    fn insert_decision(&mut self, decision: DecisionEntity) -> TxnFuture<'_, ()>;
    fn update_decision(&mut self, decision: DecisionEntity) -> TxnFuture<'_, ()>;
    fn find_decision(&mut self, id: i64) -> TxnFuture<'_, Option<DecisionEntity>>;
    fn find_team_decision(
        &mut self,
        game_id: GameId,
        team_id: TeamId,
        phase_id: PhaseId,
    ) -> TxnFuture<'_, Option<DecisionEntity>>;
    fn list_decisions(
        &mut self,
        game_id: GameId,
        phase_id: PhaseId,
    ) -> TxnFuture<'_, Vec<DecisionEntity>>;
    fn list_game_decisions(&mut self, game_id: GameId) -> TxnFuture<'_, Vec<DecisionEntity>>;

    fn insert_score_event(&mut self, event: ScoreEventEntity) -> TxnFuture<'_, ()>;
    fn list_score_events(&mut self, game_id: GameId) -> TxnFuture<'_, Vec<ScoreEventEntity>>;

    fn insert_gm_notes(&mut self, notes: GmNotesEntity) -> TxnFuture<'_, ()>;
    fn update_gm_notes(&mut self, notes: GmNotesEntity) -> TxnFuture<'_, ()>;
    fn find_gm_notes(
        &mut self,
        game_id: GameId,
        phase_id: PhaseId,
    ) -> TxnFuture<'_, Option<GmNotesEntity>>;

    fn insert_report(&mut self, report: ReportEntity) -> TxnFuture<'_, ()>;
    fn update_report(&mut self, report: ReportEntity) -> TxnFuture<'_, ()>;
    fn find_report(&mut self, game_id: GameId) -> TxnFuture<'_, Option<ReportEntity>>;

    /// Publish every write performed in this transaction atomically.
    fn commit(self: Box<Self>) -> BoxFuture<'static, StorageResult<()>>;
}
