//! In-process storage backend.
//!
//! Every transaction owns the table lock for its whole lifetime and mutates a private copy of
//! the tables; committing swaps the copy in, dropping discards it. Transactions are therefore
//! fully serialized, which makes this backend suitable for tests and single-node deployments.

#[cfg(test)]
pub(crate) mod fixtures;
mod tables;

use std::sync::Arc;

use futures::{
    FutureExt,
    future::{BoxFuture, ready},
};
use tokio::sync::{Mutex, OwnedMutexGuard};

use self::tables::Tables;
use super::{GameStore, StoreTxn, TxnFuture};
use crate::dao::{
    models::{
        ArtifactEntity, DecisionEntity, GameEntity, GameId, GmId, GmNotesEntity,
        PhaseArtifactLink, PhaseEntity, PhaseId, PlayerEntity, PlayerId, ReportEntity,
        ScenarioEntity, ScenarioId, ScoreEventEntity, TeamEntity, TeamId, VoteEntity,
    },
    storage::{EntityKind, StorageResult},
};

/// Storage backend keeping every table in memory.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl GameStore for MemoryStore {
    fn begin(&self) -> BoxFuture<'static, StorageResult<Box<dyn StoreTxn>>> {
        let tables = Arc::clone(&self.tables);
        Box::pin(async move {
            let guard = tables.lock_owned().await;
            let working = guard.clone();
            Ok(Box::new(MemoryTxn { guard, working }) as Box<dyn StoreTxn>)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        ready(Ok(())).boxed()
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        ready(Ok(())).boxed()
    }
}

struct MemoryTxn {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
}

fn done<'a, T: Send + 'a>(result: StorageResult<T>) -> TxnFuture<'a, T> {
    ready(result).boxed()
}

impl StoreTxn for MemoryTxn {
    fn allocate_id(&mut self, kind: EntityKind) -> TxnFuture<'_, i64> {
        done(Ok(self.working.allocate_id(kind)))
    }

    fn insert_scenario(&mut self, scenario: ScenarioEntity) -> TxnFuture<'_, ()> {
        done(self.working.insert_scenario(scenario))
    }

    fn find_scenario(&mut self, id: ScenarioId) -> TxnFuture<'_, Option<ScenarioEntity>> {
        done(Ok(self.working.find_scenario(id)))
    }

    fn find_scenario_by_name(&mut self, name: String) -> TxnFuture<'_, Option<ScenarioEntity>> {
        done(Ok(self.working.find_scenario_by_name(&name)))
    }

    fn list_scenarios(&mut self) -> TxnFuture<'_, Vec<ScenarioEntity>> {
        done(Ok(self.working.list_scenarios()))
    }

    fn insert_phase(&mut self, phase: PhaseEntity) -> TxnFuture<'_, ()> {
        done(self.working.insert_phase(phase))
    }

    fn find_phase(&mut self, id: PhaseId) -> TxnFuture<'_, Option<PhaseEntity>> {
        done(Ok(self.working.find_phase(id)))
    }

    fn list_phases(&mut self, scenario_id: ScenarioId) -> TxnFuture<'_, Vec<PhaseEntity>> {
        done(Ok(self.working.list_phases(scenario_id)))
    }

    fn insert_artifact(&mut self, artifact: ArtifactEntity) -> TxnFuture<'_, ()> {
        self.working.insert_artifact(artifact);
        done(Ok(()))
    }

    fn insert_artifact_link(&mut self, link: PhaseArtifactLink) -> TxnFuture<'_, ()> {
        done(self.working.insert_artifact_link(link))
    }

    fn list_phase_artifacts(
        &mut self,
        phase_id: PhaseId,
    ) -> TxnFuture<'_, Vec<(PhaseArtifactLink, ArtifactEntity)>> {
        done(Ok(self.working.list_phase_artifacts(phase_id)))
    }

    fn insert_game(&mut self, game: GameEntity) -> TxnFuture<'_, ()> {
        done(self.working.insert_game(game))
    }

    fn update_game(&mut self, game: GameEntity) -> TxnFuture<'_, ()> {
        done(self.working.update_game(game))
    }

    fn find_game(&mut self, id: GameId) -> TxnFuture<'_, Option<GameEntity>> {
        done(Ok(self.working.find_game(id)))
    }

    fn find_game_by_audience_code(
        &mut self,
        code: String,
    ) -> TxnFuture<'_, Option<GameEntity>> {
        done(Ok(self.working.find_game_by_audience_code(&code)))
    }

    fn list_games_for_gm(&mut self, gm_id: GmId) -> TxnFuture<'_, Vec<GameEntity>> {
        done(Ok(self.working.list_games_for_gm(gm_id)))
    }

    fn is_code_taken(&mut self, code: String) -> TxnFuture<'_, bool> {
        done(Ok(self.working.is_code_taken(&code)))
    }

    fn delete_game(&mut self, id: GameId) -> TxnFuture<'_, bool> {
        done(self.working.delete_game(id))
    }

    fn purge_game_rows(&mut self, kind: EntityKind, game_id: GameId) -> TxnFuture<'_, u64> {
        done(self.working.purge_game_rows(kind, game_id))
    }

    fn insert_team(&mut self, team: TeamEntity) -> TxnFuture<'_, ()> {
        done(self.working.insert_team(team))
    }

    fn find_team(&mut self, id: TeamId) -> TxnFuture<'_, Option<TeamEntity>> {
        done(Ok(self.working.find_team(id)))
    }

    fn find_team_by_code(&mut self, code: String) -> TxnFuture<'_, Option<TeamEntity>> {
        done(Ok(self.working.find_team_by_code(&code)))
    }

    fn list_teams(&mut self, game_id: GameId) -> TxnFuture<'_, Vec<TeamEntity>> {
        done(Ok(self.working.list_teams(game_id)))
    }

    fn insert_player(&mut self, player: PlayerEntity) -> TxnFuture<'_, ()> {
        done(self.working.insert_player(player))
    }

    fn find_player(&mut self, id: PlayerId) -> TxnFuture<'_, Option<PlayerEntity>> {
        done(Ok(self.working.find_player(id)))
    }

    fn find_player_by_name(
        &mut self,
        game_id: GameId,
        team_id: TeamId,
        display_name: String,
    ) -> TxnFuture<'_, Option<PlayerEntity>> {
        done(Ok(self
            .working
            .find_player_by_name(game_id, team_id, &display_name)))
    }

    fn list_players(&mut self, game_id: GameId) -> TxnFuture<'_, Vec<PlayerEntity>> {
        done(Ok(self.working.list_players(game_id)))
    }

    fn insert_vote(&mut self, vote: VoteEntity) -> TxnFuture<'_, ()> {
        done(self.working.insert_vote(vote))
    }

    fn update_vote(&mut self, vote: VoteEntity) -> TxnFuture<'_, ()> {
        done(self.working.update_vote(vote))
    }

    fn find_vote(
        &mut self,
        player_id: PlayerId,
        phase_id: PhaseId,
    ) -> TxnFuture<'_, Option<VoteEntity>> {
        done(Ok(self.working.find_vote(player_id, phase_id)))
    }

    fn list_votes(
        &mut self,
        game_id: GameId,
        phase_id: PhaseId,
    ) -> TxnFuture<'_, Vec<VoteEntity>> {
        done(Ok(self.working.list_votes(game_id, phase_id)))
    }

    fn list_game_votes(&mut self, game_id: GameId) -> TxnFuture<'_, Vec<VoteEntity>> {
        done(Ok(self.working.list_game_votes(game_id)))
    }

    fn insert_decision(&mut self, decision: DecisionEntity) -> TxnFuture<'_, ()> {
        done(self.working.insert_decision(decision))
    }

    fn update_decision(&mut self, decision: DecisionEntity) -> TxnFuture<'_, ()> {
        done(self.working.update_decision(decision))
    }

    fn find_decision(&mut self, id: i64) -> TxnFuture<'_, Option<DecisionEntity>> {
        done(Ok(self.working.find_decision(id)))
    }

    fn find_team_decision(
        &mut self,
        game_id: GameId,
        team_id: TeamId,
        phase_id: PhaseId,
    ) -> TxnFuture<'_, Option<DecisionEntity>> {
        done(Ok(self.working.find_team_decision(game_id, team_id, phase_id)))
    }

    fn list_decisions(
        &mut self,
        game_id: GameId,
        phase_id: PhaseId,
    ) -> TxnFuture<'_, Vec<DecisionEntity>> {
        done(Ok(self.working.list_decisions(game_id, phase_id)))
    }

    fn list_game_decisions(&mut self, game_id: GameId) -> TxnFuture<'_, Vec<DecisionEntity>> {
        done(Ok(self.working.list_game_decisions(game_id)))
    }

    fn insert_score_event(&mut self, event: ScoreEventEntity) -> TxnFuture<'_, ()> {
        done(self.working.insert_score_event(event))
    }

    fn list_score_events(&mut self, game_id: GameId) -> TxnFuture<'_, Vec<ScoreEventEntity>> {
        done(Ok(self.working.list_score_events(game_id)))
    }

    fn insert_gm_notes(&mut self, notes: GmNotesEntity) -> TxnFuture<'_, ()> {
        done(self.working.insert_gm_notes(notes))
    }

    fn update_gm_notes(&mut self, notes: GmNotesEntity) -> TxnFuture<'_, ()> {
        done(self.working.update_gm_notes(notes))
    }

    fn find_gm_notes(
        &mut self,
        game_id: GameId,
        phase_id: PhaseId,
    ) -> TxnFuture<'_, Option<GmNotesEntity>> {
        done(Ok(self.working.find_gm_notes(game_id, phase_id)))
    }

    fn insert_report(&mut self, report: ReportEntity) -> TxnFuture<'_, ()> {
        done(self.working.insert_report(report))
    }

    fn update_report(&mut self, report: ReportEntity) -> TxnFuture<'_, ()> {
        done(self.working.update_report(report))
    }

    fn find_report(&mut self, game_id: GameId) -> TxnFuture<'_, Option<ReportEntity>> {
        done(Ok(self.working.find_report(game_id)))
    }

    fn commit(self: Box<Self>) -> BoxFuture<'static, StorageResult<()>> {
        let MemoryTxn { mut guard, working } = *self;
        *guard = working;
        drop(guard);
        ready(Ok(())).boxed()
    }
}
