use std::collections::HashMap;

use futures::{FutureExt, TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, ClientSession, Collection, Database,
    bson::{Document, doc},
    error::Error as MongoError,
    options::ReturnDocument,
};
use serde::{Serialize, de::DeserializeOwned};

use super::{
    documents::MongoGameDocument,
    error::{MongoDaoError, MongoResult, is_duplicate_key, is_write_conflict},
};
use crate::dao::{
    game_store::{StoreTxn, TxnFuture},
    models::{
        ArtifactEntity, DecisionEntity, GameEntity, GameId, GmId, GmNotesEntity,
        PhaseArtifactLink, PhaseEntity, PhaseId, PlayerEntity, PlayerId, ReportEntity,
        ScenarioEntity, ScenarioId, ScoreEventEntity, TeamEntity, TeamId, VoteEntity,
    },
    storage::{EntityKind, StorageError, StorageResult},
};

const COUNTERS_COLLECTION: &str = "counters";

fn query_error(kind: EntityKind, operation: &'static str, source: MongoError) -> StorageError {
    if is_duplicate_key(&source) {
        return StorageError::conflict(kind, format!("{operation} on {}", kind.table()));
    }
    MongoDaoError::Query {
        collection: kind.table(),
        operation,
        source,
    }
    .into()
}

/// Unit of work bound to one client session with an open transaction.
///
/// Dropping the value ends the session, which aborts the transaction server side.
pub struct MongoTxn {
    database: Database,
    session: ClientSession,
}

impl MongoTxn {
    pub(super) async fn start(client: &Client, database: Database) -> MongoResult<Self> {
        let mut session = client
            .start_session()
            .await
            .map_err(|source| MongoDaoError::StartTransaction { source })?;
        session
            .start_transaction()
            .await
            .map_err(|source| MongoDaoError::StartTransaction { source })?;
        Ok(Self { database, session })
    }

    fn collection<T: Send + Sync>(&self, kind: EntityKind) -> Collection<T> {
        self.database.collection::<T>(kind.table())
    }

    async fn find_one<T>(&mut self, kind: EntityKind, filter: Document) -> StorageResult<Option<T>>
    where
        T: DeserializeOwned + Send + Sync,
    {
        let collection = self.collection::<T>(kind);
        collection
            .find_one(filter)
            .session(&mut self.session)
            .await
            .map_err(|source| query_error(kind, "find_one", source))
    }

    /// Rows matching `filter`, ordered by `sort`.
    async fn find_many<T>(
        &mut self,
        kind: EntityKind,
        filter: Document,
        sort: Document,
    ) -> StorageResult<Vec<T>>
    where
        T: DeserializeOwned + Send + Sync,
    {
        let collection = self.collection::<T>(kind);
        let mut cursor = collection
            .find(filter)
            .sort(sort)
            .session(&mut self.session)
            .await
            .map_err(|source| query_error(kind, "find", source))?;
        cursor
            .stream(&mut self.session)
            .try_collect()
            .await
            .map_err(|source| query_error(kind, "find", source))
    }

    async fn insert<T>(&mut self, kind: EntityKind, row: &T) -> StorageResult<()>
    where
        T: Serialize + Send + Sync,
    {
        let collection = self.collection::<T>(kind);
        collection
            .insert_one(row)
            .session(&mut self.session)
            .await
            .map_err(|source| {
                // an uncommitted insert of the same key in another session
                if is_write_conflict(&source) {
                    return StorageError::conflict(
                        kind,
                        format!("concurrent insert on {}", kind.table()),
                    );
                }
                query_error(kind, "insert_one", source)
            })?;
        Ok(())
    }

    /// Replace the row with `id`; a missing row is an integrity error.
    async fn replace<T>(&mut self, kind: EntityKind, id: i64, row: &T) -> StorageResult<()>
    where
        T: Serialize + Send + Sync,
    {
        let collection = self.collection::<T>(kind);
        let result = collection
            .replace_one(doc! { "id": id }, row)
            .session(&mut self.session)
            .await
            .map_err(|source| query_error(kind, "replace_one", source))?;
        if result.matched_count == 0 {
            return Err(StorageError::Integrity {
                message: format!("no {kind} row with id {id}"),
            });
        }
        Ok(())
    }

    async fn count(&mut self, kind: EntityKind, filter: Document) -> StorageResult<u64> {
        let collection = self.collection::<Document>(kind);
        collection
            .count_documents(filter)
            .session(&mut self.session)
            .await
            .map_err(|source| query_error(kind, "count_documents", source))
    }

    async fn delete_many(&mut self, kind: EntityKind, filter: Document) -> StorageResult<u64> {
        let collection = self.collection::<Document>(kind);
        let result = collection
            .delete_many(filter)
            .session(&mut self.session)
            .await
            .map_err(|source| query_error(kind, "delete_many", source))?;
        Ok(result.deleted_count)
    }

    /// Counters advance outside the transaction; ids of rolled-back rows are never reused.
    async fn next_id(&self, kind: EntityKind) -> StorageResult<i64> {
        let counters = self.database.collection::<Document>(COUNTERS_COLLECTION);
        let counter = counters
            .find_one_and_update(doc! { "_id": kind.table() }, doc! { "$inc": { "seq": 1_i64 } })
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await
            .map_err(|source| query_error(kind, "allocate_id", source))?;

        counter
            .as_ref()
            .and_then(|counter| counter.get_i64("seq").ok())
            .ok_or_else(|| {
                MongoDaoError::MalformedDocument {
                    collection: COUNTERS_COLLECTION,
                    message: format!("counter of {kind} has no sequence"),
                }
                .into()
            })
    }

    async fn find_game_where(&mut self, filter: Document) -> StorageResult<Option<GameEntity>> {
        let document: Option<MongoGameDocument> = self.find_one(EntityKind::Game, filter).await?;
        document
            .map(GameEntity::try_from)
            .transpose()
            .map_err(Into::into)
    }

    async fn code_taken(&mut self, code: String) -> StorageResult<bool> {
        let games = self
            .count(
                EntityKind::Game,
                doc! { "$or": [
                    { "red_team_code": code.as_str() },
                    { "blue_team_code": code.as_str() },
                    { "audience_code": code.as_str() },
                ] },
            )
            .await?;
        if games > 0 {
            return Ok(true);
        }
        Ok(self.count(EntityKind::Team, doc! { "code": code.as_str() }).await? > 0)
    }

    async fn phase_artifacts(
        &mut self,
        phase_id: PhaseId,
    ) -> StorageResult<Vec<(PhaseArtifactLink, ArtifactEntity)>> {
        let links: Vec<PhaseArtifactLink> = self
            .find_many(
                EntityKind::ArtifactLink,
                doc! { "phase_id": phase_id },
                doc! { "artifact_id": 1 },
            )
            .await?;
        let ids: Vec<i64> = links.iter().map(|link| link.artifact_id).collect();
        let artifacts: HashMap<i64, ArtifactEntity> = self
            .find_many::<ArtifactEntity>(
                EntityKind::Artifact,
                doc! { "id": { "$in": ids } },
                doc! { "id": 1 },
            )
            .await?
            .into_iter()
            .map(|artifact| (artifact.id, artifact))
            .collect();

        Ok(links
            .into_iter()
            .filter_map(|link| {
                artifacts
                    .get(&link.artifact_id)
                    .map(|artifact| (link, artifact.clone()))
            })
            .collect())
    }

    async fn remove_game(&mut self, id: GameId) -> StorageResult<bool> {
        for kind in [
            EntityKind::Vote,
            EntityKind::Decision,
            EntityKind::ScoreEvent,
            EntityKind::GmNotes,
            EntityKind::Report,
        ] {
            if self.count(kind, doc! { "game_id": id }).await? > 0 {
                return Err(StorageError::Integrity {
                    message: format!("game {id} is still referenced by {kind}"),
                });
            }
        }

        if self.delete_many(EntityKind::Game, doc! { "id": id }).await? == 0 {
            return Ok(false);
        }
        self.delete_many(EntityKind::Player, doc! { "game_id": id }).await?;
        self.delete_many(EntityKind::Team, doc! { "game_id": id }).await?;
        Ok(true)
    }

    async fn purge(&mut self, kind: EntityKind, game_id: GameId) -> StorageResult<u64> {
        match kind {
            EntityKind::Vote
            | EntityKind::Decision
            | EntityKind::ScoreEvent
            | EntityKind::GmNotes
            | EntityKind::Report => self.delete_many(kind, doc! { "game_id": game_id }).await,
            other => Err(StorageError::Integrity {
                message: format!("{other} rows are not owned by a game"),
            }),
        }
    }
}

impl StoreTxn for MongoTxn {
    fn allocate_id(&mut self, kind: EntityKind) -> TxnFuture<'_, i64> {
        Box::pin(async move { self.next_id(kind).await })
    }

    // ------------------------------------------------------------------
    // Scenario catalog
    // ------------------------------------------------------------------

    fn insert_scenario(&mut self, scenario: ScenarioEntity) -> TxnFuture<'_, ()> {
        Box::pin(async move { self.insert(EntityKind::Scenario, &scenario).await })
    }

    fn find_scenario(&mut self, id: ScenarioId) -> TxnFuture<'_, Option<ScenarioEntity>> {
        Box::pin(async move { self.find_one(EntityKind::Scenario, doc! { "id": id }).await })
    }

    fn find_scenario_by_name(&mut self, name: String) -> TxnFuture<'_, Option<ScenarioEntity>> {
        Box::pin(async move {
            self.find_one(EntityKind::Scenario, doc! { "name": name })
                .await
        })
    }

    fn list_scenarios(&mut self) -> TxnFuture<'_, Vec<ScenarioEntity>> {
        Box::pin(async move {
            self.find_many(EntityKind::Scenario, doc! {}, doc! { "id": 1 })
                .await
        })
    }

    fn insert_phase(&mut self, phase: PhaseEntity) -> TxnFuture<'_, ()> {
        Box::pin(async move { self.insert(EntityKind::Phase, &phase).await })
    }

    fn find_phase(&mut self, id: PhaseId) -> TxnFuture<'_, Option<PhaseEntity>> {
        Box::pin(async move { self.find_one(EntityKind::Phase, doc! { "id": id }).await })
    }

    fn list_phases(&mut self, scenario_id: ScenarioId) -> TxnFuture<'_, Vec<PhaseEntity>> {
        Box::pin(async move {
            self.find_many(
                EntityKind::Phase,
                doc! { "scenario_id": scenario_id },
                doc! { "order_index": 1 },
            )
            .await
        })
    }

    fn insert_artifact(&mut self, artifact: ArtifactEntity) -> TxnFuture<'_, ()> {
        Box::pin(async move { self.insert(EntityKind::Artifact, &artifact).await })
    }

    fn insert_artifact_link(&mut self, link: PhaseArtifactLink) -> TxnFuture<'_, ()> {
        Box::pin(async move { self.insert(EntityKind::ArtifactLink, &link).await })
    }

    fn list_phase_artifacts(
        &mut self,
        phase_id: PhaseId,
    ) -> TxnFuture<'_, Vec<(PhaseArtifactLink, ArtifactEntity)>> {
        Box::pin(self.phase_artifacts(phase_id))
    }

    // ------------------------------------------------------------------
    // Games
    // ------------------------------------------------------------------

    fn insert_game(&mut self, game: GameEntity) -> TxnFuture<'_, ()> {
        Box::pin(async move {
            let document = MongoGameDocument::from(game);
            self.insert(EntityKind::Game, &document).await
        })
    }

    fn update_game(&mut self, game: GameEntity) -> TxnFuture<'_, ()> {
        Box::pin(async move {
            let id = game.id;
            let document = MongoGameDocument::from(game);
            self.replace(EntityKind::Game, id, &document).await
        })
    }

    fn find_game(&mut self, id: GameId) -> TxnFuture<'_, Option<GameEntity>> {
        Box::pin(self.find_game_where(doc! { "id": id }))
    }

    fn find_game_by_audience_code(&mut self, code: String) -> TxnFuture<'_, Option<GameEntity>> {
        Box::pin(self.find_game_where(doc! { "audience_code": code }))
    }

    fn list_games_for_gm(&mut self, gm_id: GmId) -> TxnFuture<'_, Vec<GameEntity>> {
        Box::pin(async move {
            let documents: Vec<MongoGameDocument> = self
                .find_many(
                    EntityKind::Game,
                    doc! { "gm_id": gm_id.to_string() },
                    doc! { "id": 1 },
                )
                .await?;
            documents
                .into_iter()
                .map(|document| GameEntity::try_from(document).map_err(StorageError::from))
                .collect()
        })
    }

    fn is_code_taken(&mut self, code: String) -> TxnFuture<'_, bool> {
        Box::pin(self.code_taken(code))
    }

    fn delete_game(&mut self, id: GameId) -> TxnFuture<'_, bool> {
        Box::pin(self.remove_game(id))
    }

    fn purge_game_rows(&mut self, kind: EntityKind, game_id: GameId) -> TxnFuture<'_, u64> {
        Box::pin(self.purge(kind, game_id))
    }

    // ------------------------------------------------------------------
    // Teams and players
    // ------------------------------------------------------------------

    fn insert_team(&mut self, team: TeamEntity) -> TxnFuture<'_, ()> {
        Box::pin(async move { self.insert(EntityKind::Team, &team).await })
    }

    fn find_team(&mut self, id: TeamId) -> TxnFuture<'_, Option<TeamEntity>> {
        Box::pin(async move { self.find_one(EntityKind::Team, doc! { "id": id }).await })
    }

    fn find_team_by_code(&mut self, code: String) -> TxnFuture<'_, Option<TeamEntity>> {
        Box::pin(async move { self.find_one(EntityKind::Team, doc! { "code": code }).await })
    }

    fn list_teams(&mut self, game_id: GameId) -> TxnFuture<'_, Vec<TeamEntity>> {
        Box::pin(async move {
            self.find_many(EntityKind::Team, doc! { "game_id": game_id }, doc! { "id": 1 })
                .await
        })
    }

    fn insert_player(&mut self, player: PlayerEntity) -> TxnFuture<'_, ()> {
        Box::pin(async move { self.insert(EntityKind::Player, &player).await })
    }

    fn find_player(&mut self, id: PlayerId) -> TxnFuture<'_, Option<PlayerEntity>> {
        Box::pin(async move { self.find_one(EntityKind::Player, doc! { "id": id }).await })
    }

    fn find_player_by_name(
        &mut self,
        game_id: GameId,
        team_id: TeamId,
        display_name: String,
    ) -> TxnFuture<'_, Option<PlayerEntity>> {
        Box::pin(async move {
            self.find_one(
                EntityKind::Player,
                doc! { "game_id": game_id, "team_id": team_id, "display_name": display_name },
            )
            .await
        })
    }

    fn list_players(&mut self, game_id: GameId) -> TxnFuture<'_, Vec<PlayerEntity>> {
        Box::pin(async move {
            self.find_many(EntityKind::Player, doc! { "game_id": game_id }, doc! { "id": 1 })
                .await
        })
    }

    // ------------------------------------------------------------------
    // Votes, decisions and scores
    // ------------------------------------------------------------------

    fn insert_vote(&mut self, vote: VoteEntity) -> TxnFuture<'_, ()> {
        Box::pin(async move { self.insert(EntityKind::Vote, &vote).await })
    }

    fn update_vote(&mut self, vote: VoteEntity) -> TxnFuture<'_, ()> {
        Box::pin(async move { self.replace(EntityKind::Vote, vote.id, &vote).await })
    }

    fn find_vote(
        &mut self,
        player_id: PlayerId,
        phase_id: PhaseId,
    ) -> TxnFuture<'_, Option<VoteEntity>> {
        Box::pin(async move {
            self.find_one(
                EntityKind::Vote,
                doc! { "player_id": player_id, "phase_id": phase_id },
            )
            .await
        })
    }

    fn list_votes(&mut self, game_id: GameId, phase_id: PhaseId) -> TxnFuture<'_, Vec<VoteEntity>> {
        Box::pin(async move {
            self.find_many(
                EntityKind::Vote,
                doc! { "game_id": game_id, "phase_id": phase_id },
                doc! { "id": 1 },
            )
            .await
        })
    }

    fn list_game_votes(&mut self, game_id: GameId) -> TxnFuture<'_, Vec<VoteEntity>> {
        Box::pin(async move {
            self.find_many(EntityKind::Vote, doc! { "game_id": game_id }, doc! { "id": 1 })
                .await
        })
    }

    fn insert_decision(&mut self, decision: DecisionEntity) -> TxnFuture<'_, ()> {
        Box::pin(async move { self.insert(EntityKind::Decision, &decision).await })
    }

    fn update_decision(&mut self, decision: DecisionEntity) -> TxnFuture<'_, ()> {
        Box::pin(async move {
            self.replace(EntityKind::Decision, decision.id, &decision)
                .await
        })
    }

    fn find_decision(&mut self, id: i64) -> TxnFuture<'_, Option<DecisionEntity>> {
        Box::pin(async move { self.find_one(EntityKind::Decision, doc! { "id": id }).await })
    }

    fn find_team_decision(
        &mut self,
        game_id: GameId,
        team_id: TeamId,
        phase_id: PhaseId,
    ) -> TxnFuture<'_, Option<DecisionEntity>> {
        Box::pin(async move {
            self.find_one(
                EntityKind::Decision,
                doc! { "game_id": game_id, "team_id": team_id, "phase_id": phase_id },
            )
            .await
        })
    }

    fn list_decisions(
        &mut self,
        game_id: GameId,
        phase_id: PhaseId,
    ) -> TxnFuture<'_, Vec<DecisionEntity>> {
        Box::pin(async move {
            self.find_many(
                EntityKind::Decision,
                doc! { "game_id": game_id, "phase_id": phase_id },
                doc! { "id": 1 },
            )
            .await
        })
    }

    fn list_game_decisions(&mut self, game_id: GameId) -> TxnFuture<'_, Vec<DecisionEntity>> {
        Box::pin(async move {
            self.find_many(EntityKind::Decision, doc! { "game_id": game_id }, doc! { "id": 1 })
                .await
        })
    }

    fn insert_score_event(&mut self, event: ScoreEventEntity) -> TxnFuture<'_, ()> {
        Box::pin(async move { self.insert(EntityKind::ScoreEvent, &event).await })
    }

    fn list_score_events(&mut self, game_id: GameId) -> TxnFuture<'_, Vec<ScoreEventEntity>> {
        Box::pin(async move {
            self.find_many(
                EntityKind::ScoreEvent,
                doc! { "game_id": game_id },
                doc! { "id": 1 },
            )
            .await
        })
    }

    // ------------------------------------------------------------------
    // Review
    // ------------------------------------------------------------------

    fn insert_gm_notes(&mut self, notes: GmNotesEntity) -> TxnFuture<'_, ()> {
        Box::pin(async move { self.insert(EntityKind::GmNotes, &notes).await })
    }

    fn update_gm_notes(&mut self, notes: GmNotesEntity) -> TxnFuture<'_, ()> {
        Box::pin(async move { self.replace(EntityKind::GmNotes, notes.id, &notes).await })
    }

    fn find_gm_notes(
        &mut self,
        game_id: GameId,
        phase_id: PhaseId,
    ) -> TxnFuture<'_, Option<GmNotesEntity>> {
        Box::pin(async move {
            self.find_one(
                EntityKind::GmNotes,
                doc! { "game_id": game_id, "phase_id": phase_id },
            )
            .await
        })
    }

    fn insert_report(&mut self, report: ReportEntity) -> TxnFuture<'_, ()> {
        Box::pin(async move { self.insert(EntityKind::Report, &report).await })
    }

    fn update_report(&mut self, report: ReportEntity) -> TxnFuture<'_, ()> {
        Box::pin(async move { self.replace(EntityKind::Report, report.id, &report).await })
    }

    fn find_report(&mut self, game_id: GameId) -> TxnFuture<'_, Option<ReportEntity>> {
        Box::pin(async move {
            self.find_one(EntityKind::Report, doc! { "game_id": game_id })
                .await
        })
    }

    fn commit(self: Box<Self>) -> BoxFuture<'static, StorageResult<()>> {
        let MongoTxn { mut session, .. } = *self;
        async move {
            session
                .commit_transaction()
                .await
                .map_err(|source| MongoDaoError::Commit { source }.into())
        }
        .boxed()
    }
}
