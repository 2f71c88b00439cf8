use std::sync::Arc;

use futures::future::BoxFuture;
use mongodb::{
    Client, Database, IndexModel,
    bson::{Document, doc},
    options::IndexOptions,
};
use tokio::sync::RwLock;
use tracing::info;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    txn::MongoTxn,
};
use crate::dao::{
    game_store::{GameStore, StoreTxn},
    storage::{EntityKind, StorageResult},
};

/// Index created on startup: collection, index name, keys and uniqueness.
struct IndexSpec {
    kind: EntityKind,
    name: &'static str,
    keys: Document,
    unique: bool,
}

impl IndexSpec {
    fn unique(kind: EntityKind, name: &'static str, keys: Document) -> Self {
        Self {
            kind,
            name,
            keys,
            unique: true,
        }
    }

    fn lookup(kind: EntityKind, name: &'static str, keys: Document) -> Self {
        Self {
            kind,
            name,
            keys,
            unique: false,
        }
    }
}

fn index_specs() -> Vec<IndexSpec> {
    use EntityKind::*;

    let mut specs: Vec<IndexSpec> = [
        Scenario, Phase, Artifact, Game, Team, Player, Vote, Decision, ScoreEvent, GmNotes, Report,
    ]
    .into_iter()
    .map(|kind| IndexSpec::unique(kind, "id_idx", doc! { "id": 1 }))
    .collect();

    specs.extend([
        IndexSpec::unique(Scenario, "scenario_name_idx", doc! { "name": 1 }),
        IndexSpec::unique(
            Phase,
            "phase_order_idx",
            doc! { "scenario_id": 1, "order_index": 1 },
        ),
        IndexSpec::unique(
            ArtifactLink,
            "phase_artifact_idx",
            doc! { "phase_id": 1, "artifact_id": 1 },
        ),
        IndexSpec::unique(Game, "red_code_idx", doc! { "red_team_code": 1 }),
        IndexSpec::unique(Game, "blue_code_idx", doc! { "blue_team_code": 1 }),
        IndexSpec::unique(Game, "audience_code_idx", doc! { "audience_code": 1 }),
        IndexSpec::lookup(Game, "game_owner_idx", doc! { "gm_id": 1 }),
        IndexSpec::unique(Team, "team_code_idx", doc! { "code": 1 }),
        IndexSpec::lookup(Team, "team_game_idx", doc! { "game_id": 1 }),
        IndexSpec::lookup(
            Player,
            "player_name_idx",
            doc! { "game_id": 1, "team_id": 1, "display_name": 1 },
        ),
        IndexSpec::unique(Vote, "vote_player_phase_idx", doc! { "player_id": 1, "phase_id": 1 }),
        IndexSpec::lookup(Vote, "vote_game_phase_idx", doc! { "game_id": 1, "phase_id": 1 }),
        IndexSpec::unique(
            Decision,
            "decision_team_phase_idx",
            doc! { "game_id": 1, "team_id": 1, "phase_id": 1 },
        ),
        IndexSpec::lookup(ScoreEvent, "score_event_game_idx", doc! { "game_id": 1 }),
        IndexSpec::unique(GmNotes, "notes_game_phase_idx", doc! { "game_id": 1, "phase_id": 1 }),
        IndexSpec::unique(Report, "report_game_idx", doc! { "game_id": 1 }),
    ]);
    specs
}

#[derive(Clone)]
pub struct MongoGameStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) = establish_connection(&self.config).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }

    async fn begin(&self) -> MongoResult<MongoTxn> {
        let (client, database) = {
            let guard = self.state.read().await;
            (guard.client.clone(), guard.database.clone())
        };
        MongoTxn::start(&client, database).await
    }
}

impl MongoGameStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) = establish_connection(&config).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        info!(
            database = %store.inner.config.database_name,
            "MongoDB store ready"
        );
        Ok(store)
    }

    /// Creating the indexes also creates every collection, which transactions cannot do
    /// on older servers.
    async fn ensure_indexes(&self) -> MongoResult<()> {
        let database = {
            let guard = self.inner.state.read().await;
            guard.database.clone()
        };

        for spec in index_specs() {
            let collection = database.collection::<Document>(spec.kind.table());
            let index = IndexModel::builder()
                .keys(spec.keys)
                .options(
                    IndexOptions::builder()
                        .name(Some(spec.name.to_owned()))
                        .unique(Some(spec.unique))
                        .build(),
                )
                .build();

            collection
                .create_index(index)
                .await
                .map_err(|source| MongoDaoError::EnsureIndex {
                    collection: spec.kind.table(),
                    index: spec.name,
                    source,
                })?;
        }

        Ok(())
    }
}

impl GameStore for MongoGameStore {
    fn begin(&self) -> BoxFuture<'static, StorageResult<Box<dyn StoreTxn>>> {
        let store = self.clone();
        Box::pin(async move {
            let txn = store.inner.begin().await?;
            Ok(Box::new(txn) as Box<dyn StoreTxn>)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
