pub mod state_machine;

use std::{future::Future, sync::Arc, time::Duration};

use dashmap::DashMap;
use tokio::sync::{Mutex, RwLock, watch};
use tokio::time::timeout;
use tracing::warn;

use crate::{
    config::AppConfig,
    dao::{
        game_store::{GameStore, StoreTxn},
        models::GameId,
    },
    error::ServiceError,
    services::scoring::ScoringTable,
};

pub use self::state_machine::{InvalidTransition, LifecycleCommand, LifecyclePosition, transition};

pub type SharedState = Arc<AppState>;

/// Central application state holding the storage handle, configuration and per-game gates.
pub struct AppState {
    game_store: RwLock<Option<Arc<dyn GameStore>>>,
    degraded: watch::Sender<bool>,
    config: AppConfig,
    scoring: Arc<ScoringTable>,
    game_gates: DashMap<GameId, Arc<Mutex<()>>>,
    transition_timeout: Option<Duration>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        let transition_timeout = Some(config.transition_timeout()).filter(|limit| !limit.is_zero());
        Arc::new(Self {
            game_store: RwLock::new(None),
            degraded: degraded_tx,
            config,
            scoring: Arc::new(ScoringTable::builtin()),
            game_gates: DashMap::new(),
            transition_timeout,
        })
    }

    /// Construct a state with a storage backend already installed.
    pub async fn with_game_store(config: AppConfig, store: Arc<dyn GameStore>) -> SharedState {
        let state = Self::new(config);
        state.set_game_store(store).await;
        state
    }

    /// Runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Process-wide scoring tables.
    pub fn scoring(&self) -> &ScoringTable {
        &self.scoring
    }

    /// Obtain a handle to the current game store, if one is installed.
    pub async fn game_store(&self) -> Option<Arc<dyn GameStore>> {
        let guard = self.game_store.read().await;
        guard.as_ref().cloned()
    }

    /// Current game store or [`ServiceError::Degraded`] when none is installed.
    pub async fn require_game_store(&self) -> Result<Arc<dyn GameStore>, ServiceError> {
        self.game_store().await.ok_or(ServiceError::Degraded)
    }

    /// Open a store transaction.
    pub async fn begin(&self) -> Result<Box<dyn StoreTxn>, ServiceError> {
        let store = self.require_game_store().await?;
        if *self.degraded.borrow() {
            return Err(ServiceError::Degraded);
        }
        Ok(store.begin().await?)
    }

    /// Install a new game store implementation and leave degraded mode.
    pub async fn set_game_store(&self, store: Arc<dyn GameStore>) {
        {
            let mut guard = self.game_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false).await;
    }

    /// Remove the current game store and enter degraded mode.
    pub async fn clear_game_store(&self) {
        {
            let mut guard = self.game_store.write().await;
            guard.take();
        }
        self.update_degraded(true).await;
    }

    /// Current degraded flag.
    pub async fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub async fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }

    fn game_gate(&self, game_id: GameId) -> Arc<Mutex<()>> {
        self.game_gates.entry(game_id).or_default().clone()
    }

    /// Drop the gate of a deleted game.
    pub fn forget_game(&self, game_id: GameId) {
        self.game_gates.remove(&game_id);
    }

    /// Run `work` while holding the gate of `game_id`, bounded by the configured timeout.
    ///
    /// On timeout the work future is dropped, which rolls back any transaction it owned.
    pub async fn run_in_game_gate<F, Fut, T>(&self, game_id: GameId, work: F) -> Result<T, ServiceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let gate = self.game_gate(game_id);
        let _guard = gate.lock().await;

        let work_future = work();
        match self.transition_timeout {
            Some(limit) => match timeout(limit, work_future).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(game_id, timeout_ms = limit.as_millis() as u64, "game command timed out");
                    Err(ServiceError::Timeout)
                }
            },
            None => work_future.await,
        }
    }
}
