use tracing::warn;

use crate::{
    dto::health::{HealthResponse, StorageHealth},
    state::SharedState,
};

/// Ping the storage backend and report whether the service runs degraded.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    let storage = match state.game_store().await {
        Some(store) => match store.health_check().await {
            Ok(()) => StorageHealth::Reachable,
            Err(err) => {
                warn!(error = %err, "storage health check failed");
                StorageHealth::Unreachable
            }
        },
        None => {
            warn!("storage unavailable (degraded mode)");
            StorageHealth::Missing
        }
    };

    if state.is_degraded().await {
        HealthResponse::degraded(storage)
    } else {
        HealthResponse::ok(storage)
    }
}
