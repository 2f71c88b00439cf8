use serde::Serialize;
use utoipa::ToSchema;

/// Reachability of the storage backend at the time of the check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum StorageHealth {
    /// The backend answered its ping.
    Reachable,
    /// A backend is installed but its ping failed.
    Unreachable,
    /// No backend is installed.
    Missing,
}

/// Simple health response returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Health status ("ok" or "degraded").
    pub status: String,
    /// Storage reachability.
    pub storage: StorageHealth,
}

impl HealthResponse {
    /// Create a health response indicating the system is operational.
    pub fn ok(storage: StorageHealth) -> Self {
        Self {
            status: "ok".to_string(),
            storage,
        }
    }

    /// Create a health response indicating the system is in degraded mode.
    pub fn degraded(storage: StorageHealth) -> Self {
        Self {
            status: "degraded".to_string(),
            storage,
        }
    }
}
