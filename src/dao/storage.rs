use std::{error::Error, fmt};

use thiserror::Error;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Tables known to the storage layer, used for id allocation and error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Scenario,
    Phase,
    Artifact,
    ArtifactLink,
    Game,
    Team,
    Player,
    Vote,
    Decision,
    ScoreEvent,
    GmNotes,
    Report,
}

impl EntityKind {
    /// Collection / table name of the entity.
    pub fn table(&self) -> &'static str {
        match self {
            EntityKind::Scenario => "scenarios",
            EntityKind::Phase => "phases",
            EntityKind::Artifact => "artifacts",
            EntityKind::ArtifactLink => "phase_artifacts",
            EntityKind::Game => "games",
            EntityKind::Team => "teams",
            EntityKind::Player => "players",
            EntityKind::Vote => "player_votes",
            EntityKind::Decision => "phase_decisions",
            EntityKind::ScoreEvent => "score_events",
            EntityKind::GmNotes => "phase_gm_notes",
            EntityKind::Report => "after_action_reports",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

/// Error raised by storage backends regardless of the underlying database.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage unavailable: {message}")]
    Unavailable {
        message: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    #[error("unique constraint violated on {entity} ({key})")]
    Conflict { entity: EntityKind, key: String },
    #[error("integrity violation: {message}")]
    Integrity { message: String },
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }

    /// Construct a unique-constraint error.
    pub fn conflict(entity: EntityKind, key: impl Into<String>) -> Self {
        StorageError::Conflict {
            entity,
            key: key.into(),
        }
    }

    /// Whether the error is a unique-constraint violation on `entity`.
    pub fn is_conflict_on(&self, entity: EntityKind) -> bool {
        matches!(self, StorageError::Conflict { entity: found, .. } if *found == entity)
    }
}
