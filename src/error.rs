use std::fmt;

use uuid::Uuid;

use crate::models::HistoryAction;

/// The kind of record a [`CatalogError::NotFound`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Component,
    Description,
    HistoryEntry,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Component => "component",
            Self::Description => "description",
            Self::HistoryEntry => "history entry",
        })
    }
}

/// Coarse classification of a [`CatalogError`], used by callers that need to
/// decide how to report a failure rather than what exactly failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Validation,
    Conflict,
    AuditWriteFailure,
    Internal,
}

/// Errors produced by the catalog stores and the hierarchy manager.
///
/// None of these are retried inside the crate. Every variant carries the
/// offending id or the violated rule so callers can act on it.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("{entity} {id} not found")]
    NotFound { entity: Entity, id: Uuid },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    /// Another writer updated the component after it was read.
    #[error("component {id} was modified concurrently (expected version {expected})")]
    StaleWrite { id: Uuid, expected: i64 },

    #[error("failed to record '{action}' for component {component_id}: {source}")]
    AuditWriteFailure {
        action: HistoryAction,
        component_id: Uuid,
        #[source]
        source: Box<CatalogError>,
    },

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CatalogError {
    pub fn not_found(entity: Entity, id: Uuid) -> Self {
        Self::NotFound { entity, id }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Conflict(_) | Self::StaleWrite { .. } => ErrorKind::Conflict,
            Self::AuditWriteFailure { .. } => ErrorKind::AuditWriteFailure,
            Self::Storage(_) | Self::Serialization(_) => ErrorKind::Internal,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

pub type Result<T> = std::result::Result<T, CatalogError>;
