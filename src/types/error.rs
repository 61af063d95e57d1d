use thiserror::Error;

use super::{EntityKind, SchemaVersion};

/// Errors raised by the registry core and its stores.
///
/// Only [`RegistryError::Conflict`] is retryable; everything else is reported
/// to the caller unchanged.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Creating an entity whose name or alias already resolves to one.
    #[error("{kind} '{name}' already exists")]
    AlreadyExists {
        /// Kind of the colliding entity.
        kind: EntityKind,
        /// Name or alias that collided.
        name: String,
    },
    /// Referencing an entity that does not exist.
    #[error("{kind} '{name}' not found")]
    NotFound {
        /// Kind of the missing entity.
        kind: EntityKind,
        /// Name or alias that failed to resolve.
        name: String,
    },
    /// A buffered mutation would break a catalog invariant.
    #[error("invalid mutation: {0}")]
    InvalidMutation(String),
    /// A request arrived without a required field.
    #[error("missing required field '{0}'")]
    MissingField(&'static str),
    /// The stored version moved past the one this commit read.
    #[error("schema for org '{org_id}' was modified concurrently (read version {expected:?})")]
    Conflict {
        /// Organization whose commit lost the race.
        org_id: String,
        /// Version the losing commit was based on; `None` for creation.
        expected: Option<SchemaVersion>,
    },
    /// Invalid registry configuration.
    #[error("invalid configuration: {0}")]
    Configuration(String),
    /// Stored document failed to decode or violates its own invariants.
    #[error("corruption: {0}")]
    Corruption(String),
    /// I/O failure.
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
    /// SQLite backend failure.
    #[error("storage: {0}")]
    Storage(#[from] rusqlite::Error),
    /// Document encode/decode failure.
    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, RegistryError>;

impl RegistryError {
    pub(crate) fn not_found(kind: EntityKind, name: impl Into<String>) -> Self {
        RegistryError::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub(crate) fn already_exists(kind: EntityKind, name: impl Into<String>) -> Self {
        RegistryError::AlreadyExists {
            kind,
            name: name.into(),
        }
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        RegistryError::InvalidMutation(msg.into())
    }

    /// Returns `true` for compare-and-swap conflicts, the only retryable kind.
    pub fn is_conflict(&self) -> bool {
        matches!(self, RegistryError::Conflict { .. })
    }

    /// Returns `true` when the caller sent something the registry rejects.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            RegistryError::AlreadyExists { .. }
                | RegistryError::NotFound { .. }
                | RegistryError::InvalidMutation(_)
                | RegistryError::MissingField(_)
        )
    }
}
