//! Versioned document stores backing the registry.
//!
//! Every organization owns exactly one opaque document. The only concurrency
//! primitive is [`VersionedStore::write`], a compare-and-swap on the stored
//! [`SchemaVersion`]; all catalog invariants are enforced above this layer.

use std::fmt::Debug;

use crate::types::{Result, SchemaVersion};

/// Process-local store for tests and single-process embedding.
pub mod memory;

/// Durable SQLite store safe to share between processes.
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::{SqliteStore, SqliteStoreOptions};

/// Document bytes together with the version they were committed at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredDocument {
    /// Encoded document; opaque to the store.
    pub bytes: Vec<u8>,
    /// Version of this document.
    pub version: SchemaVersion,
}

/// Outcome of a compare-and-swap write.
///
/// Conflicts are expected under contention and are not errors; callers decide
/// whether to surface or retry them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CasOutcome {
    /// The write landed and the document now carries this version.
    Committed(SchemaVersion),
    /// The stored version did not match; `actual` is the version found, or
    /// `None` when no document exists.
    Conflict {
        /// Version present in the store at the time of the write.
        actual: Option<SchemaVersion>,
    },
}

impl CasOutcome {
    /// Returns `true` when the write landed.
    pub fn is_committed(&self) -> bool {
        matches!(self, CasOutcome::Committed(_))
    }
}

/// Key-value store holding one versioned document per organization.
pub trait VersionedStore: Debug + Send + Sync {
    /// Reads the current document for `org_id`, or `None` when absent.
    fn read(&self, org_id: &str) -> Result<Option<StoredDocument>>;

    /// Atomically replaces the document for `org_id`.
    ///
    /// With `expected = Some(v)` the write succeeds only if the stored version
    /// is `v`, and the new version is `v + 1`. With `expected = None` the write
    /// succeeds only if no document exists, and the new version is
    /// [`SchemaVersion::INITIAL`].
    fn write(
        &self,
        org_id: &str,
        document: &[u8],
        expected: Option<SchemaVersion>,
    ) -> Result<CasOutcome>;
}

/// Version a successful write with the given expectation produces.
pub(crate) fn next_version(expected: Option<SchemaVersion>) -> SchemaVersion {
    match expected {
        Some(version) => version.next(),
        None => SchemaVersion::INITIAL,
    }
}
