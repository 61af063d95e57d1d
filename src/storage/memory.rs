use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::trace;

use super::{next_version, CasOutcome, StoredDocument, VersionedStore};
use crate::types::{Result, SchemaVersion};

/// In-memory [`VersionedStore`].
///
/// Clones share the same underlying map, so several registry handles in one
/// process observe each other's commits. The lock is held only for the
/// duration of a single `read` or `write`.
#[derive(Clone, Default)]
pub struct MemoryStore {
    documents: Arc<RwLock<HashMap<String, StoredDocument>>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStore")
            .field("org_count", &self.documents.read().len())
            .finish()
    }
}

impl VersionedStore for MemoryStore {
    fn read(&self, org_id: &str) -> Result<Option<StoredDocument>> {
        let doc = self.documents.read().get(org_id).cloned();
        trace!(
            org_id,
            version = doc.as_ref().map(|d| d.version.0),
            "store.memory.read"
        );
        Ok(doc)
    }

    fn write(
        &self,
        org_id: &str,
        document: &[u8],
        expected: Option<SchemaVersion>,
    ) -> Result<CasOutcome> {
        let mut documents = self.documents.write();
        let actual = documents.get(org_id).map(|doc| doc.version);
        if actual != expected {
            trace!(org_id, ?expected, ?actual, "store.memory.conflict");
            return Ok(CasOutcome::Conflict { actual });
        }
        let version = next_version(expected);
        documents.insert(
            org_id.to_string(),
            StoredDocument {
                bytes: document.to_vec(),
                version,
            },
        );
        trace!(org_id, version = version.0, "store.memory.write");
        Ok(CasOutcome::Committed(version))
    }
}
