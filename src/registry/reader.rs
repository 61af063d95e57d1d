use tracing::trace;

use crate::catalog::{FieldSchema, MetricSchema, OrgSchema, Tenant};
use crate::storage::{StoredDocument, VersionedStore};
use crate::types::{EntityKind, RegistryError, Result, SchemaVersion};

/// Read-only view of one organization.
///
/// The document is read once at construction; every query answers from that
/// snapshot, so a clerk never observes a partially applied commit. Open a new
/// clerk to see later commits.
#[derive(Clone, Debug)]
pub struct StoreClerk {
    schema: OrgSchema,
    version: SchemaVersion,
}

impl StoreClerk {
    /// Reads the current document of `org_id`.
    pub fn open(store: &dyn VersionedStore, org_id: &str) -> Result<Self> {
        let stored = store
            .read(org_id)?
            .ok_or_else(|| RegistryError::not_found(EntityKind::Org, org_id))?;
        let schema = decode_for(org_id, &stored)?;
        trace!(org_id, version = stored.version.0, "registry.clerk.open");
        Ok(Self {
            schema,
            version: stored.version,
        })
    }

    /// Organization the snapshot belongs to.
    pub fn org_id(&self) -> &str {
        self.schema.org_id()
    }

    /// Version of the snapshot.
    pub fn version(&self) -> SchemaVersion {
        self.version
    }

    /// The whole document.
    pub fn schema(&self) -> &OrgSchema {
        &self.schema
    }

    /// All metrics of the organization in creation order; empty if none.
    pub fn metrics(&self) -> &[MetricSchema] {
        self.schema.metrics()
    }

    /// Resolves a metric by user-visible name or alias.
    pub fn metric_for_user_name_or_alias(&self, name: &str) -> Result<&MetricSchema> {
        self.schema
            .metric_for_user_name_or_alias(name)
            .ok_or_else(|| RegistryError::not_found(EntityKind::Metric, name))
    }

    /// Resolves a field of a metric, both by user-visible name or alias.
    pub fn field_for_user_name_or_alias(&self, metric: &str, field: &str) -> Result<&FieldSchema> {
        self.metric_for_user_name_or_alias(metric)?
            .field_for_user_name_or_alias(field)
            .ok_or_else(|| RegistryError::not_found(EntityKind::Field, field))
    }

    /// Ingestion metadata of the organization.
    pub fn tenant(&self) -> Tenant {
        self.schema.tenant()
    }
}

/// Decodes a stored document and checks it belongs to `org_id`.
pub(super) fn decode_for(org_id: &str, stored: &StoredDocument) -> Result<OrgSchema> {
    let schema = OrgSchema::decode(&stored.bytes)?;
    if schema.org_id() != org_id {
        return Err(RegistryError::Corruption(format!(
            "document stored under '{org_id}' belongs to org '{}'",
            schema.org_id()
        )));
    }
    Ok(schema)
}
