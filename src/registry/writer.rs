use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use super::reader::{decode_for, StoreClerk};
use crate::catalog::{Mutation, OrgSchema};
use crate::storage::{CasOutcome, VersionedStore};
use crate::types::{EntityKind, FieldType, RegistryError, Result, SchemaVersion};

/// Entry point for every registry write.
///
/// Holds no state besides the store handle; each builder it hands out reads,
/// mutates and compare-and-swaps one organization document on `commit`.
///
/// ```
/// use std::sync::Arc;
///
/// use schemareg::registry::StoreManager;
/// use schemareg::storage::MemoryStore;
/// use schemareg::types::{FieldType, SchemaVersion};
///
/// let manager = StoreManager::new(Arc::new(MemoryStore::new()));
/// manager.new_org("org1").commit()?;
/// let committed = manager
///     .update_org("org1")
///     .create_metric_with_aliases("page_view", ["pv"])
///     .create_field("pv", "url", FieldType::String)
///     .rename_metric("page_view", "pv")
///     .commit()?;
/// assert_eq!(committed.version, SchemaVersion(1));
/// let metric = manager.clerk("org1")?.metric_for_user_name_or_alias("pv")?.clone();
/// assert!(metric.aliases().is_empty());
/// # Ok::<(), schemareg::types::RegistryError>(())
/// ```
#[derive(Clone)]
pub struct StoreManager {
    store: Arc<dyn VersionedStore>,
}

/// State of an organization after a commit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CommittedSchema {
    /// Organization the commit targeted.
    pub org_id: String,
    /// Version now stored.
    pub version: SchemaVersion,
    /// Schema as committed.
    pub schema: OrgSchema,
    /// `false` when the commit carried no mutations and nothing was written.
    pub changed: bool,
}

impl StoreManager {
    /// Writes through `store`.
    pub fn new(store: Arc<dyn VersionedStore>) -> Self {
        Self { store }
    }

    /// Backing store.
    pub fn store(&self) -> &Arc<dyn VersionedStore> {
        &self.store
    }

    /// Starts creating a brand-new organization.
    pub fn new_org(&self, org_id: impl Into<String>) -> NewOrg<'_> {
        NewOrg {
            store: self.store.as_ref(),
            org_id: org_id.into(),
        }
    }

    /// Starts a batch of mutations against an existing organization.
    pub fn update_org(&self, org_id: impl Into<String>) -> OrgUpdate<'_> {
        OrgUpdate {
            store: self.store.as_ref(),
            org_id: org_id.into(),
            mutations: Vec::new(),
        }
    }

    /// Opens a read-only snapshot of `org_id`.
    pub fn clerk(&self, org_id: &str) -> Result<StoreClerk> {
        StoreClerk::open(self.store.as_ref(), org_id)
    }
}

impl fmt::Debug for StoreManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreManager")
            .field("store", &self.store)
            .finish()
    }
}

/// Builder creating an organization at [`SchemaVersion::INITIAL`].
#[must_use = "nothing is written until `commit` is called"]
#[derive(Debug)]
pub struct NewOrg<'a> {
    store: &'a dyn VersionedStore,
    org_id: String,
}

impl NewOrg<'_> {
    /// Creates the organization.
    ///
    /// The existence check and the write are one create-if-absent store
    /// operation, so two racing creators cannot both succeed.
    pub fn commit(self) -> Result<CommittedSchema> {
        let schema = OrgSchema::new(self.org_id.as_str())?;
        let bytes = schema.encode()?;
        match self.store.write(&self.org_id, &bytes, None)? {
            CasOutcome::Committed(version) => {
                debug!(org_id = %self.org_id, version = version.0, "registry.org.created");
                Ok(CommittedSchema {
                    org_id: self.org_id,
                    version,
                    schema,
                    changed: true,
                })
            }
            CasOutcome::Conflict { .. } => {
                debug!(org_id = %self.org_id, "registry.org.exists");
                Err(RegistryError::already_exists(EntityKind::Org, self.org_id))
            }
        }
    }
}

/// Builder buffering mutations against one organization.
///
/// Mutations are applied in the order they were added, all or nothing. A
/// builder is consumed by `commit`; to retry after a conflict, build it again
/// inside [`UpdateRetryer::run`](super::UpdateRetryer::run).
#[must_use = "nothing is written until `commit` is called"]
#[derive(Debug)]
pub struct OrgUpdate<'a> {
    store: &'a dyn VersionedStore,
    org_id: String,
    mutations: Vec<Mutation>,
}

impl OrgUpdate<'_> {
    /// Buffers an arbitrary mutation.
    pub fn mutate(mut self, mutation: Mutation) -> Self {
        self.mutations.push(mutation);
        self
    }

    /// Buffers several mutations in order.
    pub fn mutate_all(mut self, mutations: impl IntoIterator<Item = Mutation>) -> Self {
        self.mutations.extend(mutations);
        self
    }

    /// Replaces the raw event keys that name an event's metric.
    pub fn with_metric_keys<I, S>(self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mutate(Mutation::SetMetricKeys {
            keys: keys.into_iter().map(Into::into).collect(),
        })
    }

    /// Replaces the timestamp patterns. Each pattern is validated on commit.
    pub fn with_timestamp_formats<I, S>(self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mutate(Mutation::SetTimestampFormats {
            patterns: patterns.into_iter().map(Into::into).collect(),
        })
    }

    /// Creates a metric with no aliases.
    pub fn create_metric(self, name: impl Into<String>) -> Self {
        self.create_metric_with_aliases(name, Vec::<String>::new())
    }

    /// Creates a metric. Fails with `AlreadyExists` if the name or any alias
    /// already resolves to a metric.
    pub fn create_metric_with_aliases<I, S>(self, name: impl Into<String>, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mutate(Mutation::CreateMetric {
            name: name.into(),
            aliases: aliases.into_iter().map(Into::into).collect(),
        })
    }

    /// Renames a metric; its id and aliases are kept. Renaming to one of its
    /// own aliases promotes that alias.
    pub fn rename_metric(self, metric: impl Into<String>, new_name: impl Into<String>) -> Self {
        self.mutate(Mutation::RenameMetric {
            metric: metric.into(),
            new_name: new_name.into(),
        })
    }

    /// Adds an alias to a metric.
    pub fn add_metric_alias(self, metric: impl Into<String>, alias: impl Into<String>) -> Self {
        self.mutate(Mutation::AddMetricAlias {
            metric: metric.into(),
            alias: alias.into(),
        })
    }

    /// Removes an alias; `NotFound` if the metric does not carry it.
    pub fn remove_metric_alias(self, metric: impl Into<String>, alias: impl Into<String>) -> Self {
        self.mutate(Mutation::RemoveMetricAlias {
            metric: metric.into(),
            alias: alias.into(),
        })
    }

    /// Deletes a metric together with its fields. Its id is never reused.
    pub fn delete_metric(self, metric: impl Into<String>) -> Self {
        self.mutate(Mutation::DeleteMetric {
            metric: metric.into(),
        })
    }

    /// Creates a field with no aliases.
    pub fn create_field(
        self,
        metric: impl Into<String>,
        name: impl Into<String>,
        field_type: FieldType,
    ) -> Self {
        self.create_field_with_aliases(metric, name, field_type, Vec::<String>::new())
    }

    /// Creates a field under `metric`. Field names only need to be unique
    /// within their metric.
    pub fn create_field_with_aliases<I, S>(
        self,
        metric: impl Into<String>,
        name: impl Into<String>,
        field_type: FieldType,
        aliases: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mutate(Mutation::CreateField {
            metric: metric.into(),
            name: name.into(),
            field_type,
            aliases: aliases.into_iter().map(Into::into).collect(),
        })
    }

    /// Renames a field, promoting an own alias when it matches.
    pub fn rename_field(
        self,
        metric: impl Into<String>,
        field: impl Into<String>,
        new_name: impl Into<String>,
    ) -> Self {
        self.mutate(Mutation::RenameField {
            metric: metric.into(),
            field: field.into(),
            new_name: new_name.into(),
        })
    }

    /// Adds an alias to a field.
    pub fn add_field_alias(
        self,
        metric: impl Into<String>,
        field: impl Into<String>,
        alias: impl Into<String>,
    ) -> Self {
        self.mutate(Mutation::AddFieldAlias {
            metric: metric.into(),
            field: field.into(),
            alias: alias.into(),
        })
    }

    /// Removes an alias from a field.
    pub fn remove_field_alias(
        self,
        metric: impl Into<String>,
        field: impl Into<String>,
        alias: impl Into<String>,
    ) -> Self {
        self.mutate(Mutation::RemoveFieldAlias {
            metric: metric.into(),
            field: field.into(),
            alias: alias.into(),
        })
    }

    /// Deletes a field.
    pub fn delete_field(self, metric: impl Into<String>, field: impl Into<String>) -> Self {
        self.mutate(Mutation::DeleteField {
            metric: metric.into(),
            field: field.into(),
        })
    }

    /// Reads the current document, applies the buffered mutations to a working
    /// copy and compare-and-swaps it into the store.
    ///
    /// Returns [`RegistryError::Conflict`] when another writer committed in
    /// between; nothing from this builder is stored in that case. A builder
    /// with no mutations writes nothing and reports the current state.
    pub fn commit(self) -> Result<CommittedSchema> {
        let stored = self
            .store
            .read(&self.org_id)?
            .ok_or_else(|| RegistryError::not_found(EntityKind::Org, self.org_id.as_str()))?;
        let base = decode_for(&self.org_id, &stored)?;
        if self.mutations.is_empty() {
            return Ok(CommittedSchema {
                org_id: self.org_id,
                version: stored.version,
                schema: base,
                changed: false,
            });
        }

        let mut working = base;
        for mutation in &self.mutations {
            working.apply(mutation)?;
        }
        let bytes = working.encode()?;
        match self.store.write(&self.org_id, &bytes, Some(stored.version))? {
            CasOutcome::Committed(version) => {
                debug!(
                    org_id = %self.org_id,
                    version = version.0,
                    mutations = self.mutations.len(),
                    "registry.commit"
                );
                Ok(CommittedSchema {
                    org_id: self.org_id,
                    version,
                    schema: working,
                    changed: true,
                })
            }
            CasOutcome::Conflict { actual } => {
                debug!(
                    org_id = %self.org_id,
                    expected = stored.version.0,
                    ?actual,
                    "registry.commit.conflict"
                );
                Err(RegistryError::Conflict {
                    org_id: self.org_id,
                    expected: Some(stored.version),
                })
            }
        }
    }
}
