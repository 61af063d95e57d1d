#![forbid(unsafe_code)]

//! In-memory schema document of one organization and the invariants every
//! commit must preserve.
//!
//! The catalog performs no I/O. Writers decode the stored document, apply a
//! batch of [`Mutation`]s to the working copy, and encode it back; readers
//! decode it once and answer lookups against the snapshot.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::types::{FieldId, FieldType, MetricId, RegistryError, Result};

mod mutation;
pub mod names;
mod tenant;
pub mod timestamp;

pub use mutation::Mutation;
pub use tenant::Tenant;

/// Schema document of a single organization.
///
/// Metrics are kept in canonical-id order, which is also creation order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgSchema {
    org_id: String,
    #[serde(default)]
    metric_key_aliases: Vec<String>,
    #[serde(default)]
    timestamp_patterns: Vec<String>,
    next_metric_id: u32,
    #[serde(default)]
    metrics: Vec<MetricSchema>,
}

/// A named event type within an organization.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricSchema {
    id: MetricId,
    user_visible_name: String,
    #[serde(default)]
    aliases: Vec<String>,
    next_field_id: u32,
    #[serde(default)]
    fields: Vec<FieldSchema>,
}

/// A typed attribute of a metric.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSchema {
    id: FieldId,
    user_field_name: String,
    #[serde(rename = "type")]
    field_type: FieldType,
    #[serde(default)]
    aliases: Vec<String>,
}

impl OrgSchema {
    /// Creates an empty schema for `org_id`.
    pub fn new(org_id: impl Into<String>) -> Result<Self> {
        let org_id = org_id.into();
        names::validate_name("org id", &org_id)?;
        Ok(Self {
            org_id,
            metric_key_aliases: Vec::new(),
            timestamp_patterns: Vec::new(),
            next_metric_id: 1,
            metrics: Vec::new(),
        })
    }

    /// Decodes a stored document and verifies its invariants.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let schema: OrgSchema = serde_json::from_slice(bytes)?;
        schema.check_invariants().map_err(|err| {
            RegistryError::Corruption(format!(
                "stored schema for org '{}' is inconsistent: {err}",
                schema.org_id
            ))
        })?;
        Ok(schema)
    }

    /// Encodes the document for storage. Equal schemas encode to equal bytes.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Organization owning the document.
    pub fn org_id(&self) -> &str {
        &self.org_id
    }

    /// Raw JSON keys whose value names the metric of an incoming event.
    pub fn metric_key_aliases(&self) -> &[String] {
        &self.metric_key_aliases
    }

    /// Timestamp patterns in the order they are tried.
    pub fn timestamp_patterns(&self) -> &[String] {
        &self.timestamp_patterns
    }

    /// All metrics in creation order.
    pub fn metrics(&self) -> &[MetricSchema] {
        &self.metrics
    }

    /// Resolves a metric by its user-visible name or any of its aliases.
    pub fn metric_for_user_name_or_alias(&self, name: &str) -> Option<&MetricSchema> {
        self.metrics.iter().find(|metric| metric.answers_to(name))
    }

    /// Ingestion metadata snapshot.
    pub fn tenant(&self) -> Tenant {
        Tenant::new(
            self.org_id.clone(),
            self.metric_key_aliases.clone(),
            self.timestamp_patterns.clone(),
        )
    }

    /// Verifies name/alias uniqueness at both levels and id bookkeeping.
    pub fn check_invariants(&self) -> Result<()> {
        let mut seen = HashSet::new();
        let mut ids = HashSet::new();
        for metric in &self.metrics {
            if metric.id.0 >= self.next_metric_id || !ids.insert(metric.id) {
                return Err(RegistryError::invalid(format!(
                    "metric id {} is duplicated or unallocated",
                    metric.id
                )));
            }
            for name in metric.names() {
                if !seen.insert(name) {
                    return Err(RegistryError::invalid(format!(
                        "metric name or alias '{name}' resolves to more than one metric"
                    )));
                }
            }
            metric.check_invariants()?;
        }
        Ok(())
    }

    fn allocate_metric_id(&mut self) -> Result<MetricId> {
        let id = self.next_metric_id.max(1);
        self.next_metric_id = id
            .checked_add(1)
            .ok_or_else(|| RegistryError::invalid("metric id space exhausted"))?;
        Ok(MetricId(id))
    }

    /// Returns the id of the metric that already answers to `name`, if any.
    fn metric_owning(&self, name: &str) -> Option<MetricId> {
        self.metric_for_user_name_or_alias(name).map(|metric| metric.id)
    }

    fn metric_index(&self, name: &str) -> Option<usize> {
        self.metrics.iter().position(|metric| metric.answers_to(name))
    }
}

impl MetricSchema {
    /// Canonical id; survives renames.
    pub fn id(&self) -> MetricId {
        self.id
    }

    /// Current display name.
    pub fn user_visible_name(&self) -> &str {
        &self.user_visible_name
    }

    /// Alternate names, in the order they were added.
    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    /// Every live field of the metric, in creation order.
    pub fn user_visible_fields(&self) -> &[FieldSchema] {
        &self.fields
    }

    /// Resolves a field by its name or any of its aliases.
    pub fn field_for_user_name_or_alias(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|field| field.answers_to(name))
    }

    /// Returns `true` when `name` is this metric's name or one of its aliases.
    pub fn answers_to(&self, name: &str) -> bool {
        self.user_visible_name == name || self.aliases.iter().any(|alias| alias == name)
    }

    fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.user_visible_name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }

    fn check_invariants(&self) -> Result<()> {
        let mut seen = HashSet::new();
        let mut ids = HashSet::new();
        for field in &self.fields {
            if field.id.0 >= self.next_field_id || !ids.insert(field.id) {
                return Err(RegistryError::invalid(format!(
                    "field id {} of metric '{}' is duplicated or unallocated",
                    field.id, self.user_visible_name
                )));
            }
            for name in field.names() {
                if !seen.insert(name) {
                    return Err(RegistryError::invalid(format!(
                        "field name or alias '{name}' resolves to more than one field of metric '{}'",
                        self.user_visible_name
                    )));
                }
            }
        }
        Ok(())
    }

    fn allocate_field_id(&mut self) -> Result<FieldId> {
        let id = self.next_field_id.max(1);
        self.next_field_id = id
            .checked_add(1)
            .ok_or_else(|| RegistryError::invalid("field id space exhausted"))?;
        Ok(FieldId(id))
    }

    fn field_owning(&self, name: &str) -> Option<FieldId> {
        self.field_for_user_name_or_alias(name).map(|field| field.id)
    }

    fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|field| field.answers_to(name))
    }
}

impl FieldSchema {
    /// Canonical id within the owning metric.
    pub fn id(&self) -> FieldId {
        self.id
    }

    /// Current field name.
    pub fn user_field_name(&self) -> &str {
        &self.user_field_name
    }

    /// Declared value type.
    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    /// Alternate names, in the order they were added.
    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    /// Returns `true` when `name` is this field's name or one of its aliases.
    pub fn answers_to(&self, name: &str) -> bool {
        self.user_field_name == name || self.aliases.iter().any(|alias| alias == name)
    }

    fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.user_field_name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}
