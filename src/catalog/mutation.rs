use serde::{Deserialize, Serialize};
use tracing::trace;

use super::{names, timestamp, FieldSchema, MetricSchema, OrgSchema};
use crate::types::{EntityKind, FieldType, RegistryError, Result};

/// A single buffered change to an organization's schema.
///
/// Metrics and fields are referenced by user-visible name or alias and are
/// resolved when the mutation is applied, so later mutations in a batch see
/// the effect of earlier ones.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Mutation {
    /// Replace the raw event keys that identify the metric.
    SetMetricKeys {
        /// Keys in lookup order.
        keys: Vec<String>,
    },
    /// Replace the ordered timestamp patterns.
    SetTimestampFormats {
        /// Patterns tried in order when parsing a timestamp.
        patterns: Vec<String>,
    },
    /// Create a metric with a fresh canonical id.
    CreateMetric {
        /// User-visible name.
        name: String,
        /// Initial aliases.
        aliases: Vec<String>,
    },
    /// Change a metric's user-visible name. The canonical id is kept.
    ///
    /// Renaming to one of the metric's own aliases promotes that alias.
    RenameMetric {
        /// Current name or alias.
        metric: String,
        /// Name to take.
        new_name: String,
    },
    /// Add an alias to a metric.
    AddMetricAlias {
        /// Metric name or alias.
        metric: String,
        /// Alias to add.
        alias: String,
    },
    /// Remove one of a metric's aliases.
    RemoveMetricAlias {
        /// Metric name or alias.
        metric: String,
        /// Alias to remove.
        alias: String,
    },
    /// Remove a metric and all of its fields.
    DeleteMetric {
        /// Metric name or alias.
        metric: String,
    },
    /// Create a field under a metric.
    CreateField {
        /// Owning metric, by name or alias.
        metric: String,
        /// Field name, unique within the metric.
        name: String,
        /// Declared value type.
        field_type: FieldType,
        /// Initial aliases.
        aliases: Vec<String>,
    },
    /// Change a field's name. Renaming to one of the field's own aliases
    /// promotes that alias.
    RenameField {
        /// Owning metric, by name or alias.
        metric: String,
        /// Current field name or alias.
        field: String,
        /// Name to take.
        new_name: String,
    },
    /// Add an alias to a field.
    AddFieldAlias {
        /// Owning metric, by name or alias.
        metric: String,
        /// Field name or alias.
        field: String,
        /// Alias to add.
        alias: String,
    },
    /// Remove one of a field's aliases.
    RemoveFieldAlias {
        /// Owning metric, by name or alias.
        metric: String,
        /// Field name or alias.
        field: String,
        /// Alias to remove.
        alias: String,
    },
    /// Remove a field from its metric.
    DeleteField {
        /// Owning metric, by name or alias.
        metric: String,
        /// Field name or alias.
        field: String,
    },
}

impl OrgSchema {
    /// Applies one mutation, then re-checks the catalog invariants.
    ///
    /// On error the schema may be partially modified; callers apply batches to
    /// a working copy and drop it on failure.
    pub fn apply(&mut self, mutation: &Mutation) -> Result<()> {
        trace!(org_id = %self.org_id, ?mutation, "catalog.apply");
        match mutation {
            Mutation::SetMetricKeys { keys } => {
                names::validate_distinct("metric key", keys)?;
                self.metric_key_aliases = keys.clone();
            }
            Mutation::SetTimestampFormats { patterns } => {
                for pattern in patterns {
                    timestamp::validate_pattern(pattern)?;
                }
                self.timestamp_patterns = patterns.clone();
            }
            Mutation::CreateMetric { name, aliases } => self.create_metric(name, aliases)?,
            Mutation::RenameMetric { metric, new_name } => {
                names::validate_name("metric name", new_name)?;
                let idx = self.require_metric(metric)?;
                if self.metrics[idx].user_visible_name != *new_name {
                    if !promote_alias(&mut self.metrics[idx].aliases, new_name) {
                        self.ensure_metric_name_free(new_name)?;
                    }
                    self.metrics[idx].user_visible_name = new_name.clone();
                }
            }
            Mutation::AddMetricAlias { metric, alias } => {
                names::validate_name("metric alias", alias)?;
                let idx = self.require_metric(metric)?;
                self.ensure_metric_name_free(alias)?;
                self.metrics[idx].aliases.push(alias.clone());
            }
            Mutation::RemoveMetricAlias { metric, alias } => {
                let idx = self.require_metric(metric)?;
                remove_alias(&mut self.metrics[idx].aliases, alias)?;
            }
            Mutation::DeleteMetric { metric } => {
                let idx = self.require_metric(metric)?;
                self.metrics.remove(idx);
            }
            Mutation::CreateField {
                metric,
                name,
                field_type,
                aliases,
            } => {
                let idx = self.require_metric(metric)?;
                self.metrics[idx].create_field(name, *field_type, aliases)?;
            }
            Mutation::RenameField {
                metric,
                field,
                new_name,
            } => {
                names::validate_name("field name", new_name)?;
                let owner = self.require_metric_mut(metric)?;
                let idx = owner.require_field(field)?;
                if owner.fields[idx].user_field_name != *new_name {
                    if !promote_alias(&mut owner.fields[idx].aliases, new_name) {
                        owner.ensure_field_name_free(new_name)?;
                    }
                    owner.fields[idx].user_field_name = new_name.clone();
                }
            }
            Mutation::AddFieldAlias {
                metric,
                field,
                alias,
            } => {
                names::validate_name("field alias", alias)?;
                let owner = self.require_metric_mut(metric)?;
                let idx = owner.require_field(field)?;
                owner.ensure_field_name_free(alias)?;
                owner.fields[idx].aliases.push(alias.clone());
            }
            Mutation::RemoveFieldAlias {
                metric,
                field,
                alias,
            } => {
                let owner = self.require_metric_mut(metric)?;
                let idx = owner.require_field(field)?;
                remove_alias(&mut owner.fields[idx].aliases, alias)?;
            }
            Mutation::DeleteField { metric, field } => {
                let owner = self.require_metric_mut(metric)?;
                let idx = owner.require_field(field)?;
                owner.fields.remove(idx);
            }
        }
        self.check_invariants()
    }

    fn create_metric(&mut self, name: &str, aliases: &[String]) -> Result<()> {
        names::validate_name("metric name", name)?;
        for alias in aliases {
            names::validate_name("metric alias", alias)?;
        }
        for candidate in std::iter::once(name).chain(aliases.iter().map(String::as_str)) {
            if self.metric_owning(candidate).is_some() {
                return Err(RegistryError::already_exists(EntityKind::Metric, candidate));
            }
        }
        reject_self_collisions("metric", name, aliases)?;
        let id = self.allocate_metric_id()?;
        self.metrics.push(MetricSchema {
            id,
            user_visible_name: name.to_string(),
            aliases: aliases.to_vec(),
            next_field_id: 1,
            fields: Vec::new(),
        });
        Ok(())
    }

    fn require_metric(&self, name: &str) -> Result<usize> {
        self.metric_index(name)
            .ok_or_else(|| RegistryError::not_found(EntityKind::Metric, name))
    }

    fn require_metric_mut(&mut self, name: &str) -> Result<&mut MetricSchema> {
        let idx = self.require_metric(name)?;
        Ok(&mut self.metrics[idx])
    }

    fn ensure_metric_name_free(&self, name: &str) -> Result<()> {
        match self.metric_for_user_name_or_alias(name) {
            Some(owner) => Err(RegistryError::invalid(format!(
                "'{name}' already names metric '{}'",
                owner.user_visible_name
            ))),
            None => Ok(()),
        }
    }
}

impl MetricSchema {
    fn create_field(&mut self, name: &str, field_type: FieldType, aliases: &[String]) -> Result<()> {
        names::validate_name("field name", name)?;
        for alias in aliases {
            names::validate_name("field alias", alias)?;
        }
        for candidate in std::iter::once(name).chain(aliases.iter().map(String::as_str)) {
            if self.field_owning(candidate).is_some() {
                return Err(RegistryError::already_exists(EntityKind::Field, candidate));
            }
        }
        reject_self_collisions("field", name, aliases)?;
        let id = self.allocate_field_id()?;
        self.fields.push(FieldSchema {
            id,
            user_field_name: name.to_string(),
            field_type,
            aliases: aliases.to_vec(),
        });
        Ok(())
    }

    fn require_field(&self, name: &str) -> Result<usize> {
        self.field_index(name)
            .ok_or_else(|| RegistryError::not_found(EntityKind::Field, name))
    }

    fn ensure_field_name_free(&self, name: &str) -> Result<()> {
        match self.field_for_user_name_or_alias(name) {
            Some(owner) => Err(RegistryError::invalid(format!(
                "'{name}' already names field '{}' of metric '{}'",
                owner.user_field_name, self.user_visible_name
            ))),
            None => Ok(()),
        }
    }
}

fn reject_self_collisions(what: &str, name: &str, aliases: &[String]) -> Result<()> {
    for (idx, alias) in aliases.iter().enumerate() {
        if alias == name || aliases[..idx].contains(alias) {
            return Err(RegistryError::invalid(format!(
                "{what} alias '{alias}' is repeated"
            )));
        }
    }
    Ok(())
}

fn remove_alias(aliases: &mut Vec<String>, alias: &str) -> Result<()> {
    let pos = aliases
        .iter()
        .position(|existing| existing == alias)
        .ok_or_else(|| RegistryError::not_found(EntityKind::Alias, alias))?;
    aliases.remove(pos);
    Ok(())
}

/// Drops `name` from `aliases`; `false` when it was not one of them.
fn promote_alias(aliases: &mut Vec<String>, name: &str) -> bool {
    match aliases.iter().position(|alias| alias == name) {
        Some(pos) => {
            aliases.remove(pos);
            true
        }
        None => false,
    }
}
