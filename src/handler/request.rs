use serde::{Deserialize, Serialize};

use crate::catalog::Mutation;
use crate::types::{FieldType, RegistryError, Result};

/// Organization addressed by a request.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct OrgRef {
    /// Target organization; required.
    #[serde(default)]
    pub org_id: Option<String>,
}

/// Metric addressed by a request, by user-visible name or alias.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct MetricRef {
    /// Owning organization.
    #[serde(flatten)]
    pub org: OrgRef,
    /// Metric name or alias; required.
    #[serde(default)]
    pub metric_name: Option<String>,
}

/// Field addressed by a request, by user-visible name or alias.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct FieldRef {
    /// Owning metric.
    #[serde(flatten)]
    pub metric: MetricRef,
    /// Field name or alias; required.
    #[serde(default)]
    pub field_name: Option<String>,
}

/// Replaces ingestion metadata. Absent lists are left unchanged.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct UpdateTenantRequest {
    /// Target organization.
    #[serde(flatten)]
    pub org: OrgRef,
    /// New raw event keys naming the metric.
    #[serde(default)]
    pub metric_keys: Option<Vec<String>>,
    /// New ordered timestamp patterns.
    #[serde(default)]
    pub timestamp_formats: Option<Vec<String>>,
}

/// Creates a metric, optionally with aliases.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct CreateMetricRequest {
    /// Organization and the new metric's name.
    #[serde(flatten)]
    pub metric: MetricRef,
    /// Initial aliases.
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// Renames a metric and edits its aliases in one commit.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct UpdateMetricRequest {
    /// Metric to update.
    #[serde(flatten)]
    pub metric: MetricRef,
    /// New user-visible name.
    #[serde(default)]
    pub new_name: Option<String>,
    /// Aliases to add.
    #[serde(default)]
    pub add_aliases: Vec<String>,
    /// Aliases to remove.
    #[serde(default)]
    pub remove_aliases: Vec<String>,
}

/// Creates a field under an existing metric.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct CreateFieldRequest {
    /// Owning metric and the new field's name.
    #[serde(flatten)]
    pub field: FieldRef,
    /// Declared type; required.
    #[serde(default)]
    pub field_type: Option<FieldType>,
    /// Initial aliases.
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// Renames a field and edits its aliases in one commit.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct UpdateFieldRequest {
    /// Field to update.
    #[serde(flatten)]
    pub field: FieldRef,
    /// New field name.
    #[serde(default)]
    pub new_name: Option<String>,
    /// Aliases to add.
    #[serde(default)]
    pub add_aliases: Vec<String>,
    /// Aliases to remove.
    #[serde(default)]
    pub remove_aliases: Vec<String>,
}

/// Every request the registry accepts, tagged by `"op"` on the wire.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    /// Create an empty organization at version 0.
    CreateOrg(OrgRef),
    /// Replace metric keys and timestamp formats.
    UpdateTenant(UpdateTenantRequest),
    /// Create a metric.
    CreateMetric(CreateMetricRequest),
    /// Rename a metric or edit its aliases.
    UpdateMetric(UpdateMetricRequest),
    /// Delete a metric and its fields.
    DeleteMetric(MetricRef),
    /// Create a field.
    CreateField(CreateFieldRequest),
    /// Rename a field or edit its aliases.
    UpdateField(UpdateFieldRequest),
    /// Delete a field.
    DeleteField(FieldRef),
    /// List every metric of an organization.
    GetMetrics(OrgRef),
    /// Resolve one metric by name or alias.
    GetMetric(MetricRef),
    /// Read ingestion metadata.
    GetTenant(OrgRef),
}

/// A request whose required fields are all present.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Plan<'r> {
    CreateOrg(&'r str),
    Update {
        org_id: &'r str,
        mutations: Vec<Mutation>,
        /// Entity the request names; must resolve even when nothing changes.
        target: Option<Target<'r>>,
    },
    GetMetrics(&'r str),
    GetMetric {
        org_id: &'r str,
        metric: &'r str,
    },
    GetTenant(&'r str),
}

/// Metric or field an update request addresses.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Target<'r> {
    Metric(&'r str),
    Field { metric: &'r str, field: &'r str },
}

impl Request {
    /// Wire name of the operation.
    pub fn op(&self) -> &'static str {
        match self {
            Request::CreateOrg(_) => "create_org",
            Request::UpdateTenant(_) => "update_tenant",
            Request::CreateMetric(_) => "create_metric",
            Request::UpdateMetric(_) => "update_metric",
            Request::DeleteMetric(_) => "delete_metric",
            Request::CreateField(_) => "create_field",
            Request::UpdateField(_) => "update_field",
            Request::DeleteField(_) => "delete_field",
            Request::GetMetrics(_) => "get_metrics",
            Request::GetMetric(_) => "get_metric",
            Request::GetTenant(_) => "get_tenant",
        }
    }

    /// Checks required fields and lowers the request to registry calls.
    ///
    /// Nothing here touches the store. Updates rename first, then add and
    /// remove aliases through the new name, so the old name can be kept as an
    /// alias in one request. Renaming to an existing alias promotes it, so a
    /// removal of that same alias is dropped from the plan.
    pub(crate) fn plan(&self) -> Result<Plan<'_>> {
        let plan = match self {
            Request::CreateOrg(org) => Plan::CreateOrg(org.org_id()?),
            Request::GetMetrics(org) => Plan::GetMetrics(org.org_id()?),
            Request::GetTenant(org) => Plan::GetTenant(org.org_id()?),
            Request::GetMetric(metric) => Plan::GetMetric {
                org_id: metric.org.org_id()?,
                metric: metric.metric_name()?,
            },
            Request::UpdateTenant(req) => {
                let mut mutations = Vec::new();
                if let Some(keys) = &req.metric_keys {
                    mutations.push(Mutation::SetMetricKeys { keys: keys.clone() });
                }
                if let Some(patterns) = &req.timestamp_formats {
                    mutations.push(Mutation::SetTimestampFormats {
                        patterns: patterns.clone(),
                    });
                }
                Plan::Update {
                    org_id: req.org.org_id()?,
                    mutations,
                    target: None,
                }
            }
            Request::CreateMetric(req) => Plan::Update {
                org_id: req.metric.org.org_id()?,
                mutations: vec![Mutation::CreateMetric {
                    name: req.metric.metric_name()?.to_string(),
                    aliases: req.aliases.clone(),
                }],
                target: None,
            },
            Request::UpdateMetric(req) => {
                let metric = req.metric.metric_name()?;
                let mut mutations = Vec::new();
                if let Some(new_name) = &req.new_name {
                    mutations.push(Mutation::RenameMetric {
                        metric: metric.to_string(),
                        new_name: new_name.clone(),
                    });
                }
                let handle = req.new_name.as_deref().unwrap_or(metric);
                mutations.extend(req.add_aliases.iter().map(|alias| Mutation::AddMetricAlias {
                    metric: handle.to_string(),
                    alias: alias.clone(),
                }));
                mutations.extend(
                    removals(&req.remove_aliases, handle, req.new_name.as_deref()).map(|alias| {
                        Mutation::RemoveMetricAlias {
                            metric: handle.to_string(),
                            alias: alias.to_string(),
                        }
                    }),
                );
                Plan::Update {
                    org_id: req.metric.org.org_id()?,
                    mutations,
                    target: Some(Target::Metric(metric)),
                }
            }
            Request::DeleteMetric(metric) => Plan::Update {
                org_id: metric.org.org_id()?,
                mutations: vec![Mutation::DeleteMetric {
                    metric: metric.metric_name()?.to_string(),
                }],
                target: None,
            },
            Request::CreateField(req) => Plan::Update {
                org_id: req.field.metric.org.org_id()?,
                mutations: vec![Mutation::CreateField {
                    metric: req.field.metric.metric_name()?.to_string(),
                    name: req.field.field_name()?.to_string(),
                    field_type: req.field_type.ok_or(RegistryError::MissingField("field_type"))?,
                    aliases: req.aliases.clone(),
                }],
                target: None,
            },
            Request::UpdateField(req) => {
                let metric = req.field.metric.metric_name()?;
                let field = req.field.field_name()?;
                let mut mutations = Vec::new();
                if let Some(new_name) = &req.new_name {
                    mutations.push(Mutation::RenameField {
                        metric: metric.to_string(),
                        field: field.to_string(),
                        new_name: new_name.clone(),
                    });
                }
                let handle = req.new_name.as_deref().unwrap_or(field);
                mutations.extend(req.add_aliases.iter().map(|alias| Mutation::AddFieldAlias {
                    metric: metric.to_string(),
                    field: handle.to_string(),
                    alias: alias.clone(),
                }));
                mutations.extend(
                    removals(&req.remove_aliases, handle, req.new_name.as_deref()).map(|alias| {
                        Mutation::RemoveFieldAlias {
                            metric: metric.to_string(),
                            field: handle.to_string(),
                            alias: alias.to_string(),
                        }
                    }),
                );
                Plan::Update {
                    org_id: req.field.metric.org.org_id()?,
                    mutations,
                    target: Some(Target::Field { metric, field }),
                }
            }
            Request::DeleteField(field) => Plan::Update {
                org_id: field.metric.org.org_id()?,
                mutations: vec![Mutation::DeleteField {
                    metric: field.metric.metric_name()?.to_string(),
                    field: field.field_name()?.to_string(),
                }],
                target: None,
            },
        };
        Ok(plan)
    }
}

impl OrgRef {
    /// Addresses `org_id`.
    pub fn new(org_id: impl Into<String>) -> Self {
        Self {
            org_id: Some(org_id.into()),
        }
    }

    fn org_id(&self) -> Result<&str> {
        required(&self.org_id, "org_id")
    }
}

impl MetricRef {
    /// Addresses a metric of `org_id` by name or alias.
    pub fn new(org_id: impl Into<String>, metric_name: impl Into<String>) -> Self {
        Self {
            org: OrgRef::new(org_id),
            metric_name: Some(metric_name.into()),
        }
    }

    fn metric_name(&self) -> Result<&str> {
        required(&self.metric_name, "metric_name")
    }
}

impl FieldRef {
    /// Addresses a field by metric and field name or alias.
    pub fn new(
        org_id: impl Into<String>,
        metric_name: impl Into<String>,
        field_name: impl Into<String>,
    ) -> Self {
        Self {
            metric: MetricRef::new(org_id, metric_name),
            field_name: Some(field_name.into()),
        }
    }

    fn field_name(&self) -> Result<&str> {
        required(&self.field_name, "field_name")
    }
}

/// Alias removals, with the alias used as the lookup handle moved to the end so
/// it stays resolvable for the others. An alias promoted by the rename is
/// already gone and is skipped.
fn removals<'a>(
    aliases: &'a [String],
    handle: &'a str,
    promoted: Option<&'a str>,
) -> impl Iterator<Item = &'a str> {
    let (others, own): (Vec<&str>, Vec<&str>) = aliases
        .iter()
        .map(String::as_str)
        .filter(|alias| Some(*alias) != promoted)
        .partition(|alias| *alias != handle);
    others.into_iter().chain(own)
}

fn required<'a>(value: &'a Option<String>, field: &'static str) -> Result<&'a str> {
    value
        .as_deref()
        .filter(|value| !value.is_empty())
        .ok_or(RegistryError::MissingField(field))
}
