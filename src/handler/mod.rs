#![forbid(unsafe_code)]

//! Request handlers sitting in front of the registry.
//!
//! A [`Request`] is validated before the store is touched: a missing required
//! field fails with [`MissingField`](crate::types::RegistryError::MissingField)
//! and performs no I/O.
//! Writes run through the handler's [`UpdateRetryer`]; reads open a fresh
//! [`StoreClerk`](crate::registry::StoreClerk) per request.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::catalog::{MetricSchema, Tenant};
use crate::config::RegistryConfig;
use crate::registry::{CommittedSchema, StoreManager, UpdateRetryer};
use crate::storage::VersionedStore;
use crate::types::{Result, SchemaVersion};

mod request;

pub use request::{
    CreateFieldRequest, CreateMetricRequest, FieldRef, MetricRef, OrgRef, Request,
    UpdateFieldRequest, UpdateMetricRequest, UpdateTenantRequest,
};

use request::{Plan, Target};

/// Outcome of a handled request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Response {
    /// A write went through (or was a no-op when `changed` is false).
    Committed {
        /// Organization written.
        org_id: String,
        /// Version stored after the request.
        version: SchemaVersion,
        /// `false` when nothing was written.
        changed: bool,
    },
    /// Every metric of an organization.
    Metrics {
        /// Organization read.
        org_id: String,
        /// Version of the snapshot.
        version: SchemaVersion,
        /// Metrics in creation order.
        metrics: Vec<MetricSchema>,
    },
    /// One metric resolved by name or alias.
    Metric {
        /// Organization read.
        org_id: String,
        /// Version of the snapshot.
        version: SchemaVersion,
        /// The resolved metric.
        metric: MetricSchema,
    },
    /// Ingestion metadata.
    Tenant(Tenant),
}

impl From<CommittedSchema> for Response {
    fn from(committed: CommittedSchema) -> Self {
        Response::Committed {
            org_id: committed.org_id,
            version: committed.version,
            changed: committed.changed,
        }
    }
}

/// Dispatches [`Request`]s to the registry.
#[derive(Clone, Debug)]
pub struct RegistryHandler {
    manager: StoreManager,
    retryer: UpdateRetryer,
}

impl RegistryHandler {
    /// Serves requests against `store`, retrying conflicted writes with `retryer`.
    pub fn new(store: Arc<dyn VersionedStore>, retryer: UpdateRetryer) -> Self {
        Self {
            manager: StoreManager::new(store),
            retryer,
        }
    }

    /// Opens the configured store and retryer.
    pub fn from_config(config: &RegistryConfig) -> Result<Self> {
        Ok(Self::new(config.open_store()?, config.retryer()?))
    }

    /// Writer behind the handler.
    pub fn manager(&self) -> &StoreManager {
        &self.manager
    }

    /// Retry policy for writes.
    pub fn retryer(&self) -> &UpdateRetryer {
        &self.retryer
    }

    /// Handles one request.
    pub fn handle(&self, request: &Request) -> Result<Response> {
        let op = request.op();
        let plan = request.plan().inspect_err(|err| {
            debug!(op, error = %err, "handler.request.rejected");
        })?;
        debug!(op, "handler.request");
        match plan {
            Plan::CreateOrg(org_id) => {
                let committed = self.manager.new_org(org_id).commit()?;
                info!(org_id, "handler.org.created");
                Ok(committed.into())
            }
            Plan::Update {
                org_id,
                mutations,
                target,
            } => {
                if mutations.is_empty() {
                    return self.unchanged(org_id, target);
                }
                let committed = self.retryer.run(|| {
                    self.manager
                        .update_org(org_id)
                        .mutate_all(mutations.iter().cloned())
                        .commit()
                })?;
                if committed.changed {
                    info!(org_id, op, version = committed.version.0, "handler.org.updated");
                }
                Ok(committed.into())
            }
            Plan::GetMetrics(org_id) => {
                let clerk = self.manager.clerk(org_id)?;
                Ok(Response::Metrics {
                    org_id: clerk.org_id().to_string(),
                    version: clerk.version(),
                    metrics: clerk.metrics().to_vec(),
                })
            }
            Plan::GetMetric { org_id, metric } => {
                let clerk = self.manager.clerk(org_id)?;
                let metric = clerk.metric_for_user_name_or_alias(metric)?.clone();
                Ok(Response::Metric {
                    org_id: clerk.org_id().to_string(),
                    version: clerk.version(),
                    metric,
                })
            }
            Plan::GetTenant(org_id) => Ok(Response::Tenant(self.manager.clerk(org_id)?.tenant())),
        }
    }

    /// Answers an update that carries no changes. The addressed metric or
    /// field must still exist.
    fn unchanged(&self, org_id: &str, target: Option<Target<'_>>) -> Result<Response> {
        let clerk = self.manager.clerk(org_id)?;
        match target {
            Some(Target::Metric(metric)) => {
                clerk.metric_for_user_name_or_alias(metric)?;
            }
            Some(Target::Field { metric, field }) => {
                clerk.field_for_user_name_or_alias(metric, field)?;
            }
            None => {}
        }
        Ok(Response::Committed {
            org_id: clerk.org_id().to_string(),
            version: clerk.version(),
            changed: false,
        })
    }

    /// Parses a JSON request body and handles it.
    pub fn handle_json(&self, body: &str) -> Result<Response> {
        let request: Request = serde_json::from_str(body)?;
        self.handle(&request)
    }
}
