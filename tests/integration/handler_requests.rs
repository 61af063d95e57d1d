#![allow(missing_docs)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use schemareg::{
    config::RegistryConfig,
    handler::{
        CreateFieldRequest, CreateMetricRequest, FieldRef, MetricRef, OrgRef, RegistryHandler,
        Request, Response, UpdateFieldRequest, UpdateMetricRequest, UpdateTenantRequest,
    },
    registry::UpdateRetryer,
    storage::{CasOutcome, MemoryStore, StoredDocument, VersionedStore},
    types::{EntityKind, FieldType, RegistryError, Result, SchemaVersion},
};

/// Counts every call reaching the store.
#[derive(Debug, Default)]
struct CountingStore {
    inner: MemoryStore,
    calls: AtomicUsize,
}

impl CountingStore {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl VersionedStore for CountingStore {
    fn read(&self, org_id: &str) -> Result<Option<StoredDocument>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.read(org_id)
    }

    fn write(
        &self,
        org_id: &str,
        document: &[u8],
        expected: Option<SchemaVersion>,
    ) -> Result<CasOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.write(org_id, document, expected)
    }
}

fn counting_handler() -> (Arc<CountingStore>, RegistryHandler) {
    let store = Arc::new(CountingStore::default());
    let handler = RegistryHandler::new(store.clone(), UpdateRetryer::default());
    (store, handler)
}

#[test]
fn requests_missing_fields_never_reach_the_store() {
    let (store, handler) = counting_handler();
    let rejected = [
        (Request::CreateOrg(OrgRef::default()), "org_id"),
        (Request::GetTenant(OrgRef::default()), "org_id"),
        (Request::GetMetrics(OrgRef::new("")), "org_id"),
        (
            Request::CreateMetric(CreateMetricRequest {
                metric: MetricRef {
                    org: OrgRef::new("org1"),
                    metric_name: None,
                },
                aliases: vec!["a".into()],
            }),
            "metric_name",
        ),
        (
            Request::DeleteMetric(MetricRef {
                org: OrgRef::default(),
                metric_name: Some("cpu".into()),
            }),
            "org_id",
        ),
        (
            Request::CreateField(CreateFieldRequest {
                field: FieldRef::new("org1", "cpu", "load"),
                field_type: None,
                aliases: Vec::new(),
            }),
            "field_type",
        ),
        (
            Request::UpdateField(UpdateFieldRequest {
                field: FieldRef {
                    metric: MetricRef::new("org1", "cpu"),
                    field_name: None,
                },
                new_name: Some("x".into()),
                ..Default::default()
            }),
            "field_name",
        ),
    ];
    for (request, missing) in rejected {
        match handler.handle(&request) {
            Err(RegistryError::MissingField(field)) => assert_eq!(field, missing),
            other => panic!("{request:?}: expected MissingField({missing}), got {other:?}"),
        }
    }
    assert_eq!(store.calls(), 0);
}

#[test]
fn full_request_flow() -> Result<()> {
    let (_store, handler) = counting_handler();
    handler.handle(&Request::CreateOrg(OrgRef::new("org1")))?;
    handler.handle(&Request::UpdateTenant(UpdateTenantRequest {
        org: OrgRef::new("org1"),
        metric_keys: Some(vec!["event".into()]),
        timestamp_formats: Some(vec!["rfc3339".into()]),
    }))?;
    handler.handle(&Request::CreateMetric(CreateMetricRequest {
        metric: MetricRef::new("org1", "page_view"),
        aliases: vec!["pv".into()],
    }))?;
    handler.handle(&Request::CreateField(CreateFieldRequest {
        field: FieldRef::new("org1", "pv", "url"),
        field_type: Some(FieldType::String),
        aliases: vec!["u".into()],
    }))?;
    handler.handle(&Request::UpdateMetric(UpdateMetricRequest {
        metric: MetricRef::new("org1", "pv"),
        new_name: Some("page_views".into()),
        add_aliases: vec!["views".into()],
        remove_aliases: vec!["pv".into()],
    }))?;
    handler.handle(&Request::UpdateField(UpdateFieldRequest {
        field: FieldRef::new("org1", "page_views", "u"),
        new_name: Some("href".into()),
        add_aliases: Vec::new(),
        remove_aliases: vec!["u".into()],
    }))?;

    let Response::Metric {
        version, metric, ..
    } = handler.handle(&Request::GetMetric(MetricRef::new("org1", "views")))?
    else {
        panic!("expected metric response");
    };
    assert_eq!(version, SchemaVersion(5));
    assert_eq!(metric.user_visible_name(), "page_views");
    assert_eq!(metric.aliases(), ["views"]);
    let field = &metric.user_visible_fields()[0];
    assert_eq!(field.user_field_name(), "href");
    assert!(field.aliases().is_empty());

    handler.handle(&Request::DeleteField(FieldRef::new("org1", "views", "href")))?;
    handler.handle(&Request::DeleteMetric(MetricRef::new("org1", "views")))?;
    let Response::Metrics { metrics, .. } =
        handler.handle(&Request::GetMetrics(OrgRef::new("org1")))?
    else {
        panic!("expected metrics response");
    };
    assert!(metrics.is_empty());

    assert!(matches!(
        handler.handle(&Request::GetMetric(MetricRef::new("org1", "views"))),
        Err(RegistryError::NotFound {
            kind: EntityKind::Metric,
            ..
        })
    ));
    Ok(())
}

#[test]
fn handler_from_config_uses_configured_store() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let db = dir.path().join("registry.db");
    let config = RegistryConfig::from_toml_str(&format!(
        "retries = 2\n[store]\nbackend = \"sqlite\"\npath = {:?}\n",
        db.display().to_string()
    ))
    .map_err(|err| RegistryError::Configuration(err.to_string()))?;

    let handler = RegistryHandler::from_config(&config)?;
    assert_eq!(handler.retryer().retries(), 2);
    handler.handle_json(r#"{"op":"create_org","org_id":"org1"}"#)?;

    let reopened = RegistryHandler::from_config(&config)?;
    let response = reopened.handle_json(r#"{"op":"get_metrics","org_id":"org1"}"#)?;
    assert!(matches!(response, Response::Metrics { ref metrics, .. } if metrics.is_empty()));
    Ok(())
}

#[test]
fn invalid_mutations_surface_unchanged() -> Result<()> {
    let (_store, handler) = counting_handler();
    handler.handle(&Request::CreateOrg(OrgRef::new("org1")))?;
    handler.handle(&Request::CreateMetric(CreateMetricRequest {
        metric: MetricRef::new("org1", "cpu"),
        aliases: Vec::new(),
    }))?;
    let err = handler
        .handle(&Request::CreateMetric(CreateMetricRequest {
            metric: MetricRef::new("org1", " padded"),
            aliases: Vec::new(),
        }))
        .unwrap_err();
    assert!(matches!(err, RegistryError::InvalidMutation(_)));

    let err = handler
        .handle_json(r#"{"op":"update_tenant","org_id":"org1","timestamp_formats":["[bogus"]}"#)
        .unwrap_err();
    assert!(err.is_rejection(), "unexpected error: {err}");
    Ok(())
}

#[test]
fn empty_updates_of_unknown_entities_are_not_found() -> Result<()> {
    let (store, handler) = counting_handler();
    handler.handle(&Request::CreateOrg(OrgRef::new("org1")))?;
    handler.handle(&Request::CreateMetric(CreateMetricRequest {
        metric: MetricRef::new("org1", "cpu"),
        aliases: Vec::new(),
    }))?;
    let calls_before = store.calls();

    let err = handler
        .handle(&Request::UpdateMetric(UpdateMetricRequest {
            metric: MetricRef::new("org1", "ghost"),
            ..Default::default()
        }))
        .unwrap_err();
    assert!(matches!(
        err,
        RegistryError::NotFound {
            kind: EntityKind::Metric,
            ..
        }
    ));
    let err = handler
        .handle(&Request::UpdateField(UpdateFieldRequest {
            field: FieldRef::new("org1", "ghost", "nofield"),
            ..Default::default()
        }))
        .unwrap_err();
    assert!(matches!(
        err,
        RegistryError::NotFound {
            kind: EntityKind::Metric,
            ..
        }
    ));
    let err = handler
        .handle(&Request::UpdateField(UpdateFieldRequest {
            field: FieldRef::new("org1", "cpu", "nofield"),
            ..Default::default()
        }))
        .unwrap_err();
    assert!(matches!(
        err,
        RegistryError::NotFound {
            kind: EntityKind::Field,
            ..
        }
    ));
    // one read per request, no writes
    assert_eq!(store.calls(), calls_before + 3);

    let response = handler.handle(&Request::UpdateMetric(UpdateMetricRequest {
        metric: MetricRef::new("org1", "cpu"),
        ..Default::default()
    }))?;
    assert_eq!(
        response,
        Response::Committed {
            org_id: "org1".into(),
            version: SchemaVersion(1),
            changed: false,
        }
    );
    Ok(())
}
