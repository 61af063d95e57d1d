#![allow(missing_docs)]

use std::collections::HashSet;
use std::sync::Arc;

use proptest::prelude::*;
use schemareg::{
    catalog::{Mutation, OrgSchema},
    registry::StoreManager,
    storage::{MemoryStore, VersionedStore},
    types::FieldType,
};

const NAMES: &str = "[a-e]{1,2}";

fn arb_mutation() -> impl Strategy<Value = Mutation> {
    prop_oneof![
        (NAMES, prop::collection::vec(NAMES, 0..3))
            .prop_map(|(name, aliases)| Mutation::CreateMetric { name, aliases }),
        (NAMES, NAMES).prop_map(|(metric, alias)| Mutation::AddMetricAlias { metric, alias }),
        (NAMES, NAMES).prop_map(|(metric, alias)| Mutation::RemoveMetricAlias { metric, alias }),
        (NAMES, NAMES).prop_map(|(metric, new_name)| Mutation::RenameMetric { metric, new_name }),
        NAMES.prop_map(|metric| Mutation::DeleteMetric { metric }),
        (NAMES, NAMES, prop::collection::vec(NAMES, 0..2)).prop_map(|(metric, name, aliases)| {
            Mutation::CreateField {
                metric,
                name,
                field_type: FieldType::Long,
                aliases,
            }
        }),
        (NAMES, NAMES, NAMES)
            .prop_map(|(metric, field, alias)| Mutation::AddFieldAlias { metric, field, alias }),
    ]
}

fn assert_names_unique(schema: &OrgSchema) {
    let mut seen = HashSet::new();
    for metric in schema.metrics() {
        let names = std::iter::once(metric.user_visible_name())
            .chain(metric.aliases().iter().map(String::as_str));
        for name in names {
            assert!(seen.insert(name.to_string()), "'{name}' names two metrics");
        }
        let mut field_names = HashSet::new();
        for field in metric.user_visible_fields() {
            let names = std::iter::once(field.user_field_name())
                .chain(field.aliases().iter().map(String::as_str));
            for name in names {
                assert!(field_names.insert(name.to_string()), "'{name}' names two fields");
            }
        }
    }
}

proptest! {
    #[test]
    fn prop_names_resolve_to_at_most_one_metric(
        batches in prop::collection::vec(prop::collection::vec(arb_mutation(), 1..4), 1..24)
    ) {
        let store = Arc::new(MemoryStore::new());
        let manager = StoreManager::new(store.clone());
        manager.new_org("org").commit().unwrap();

        for batch in batches {
            let before = store.read("org").unwrap().unwrap();
            let result = manager.update_org("org").mutate_all(batch).commit();
            let after = store.read("org").unwrap().unwrap();
            match result {
                Ok(committed) => {
                    prop_assert_eq!(after.version, before.version.next());
                    prop_assert_eq!(committed.version, after.version);
                }
                Err(err) => {
                    prop_assert!(err.is_rejection(), "unexpected error: {}", err);
                    prop_assert_eq!(&after, &before);
                }
            }
            let clerk = manager.clerk("org").unwrap();
            assert_names_unique(clerk.schema());
            clerk.schema().check_invariants().unwrap();
        }
    }

    #[test]
    fn prop_lookup_matches_the_owning_metric(
        names in prop::collection::vec((NAMES, prop::collection::vec(NAMES, 0..3)), 1..8)
    ) {
        let manager = StoreManager::new(Arc::new(MemoryStore::new()));
        manager.new_org("org").commit().unwrap();
        for (name, aliases) in names {
            let _ = manager
                .update_org("org")
                .create_metric_with_aliases(name, aliases)
                .commit();
        }
        let clerk = manager.clerk("org").unwrap();
        for metric in clerk.metrics() {
            for alias in metric.aliases() {
                let resolved = clerk.metric_for_user_name_or_alias(alias).unwrap();
                prop_assert_eq!(resolved.id(), metric.id());
            }
            let resolved = clerk.metric_for_user_name_or_alias(metric.user_visible_name()).unwrap();
            prop_assert_eq!(resolved.id(), metric.id());
        }
    }
}
