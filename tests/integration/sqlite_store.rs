#![allow(missing_docs)]

use std::path::Path;
use std::sync::{Arc, Barrier};
use std::thread;

use schemareg::{
    registry::{StoreManager, UpdateRetryer},
    storage::{CasOutcome, SqliteStore, SqliteStoreOptions, VersionedStore},
    types::{FieldType, Result, SchemaVersion},
};

fn open(path: &Path) -> Result<Arc<SqliteStore>> {
    Ok(Arc::new(SqliteStore::open(path, SqliteStoreOptions::default())?))
}

#[test]
fn documents_survive_reopen() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("registry.db");
    {
        let manager = StoreManager::new(open(&path)?);
        manager.new_org("org1").commit()?;
        manager
            .update_org("org1")
            .create_metric_with_aliases("page_view", ["pv"])
            .create_field("page_view", "url", FieldType::String)
            .commit()?;
    }

    let manager = StoreManager::new(open(&path)?);
    let clerk = manager.clerk("org1")?;
    assert_eq!(clerk.version(), SchemaVersion(1));
    let field = clerk.field_for_user_name_or_alias("pv", "url")?;
    assert_eq!(field.field_type(), FieldType::String);
    Ok(())
}

#[test]
fn two_handles_on_one_file_see_each_others_commits() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("shared.db");
    let first = StoreManager::new(open(&path)?);
    let second = StoreManager::new(open(&path)?);

    first.new_org("org1").commit()?;
    second.update_org("org1").create_metric("cpu").commit()?;
    first.update_org("org1").create_metric("mem").commit()?;

    let clerk = second.clerk("org1")?;
    assert_eq!(clerk.metrics().len(), 2);
    assert_eq!(clerk.version(), SchemaVersion(2));
    Ok(())
}

#[test]
fn stale_version_conflicts_across_handles() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("cas.db");
    let a = open(&path)?;
    let b = open(&path)?;

    assert!(a.write("org1", b"{}", None)?.is_committed());
    assert_eq!(
        b.write("org1", b"{}", None)?,
        CasOutcome::Conflict {
            actual: Some(SchemaVersion::INITIAL)
        }
    );
    assert_eq!(
        b.write("org1", b"v1", Some(SchemaVersion::INITIAL))?,
        CasOutcome::Committed(SchemaVersion(1))
    );
    assert_eq!(
        a.write("org1", b"stale", Some(SchemaVersion::INITIAL))?,
        CasOutcome::Conflict {
            actual: Some(SchemaVersion(1))
        }
    );
    let stored = a.read("org1")?.expect("document stored");
    assert_eq!(stored.bytes, b"v1");
    Ok(())
}

#[test]
fn threads_with_separate_connections_converge() -> Result<()> {
    const WRITERS: usize = 4;
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("threads.db");
    StoreManager::new(open(&path)?).new_org("org1").commit()?;
    let barrier = Arc::new(Barrier::new(WRITERS));

    let handles: Vec<_> = (0..WRITERS)
        .map(|i| {
            let path = path.clone();
            let barrier = barrier.clone();
            thread::spawn(move || -> Result<()> {
                let manager = StoreManager::new(open(&path)?);
                let retryer = UpdateRetryer::new(WRITERS as u32 * 4)?;
                barrier.wait();
                retryer.run(|| {
                    manager
                        .update_org("org1")
                        .create_metric(format!("metric_{i}"))
                        .commit()
                })?;
                Ok(())
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("writer thread panicked")?;
    }

    let clerk = StoreManager::new(open(&path)?).clerk("org1")?;
    assert_eq!(clerk.metrics().len(), WRITERS);
    assert_eq!(clerk.version(), SchemaVersion(WRITERS as u64));
    Ok(())
}

#[test]
fn custom_table_names_are_isolated() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("tables.db");
    let left = SqliteStore::open(
        &path,
        SqliteStoreOptions {
            table: "left_registry".into(),
            ..SqliteStoreOptions::default()
        },
    )?;
    let right = SqliteStore::open(
        &path,
        SqliteStoreOptions {
            table: "right_registry".into(),
            ..SqliteStoreOptions::default()
        },
    )?;
    left.write("org1", b"{}", None)?;
    assert!(right.read("org1")?.is_none());
    assert_eq!(left.table(), "left_registry");
    Ok(())
}
