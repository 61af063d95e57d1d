#![allow(missing_docs)]

use std::fmt;
use std::sync::{Arc, Barrier};
use std::thread;

use parking_lot::Mutex;
use schemareg::{
    registry::{StoreManager, UpdateRetryer},
    storage::{CasOutcome, MemoryStore, StoredDocument, VersionedStore},
    types::{EntityKind, RegistryError, Result, SchemaVersion},
};

type Race = Box<dyn FnOnce(&StoreManager) -> Result<()> + Send>;

/// Store that lets a competing writer commit between a builder's read and its
/// compare-and-swap, exactly once.
struct RacingStore {
    inner: MemoryStore,
    race: Mutex<Option<Race>>,
    writes: Mutex<u32>,
}

impl RacingStore {
    fn new(inner: MemoryStore, race: Race) -> Self {
        Self {
            inner,
            race: Mutex::new(Some(race)),
            writes: Mutex::new(0),
        }
    }

    fn writes(&self) -> u32 {
        *self.writes.lock()
    }
}

impl fmt::Debug for RacingStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RacingStore")
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

impl VersionedStore for RacingStore {
    fn read(&self, org_id: &str) -> Result<Option<StoredDocument>> {
        self.inner.read(org_id)
    }

    fn write(
        &self,
        org_id: &str,
        document: &[u8],
        expected: Option<SchemaVersion>,
    ) -> Result<CasOutcome> {
        *self.writes.lock() += 1;
        if expected.is_some() {
            let race = self.race.lock().take();
            if let Some(race) = race {
                race(&StoreManager::new(Arc::new(self.inner.clone())))?;
            }
        }
        self.inner.write(org_id, document, expected)
    }
}

fn seeded_store() -> Result<MemoryStore> {
    let store = MemoryStore::new();
    StoreManager::new(Arc::new(store.clone()))
        .new_org("org1")
        .commit()?;
    Ok(store)
}

fn racing_manager(inner: MemoryStore) -> (Arc<RacingStore>, StoreManager) {
    let racing = Arc::new(RacingStore::new(
        inner,
        Box::new(|rival: &StoreManager| {
            rival.update_org("org1").create_metric("rival").commit()?;
            Ok(())
        }),
    ));
    let manager = StoreManager::new(racing.clone());
    (racing, manager)
}

#[test]
fn same_base_writes_have_one_winner() -> Result<()> {
    let store = seeded_store()?;
    let base = store.read("org1")?.expect("org stored");
    let first = store.write("org1", &base.bytes, Some(base.version))?;
    let second = store.write("org1", &base.bytes, Some(base.version))?;
    assert_eq!(first, CasOutcome::Committed(SchemaVersion(1)));
    assert_eq!(
        second,
        CasOutcome::Conflict {
            actual: Some(SchemaVersion(1))
        }
    );
    Ok(())
}

#[test]
fn losing_commit_reports_conflict_and_stores_nothing() -> Result<()> {
    let inner = seeded_store()?;
    let (_racing, manager) = racing_manager(inner.clone());

    let err = manager
        .update_org("org1")
        .create_metric("mine")
        .commit()
        .unwrap_err();
    assert!(err.is_conflict(), "unexpected error: {err}");

    let clerk = StoreManager::new(Arc::new(inner)).clerk("org1")?;
    let names: Vec<_> = clerk.metrics().iter().map(|m| m.user_visible_name()).collect();
    assert_eq!(names, ["rival"]);
    assert_eq!(clerk.version(), SchemaVersion(1));
    Ok(())
}

#[test]
fn retry_observes_the_winning_commit() -> Result<()> {
    let inner = seeded_store()?;
    let (racing, manager) = racing_manager(inner);
    let retryer = UpdateRetryer::new(2)?;

    let committed = retryer.run(|| manager.update_org("org1").create_metric("mine").commit())?;
    assert_eq!(committed.version, SchemaVersion(2));
    let names: Vec<_> = committed
        .schema
        .metrics()
        .iter()
        .map(|m| m.user_visible_name())
        .collect();
    assert_eq!(names, ["rival", "mine"]);
    assert_eq!(racing.writes(), 2);
    Ok(())
}

#[test]
fn retry_rejects_when_the_winner_took_the_name() -> Result<()> {
    let inner = seeded_store()?;
    let (racing, manager) = racing_manager(inner);
    let retryer = UpdateRetryer::new(5)?;

    let err = retryer
        .run(|| manager.update_org("org1").create_metric("rival").commit())
        .unwrap_err();
    assert!(matches!(
        err,
        RegistryError::AlreadyExists {
            kind: EntityKind::Metric,
            ..
        }
    ));
    assert_eq!(racing.writes(), 1);
    Ok(())
}

#[test]
fn single_attempt_surfaces_the_conflict() -> Result<()> {
    let inner = seeded_store()?;
    let (racing, manager) = racing_manager(inner);
    let retryer = UpdateRetryer::new(1)?;

    let err = retryer
        .run(|| manager.update_org("org1").create_metric("mine").commit())
        .unwrap_err();
    assert!(matches!(err, RegistryError::Conflict { .. }));
    assert_eq!(racing.writes(), 1);
    Ok(())
}

#[test]
fn concurrent_writers_all_land_with_retries() -> Result<()> {
    const WRITERS: usize = 8;
    let store = seeded_store()?;
    let manager = StoreManager::new(Arc::new(store));
    let barrier = Arc::new(Barrier::new(WRITERS));

    let handles: Vec<_> = (0..WRITERS)
        .map(|i| {
            let manager = manager.clone();
            let barrier = barrier.clone();
            thread::spawn(move || -> Result<SchemaVersion> {
                let retryer = UpdateRetryer::new(WRITERS as u32 * 4)?;
                barrier.wait();
                let committed = retryer.run(|| {
                    manager
                        .update_org("org1")
                        .create_metric(format!("metric_{i}"))
                        .commit()
                })?;
                Ok(committed.version)
            })
        })
        .collect();

    let mut versions = Vec::new();
    for handle in handles {
        versions.push(handle.join().expect("writer thread panicked")?);
    }
    versions.sort();
    versions.dedup();
    assert_eq!(versions.len(), WRITERS, "every commit got its own version");

    let clerk = manager.clerk("org1")?;
    assert_eq!(clerk.metrics().len(), WRITERS);
    assert_eq!(clerk.version(), SchemaVersion(WRITERS as u64));
    Ok(())
}

#[test]
fn concurrent_org_creation_has_one_winner() -> Result<()> {
    const CREATORS: usize = 6;
    let manager = StoreManager::new(Arc::new(MemoryStore::new()));
    let barrier = Arc::new(Barrier::new(CREATORS));

    let handles: Vec<_> = (0..CREATORS)
        .map(|_| {
            let manager = manager.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                manager.new_org("org1").commit()
            })
        })
        .collect();

    let mut created = 0;
    for handle in handles {
        match handle.join().expect("creator thread panicked") {
            Ok(committed) => {
                assert_eq!(committed.version, SchemaVersion::INITIAL);
                created += 1;
            }
            Err(RegistryError::AlreadyExists {
                kind: EntityKind::Org,
                ..
            }) => {}
            Err(other) => return Err(other),
        }
    }
    assert_eq!(created, 1);
    Ok(())
}
