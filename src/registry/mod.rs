#![forbid(unsafe_code)]

//! Registry write/read API and its optimistic commit protocol.
//!
//! [`StoreManager`] hands out builders that buffer mutations and commit them
//! with a single compare-and-swap; [`StoreClerk`] answers lookups from one
//! consistent snapshot; [`UpdateRetryer`] re-runs whole commits that lost a
//! race to a concurrent writer.
//!
//! ```no_run
//! use std::sync::Arc;
//! use schemareg::registry::{StoreManager, UpdateRetryer};
//! use schemareg::storage::MemoryStore;
//! use schemareg::types::FieldType;
//!
//! # fn main() -> schemareg::types::Result<()> {
//! let manager = StoreManager::new(Arc::new(MemoryStore::new()));
//! manager.new_org("acme").commit()?;
//! let retryer = UpdateRetryer::new(3)?;
//! retryer.run(|| {
//!     manager
//!         .update_org("acme")
//!         .create_metric("page_view")
//!         .create_field("page_view", "url", FieldType::String)
//!         .commit()
//! })?;
//! let clerk = manager.clerk("acme")?;
//! assert_eq!(clerk.metrics().len(), 1);
//! # Ok(())
//! # }
//! ```

mod reader;
mod retry;
mod writer;

/// Read-only snapshot queries.
pub use reader::StoreClerk;

/// Conflict-aware retry driver.
pub use retry::{Attempt, UpdateRetryer};

/// Builders and commit results.
pub use writer::{CommittedSchema, NewOrg, OrgUpdate, StoreManager};
