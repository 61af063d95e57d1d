//! Multi-tenant schema registry.
//!
//! Each organization owns one versioned schema document describing its
//! metrics, their fields and aliases, and the ingestion metadata used to
//! recognise raw events. Documents live in a [`storage::VersionedStore`] and
//! change only through compare-and-swap commits driven by
//! [`registry::StoreManager`].

#![warn(missing_docs)]

pub mod catalog;
pub mod config;
pub mod handler;
pub mod registry;
pub mod storage;
pub mod types;
