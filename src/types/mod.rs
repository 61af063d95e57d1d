#![forbid(unsafe_code)]

//! Identifiers, primitive enums and the crate-wide error type.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

mod error;

pub use error::{RegistryError, Result};

/// Canonical identifier of a metric, assigned at creation and never reused.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricId(pub u32);

/// Canonical identifier of a field, unique within its metric and never reused.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldId(pub u32);

/// Per-organization compare-and-swap token.
#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SchemaVersion(pub u64);

impl SchemaVersion {
    /// Version assigned to a freshly created organization.
    pub const INITIAL: SchemaVersion = SchemaVersion(0);

    /// Returns the version a successful commit against `self` produces.
    pub const fn next(self) -> Self {
        SchemaVersion(self.0 + 1)
    }
}

impl fmt::Display for MetricId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for SchemaVersion {
    fn from(value: u64) -> Self {
        SchemaVersion(value)
    }
}

impl From<SchemaVersion> for u64 {
    fn from(value: SchemaVersion) -> Self {
        value.0
    }
}

/// Kind of registry entity named in `NotFound`/`AlreadyExists` errors.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum EntityKind {
    /// A tenant organization.
    Org,
    /// A metric within an organization.
    Metric,
    /// A field within a metric.
    Field,
    /// An alias attached to a metric or field.
    Alias,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Org => "org",
            EntityKind::Metric => "metric",
            EntityKind::Field => "field",
            EntityKind::Alias => "alias",
        };
        f.write_str(name)
    }
}

/// Primitive type carried by a metric field.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldType {
    /// UTF-8 string.
    String,
    /// Signed 64-bit integer.
    Long,
    /// 64-bit float.
    Double,
    /// Boolean flag.
    Boolean,
    /// Point in time.
    Timestamp,
}

impl FieldType {
    /// Wire name of the type.
    pub const fn as_str(self) -> &'static str {
        match self {
            FieldType::String => "STRING",
            FieldType::Long => "LONG",
            FieldType::Double => "DOUBLE",
            FieldType::Boolean => "BOOLEAN",
            FieldType::Timestamp => "TIMESTAMP",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "STRING" => Ok(FieldType::String),
            "LONG" => Ok(FieldType::Long),
            "DOUBLE" => Ok(FieldType::Double),
            "BOOLEAN" => Ok(FieldType::Boolean),
            "TIMESTAMP" => Ok(FieldType::Timestamp),
            other => Err(RegistryError::InvalidMutation(format!(
                "unknown field type '{other}'"
            ))),
        }
    }
}
