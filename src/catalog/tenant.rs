use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

use super::timestamp;

/// Org-level ingestion metadata handed to event ingestion.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    /// Organization the metadata belongs to.
    pub org_id: String,
    /// Raw JSON keys, in priority order, whose value names the event's metric.
    pub metric_key_aliases: Vec<String>,
    /// Timestamp patterns in the order they are tried.
    pub timestamp_patterns: Vec<String>,
}

impl Tenant {
    pub(crate) fn new(
        org_id: String,
        metric_key_aliases: Vec<String>,
        timestamp_patterns: Vec<String>,
    ) -> Self {
        Self {
            org_id,
            metric_key_aliases,
            timestamp_patterns,
        }
    }

    /// Returns the metric name carried by a raw event object, checking the
    /// metric keys in order and skipping keys whose value is not a string.
    pub fn metric_name_of<'a>(&self, event: &'a Value) -> Option<&'a str> {
        let object = event.as_object()?;
        self.metric_key_aliases
            .iter()
            .find_map(|key| object.get(key).and_then(Value::as_str))
    }

    /// Parses a raw timestamp with the first pattern that accepts it.
    pub fn parse_timestamp(&self, raw: &str) -> Option<OffsetDateTime> {
        timestamp::parse_first(&self.timestamp_patterns, raw)
    }
}
