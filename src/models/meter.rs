use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::codec::MeterId;

/// Usage totals tracked per meter.
/// `storage` is a gauge overwritten by each report; `operations` is a
/// monotonic counter that only ever increments.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Usage {
    pub storage: i64,
    pub operations: i64,
}

/// Core meter state
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Meter {
    pub id: MeterId,
    /// Party authorized to administer the meter; the only mutable field
    pub controller: String,
    /// Opaque reference to the product the meter was provisioned under
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product: Option<Value>,
    /// Service bound at creation time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_id: Option<String>,
    /// Concurrency token; starts at 0 and increments by one per update
    pub sequence: u64,
    pub usage: Usage,
}

/// Record bookkeeping maintained by the store
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecordMeta {
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

/// The unit of persistence: meter state plus its bookkeeping
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MeterRecord {
    pub meter: Meter,
    pub meta: RecordMeta,
}

/// Input for creating a meter. The store fills in sequence, usage and
/// timestamps; callers supply the identity and creation-only fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MeterDescriptor {
    pub id: MeterId,
    pub controller: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_id: Option<String>,
}

/// Input for updating meter metadata.
///
/// `sequence` is the sequence the caller intends the record to have after
/// the update; the write only applies if the stored record is still at
/// `sequence - 1`. The field set doubles as the update allow-list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MeterUpdate {
    pub id: MeterId,
    pub sequence: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller: Option<String>,
}

/// One usage report: an absolute storage level and an operation count
/// to add to the running total
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct UsageReport {
    pub storage: i64,
    pub operations: i64,
}
