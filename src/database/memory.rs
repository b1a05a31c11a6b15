use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::codec::MeterId;
use crate::database::MeterDatabase;
use crate::error::DatabaseError;
use crate::models::{MeterRecord, UsageReport};

/// In-memory backend with the same semantics as the Postgres one.
///
/// Used by the test suite and by hosts embedding the engine without a
/// database. Atomicity of the conditional writes comes from the map's
/// per-entry exclusive guard, which is held across the read and the
/// mutation.
#[derive(Default)]
pub struct MemoryMeterDatabase {
    records: DashMap<MeterId, MeterRecord>,
}

impl MemoryMeterDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl MeterDatabase for MemoryMeterDatabase {
    async fn prepare(&self) -> Result<(), DatabaseError> {
        // The map is its own index; nothing to create
        Ok(())
    }

    async fn insert(&self, record: &MeterRecord) -> Result<(), DatabaseError> {
        match self.records.entry(record.meter.id) {
            Entry::Occupied(_) => Err(DatabaseError::Duplicate),
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(())
            }
        }
    }

    async fn find(&self, id: MeterId) -> Result<Option<MeterRecord>, DatabaseError> {
        Ok(self.records.get(&id).map(|entry| entry.value().clone()))
    }

    async fn update_if_sequence(
        &self,
        id: MeterId,
        expected_sequence: u64,
        controller: Option<&str>,
        updated: DateTime<Utc>,
    ) -> Result<u64, DatabaseError> {
        if let Some(mut entry) = self.records.get_mut(&id) {
            if entry.meter.sequence == expected_sequence {
                if let Some(controller) = controller {
                    entry.meter.controller = controller.to_string();
                }
                entry.meter.sequence = expected_sequence + 1;
                entry.meta.updated = updated;
                return Ok(1);
            }
        }
        Ok(0)
    }

    async fn apply_usage(
        &self,
        id: MeterId,
        report: UsageReport,
        updated: DateTime<Utc>,
    ) -> Result<Option<MeterRecord>, DatabaseError> {
        match self.records.get_mut(&id) {
            Some(mut entry) => {
                entry.meter.usage.storage = report.storage;
                entry.meter.usage.operations =
                    entry.meter.usage.operations.saturating_add(report.operations);
                entry.meta.updated = updated;
                Ok(Some(entry.value().clone()))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, id: MeterId) -> Result<bool, DatabaseError> {
        Ok(self.records.remove(&id).is_some())
    }
}
