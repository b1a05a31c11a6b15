use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use crate::codec::MeterId;
use crate::database::MeterDatabase;
use crate::error::{DatabaseError, MeterError, Result};
use crate::models::{Meter, MeterDescriptor, MeterRecord, MeterUpdate, RecordMeta, Usage, UsageReport};

/// Persistence semantics for meter records.
///
/// The store validates inputs, builds full records out of descriptors and
/// classifies backend outcomes into the crate error taxonomy. It never
/// invokes hooks; gating is the orchestrator's job, which also lets
/// startup provisioning insert records before any handler exists.
pub struct MeterStore<D> {
    database: Arc<D>,
}

impl<D> Clone for MeterStore<D> {
    fn clone(&self) -> Self {
        Self {
            database: self.database.clone(),
        }
    }
}

impl<D: MeterDatabase> MeterStore<D> {
    pub fn new(database: Arc<D>) -> Self {
        Self { database }
    }

    pub fn database(&self) -> &Arc<D> {
        &self.database
    }

    /// Create a new meter record.
    ///
    /// The descriptor supplies identity and creation-only fields; the
    /// store fills in `sequence = 0`, zeroed usage and the timestamps.
    /// Uniqueness is enforced by the backend constraint, not a pre-check,
    /// so racing inserts of one id yield exactly one success.
    pub async fn insert(&self, descriptor: &MeterDescriptor) -> Result<MeterRecord> {
        if descriptor.controller.is_empty() {
            return Err(MeterError::InvalidArgument(
                "controller must be a non-empty string".to_string(),
            ));
        }

        let now = Utc::now();
        let record = MeterRecord {
            meter: Meter {
                id: descriptor.id,
                controller: descriptor.controller.clone(),
                product: descriptor.product.clone(),
                service_id: descriptor.service_id.clone(),
                sequence: 0,
                usage: Usage::default(),
            },
            meta: RecordMeta {
                created: now,
                updated: now,
            },
        };

        self.database.insert(&record).await.map_err(|err| match err {
            DatabaseError::Duplicate => MeterError::Duplicate(descriptor.id),
            other => MeterError::Database(other),
        })?;

        debug!("Inserted meter {} at sequence 0", descriptor.id);
        Ok(record)
    }

    /// Fetch a record by id
    pub async fn get(&self, id: MeterId) -> Result<MeterRecord> {
        self.database
            .find(id)
            .await?
            .ok_or(MeterError::NotFound(id))
    }

    /// Apply a metadata update under optimistic concurrency control.
    ///
    /// `update.sequence` is the sequence the record should have after the
    /// write; it only applies when the stored record is still at
    /// `update.sequence - 1`. A zero match is reported as
    /// [`MeterError::ConcurrentUpdate`], which deliberately does not
    /// distinguish a lost race from a record that never existed.
    pub async fn update(&self, update: &MeterUpdate) -> Result<()> {
        let expected = update.sequence.checked_sub(1).ok_or_else(|| {
            MeterError::InvalidArgument("update sequence must be 1 or greater".to_string())
        })?;
        if let Some(controller) = &update.controller {
            if controller.is_empty() {
                return Err(MeterError::InvalidArgument(
                    "controller must be a non-empty string".to_string(),
                ));
            }
        }

        let matched = self
            .database
            .update_if_sequence(update.id, expected, update.controller.as_deref(), Utc::now())
            .await?;
        if matched == 0 {
            return Err(MeterError::ConcurrentUpdate {
                id: update.id,
                sequence: update.sequence,
            });
        }

        debug!("Updated meter {} to sequence {}", update.id, update.sequence);
        Ok(())
    }

    /// Delete a record. Removing an absent record is not an error; the
    /// returned flag says whether anything was deleted.
    pub async fn remove(&self, id: MeterId) -> Result<bool> {
        let removed = self.database.delete(id).await?;
        debug!("Removed meter {} (existed: {})", id, removed);
        Ok(removed)
    }

    /// Record a usage report: the storage gauge is overwritten, the
    /// operations counter is incremented, and no sequence check applies.
    /// Returns the updated record carrying the new aggregate totals.
    pub async fn report_usage(&self, id: MeterId, report: UsageReport) -> Result<MeterRecord> {
        if report.storage < 0 || report.operations < 0 {
            return Err(MeterError::InvalidArgument(
                "usage values must be non-negative".to_string(),
            ));
        }

        self.database
            .apply_usage(id, report, Utc::now())
            .await?
            .ok_or(MeterError::NotFound(id))
    }
}
