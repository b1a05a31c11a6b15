use std::sync::Arc;

use tracing::{debug, info};

use crate::codec::MeterId;
use crate::database::MeterDatabase;
use crate::error::Result;
use crate::hooks::{HookEvent, HookRegistry};
use crate::models::{MeterDescriptor, MeterRecord, MeterUpdate, UsageReport};
use crate::store::MeterStore;

/// Lifecycle orchestrator: the store plus the hook gates.
///
/// Hook placement is fixed and asymmetric. `insert` consults its handler
/// before anything is persisted, so a veto prevents the record from ever
/// existing. `remove` and `use` notify their handlers after the write;
/// the mutation stands even when the handler then fails, and the caller
/// sees the handler's error.
pub struct MeterService<D> {
    store: MeterStore<D>,
    hooks: Arc<HookRegistry>,
}

impl<D> Clone for MeterService<D> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            hooks: self.hooks.clone(),
        }
    }
}

impl<D> std::fmt::Debug for MeterService<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeterService").finish_non_exhaustive()
    }
}

impl<D: MeterDatabase> MeterService<D> {
    pub fn new(store: MeterStore<D>, hooks: Arc<HookRegistry>) -> Self {
        Self { store, hooks }
    }

    /// Create a meter, gated by the `insert` hook
    pub async fn insert(&self, descriptor: &MeterDescriptor) -> Result<MeterRecord> {
        self.hooks
            .invoke(HookEvent::Insert { meter: descriptor })
            .await?;

        let record = self.store.insert(descriptor).await?;
        metrics::counter!("meter_inserted_total").increment(1);
        info!("Created meter {}", record.meter.id);
        Ok(record)
    }

    /// Fetch a meter record. No hook applies to reads.
    pub async fn get(&self, id: MeterId) -> Result<MeterRecord> {
        self.store.get(id).await
    }

    /// Update meter metadata under the sequence check. No hook applies.
    pub async fn update(&self, update: &MeterUpdate) -> Result<()> {
        let result = self.store.update(update).await;
        match &result {
            Ok(()) => {
                info!("Updated meter {} to sequence {}", update.id, update.sequence);
            }
            Err(err) if err.is_concurrent_update() => {
                metrics::counter!("meter_update_conflicts_total").increment(1);
                debug!("Meter {} update to sequence {} conflicted", update.id, update.sequence);
            }
            Err(_) => {}
        }
        result
    }

    /// Delete a meter, then notify the `remove` hook.
    ///
    /// The hook fires whether or not a record was deleted; removal of an
    /// absent meter is idempotent and downstream cleanup keys off the id.
    pub async fn remove(&self, id: MeterId) -> Result<bool> {
        let removed = self.store.remove(id).await?;
        if removed {
            metrics::counter!("meter_removed_total").increment(1);
            info!("Removed meter {}", id);
        }

        self.hooks.invoke(HookEvent::Remove { id }).await?;
        Ok(removed)
    }

    /// Apply a usage report, then notify the `use` hook with the record
    /// carrying the new aggregate totals
    pub async fn report_usage(&self, id: MeterId, report: UsageReport) -> Result<MeterRecord> {
        let record = self.store.report_usage(id, report).await?;
        metrics::counter!("meter_usage_reports_total").increment(1);
        debug!(
            "Meter {} usage now storage={} operations={}",
            id, record.meter.usage.storage, record.meter.usage.operations
        );

        self.hooks.invoke(HookEvent::Use { record: &record }).await?;
        Ok(record)
    }
}
