//! Engine startup: storage preparation, meter provisioning and the
//! handler completeness check, in host lifecycle order.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::config::MeterConfig;
use crate::database::MeterDatabase;
use crate::hooks::HookRegistry;
use crate::models::MeterDescriptor;
use crate::samples;
use crate::service::MeterService;
use crate::store::MeterStore;

/// Bring the engine up and return the wired service.
///
/// Runs at the host's two extension points in order: storage-ready
/// (prepare the collection, provision configured meters) and
/// startup-complete (verify every lifecycle transition has a handler).
/// Any failure here means the host must not begin serving.
pub async fn initialize<D: MeterDatabase>(
    config: &MeterConfig,
    database: Arc<D>,
    hooks: Arc<HookRegistry>,
) -> Result<MeterService<D>> {
    database
        .prepare()
        .await
        .context("failed to prepare meter storage")?;
    info!("✅ Meter storage prepared");

    let store = MeterStore::new(database);

    // Provisioning goes through the store, not the service: handlers are
    // not guaranteed to exist until startup completes, and configured
    // meters are created ungated
    provision_meters(&store, &config.initial_meters).await?;
    if config.add_sample_meters {
        info!("Adding sample meters (development mode)");
        provision_meters(&store, &samples::sample_meters()).await?;
    }

    hooks
        .require_all()
        .context("meter hook registration incomplete")?;
    info!("✅ Meter service initialized");

    Ok(MeterService::new(store, hooks))
}

/// Insert configured meters, tolerating ones that already exist
async fn provision_meters<D: MeterDatabase>(
    store: &MeterStore<D>,
    meters: &[MeterDescriptor],
) -> Result<()> {
    for descriptor in meters {
        match store.insert(descriptor).await {
            Ok(_) => info!("Provisioned meter {}", descriptor.id),
            Err(err) if err.is_duplicate() => {
                debug!("Meter {} already provisioned", descriptor.id);
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to provision meter {}", descriptor.id));
            }
        }
    }
    Ok(())
}
