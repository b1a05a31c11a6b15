// Meter Lifecycle Integration Test
// Exercises the full record lifecycle end to end over the in-memory
// backend: create, read, optimistic-concurrency updates, usage
// reporting and removal, including the concurrent-writer scenarios.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use futures::future::join_all;

use meter_registry::error::BoxError;
use meter_registry::{
    HookEvent, HookKind, HookRegistry, MemoryMeterDatabase, MeterDescriptor, MeterError, MeterHook,
    MeterId, MeterService, MeterStore, MeterUpdate, UsageReport,
};

struct AllowAll;

#[async_trait]
impl MeterHook for AllowAll {
    async fn invoke(&self, _event: HookEvent<'_>) -> std::result::Result<(), BoxError> {
        Ok(())
    }
}

/// Service over a fresh in-memory backend with pass-through handlers
fn setup_service() -> MeterService<MemoryMeterDatabase> {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .try_init();

    let mut registry = HookRegistry::new();
    for kind in HookKind::ALL {
        registry.register(kind, Arc::new(AllowAll)).unwrap();
    }
    registry.require_all().unwrap();

    let store = MeterStore::new(Arc::new(MemoryMeterDatabase::new()));
    MeterService::new(store, Arc::new(registry))
}

fn descriptor() -> MeterDescriptor {
    MeterDescriptor {
        id: MeterId::generate(),
        controller: "did:key:z6MkrHLYfuzQsqjWeGLijrdJkgMDvbsqGikPJ9H7Gpdr33hk".to_string(),
        product: Some(serde_json::json!({
            "id": "urn:uuid:32f526e2-9444-4c39-a8f5-14e09ba6ba55"
        })),
        service_id: Some("urn:uuid:a9f1f0c8-17c7-4c33-b0e0-5fb63258f85a".to_string()),
    }
}

#[tokio::test]
async fn test_full_meter_lifecycle() -> Result<()> {
    let service = setup_service();
    let descriptor = descriptor();

    // Create
    let created = service.insert(&descriptor).await?;
    assert_eq!(created.meter.sequence, 0);
    assert_eq!(created.meter.usage.storage, 0);
    assert_eq!(created.meter.usage.operations, 0);

    // Read back through the encoded id text, as an API client would
    let id: MeterId = created.meter.id.to_string().parse()?;
    let fetched = service.get(id).await?;
    assert_eq!(fetched, created);

    // Update metadata under the sequence check
    service
        .update(&MeterUpdate {
            id,
            sequence: 1,
            controller: Some("did:key:z6MkhNyiHXRyGNsBKWcZjCbrEWC2GYvatYhCWbkrrfcMQByd".to_string()),
        })
        .await?;
    let updated = service.get(id).await?;
    assert_eq!(updated.meter.sequence, 1);
    // A successful write moves `updated` strictly past its previous value
    assert!(updated.meta.updated > fetched.meta.updated);
    assert_eq!(updated.meta.created, fetched.meta.created);
    assert_eq!(updated.meter.product, created.meter.product);
    assert_eq!(updated.meter.service_id, created.meter.service_id);

    // Usage: the gauge is overwritten, the counter accumulates
    service
        .report_usage(
            id,
            UsageReport {
                storage: 100,
                operations: 3,
            },
        )
        .await?;
    let after_usage = service
        .report_usage(
            id,
            UsageReport {
                storage: 100,
                operations: 3,
            },
        )
        .await?;
    assert_eq!(after_usage.meter.usage.storage, 100);
    assert_eq!(after_usage.meter.usage.operations, 6);
    assert!(after_usage.meta.updated > updated.meta.updated);
    // Usage reporting never consumes the concurrency token
    assert_eq!(after_usage.meter.sequence, 1);

    // Remove, then every read-like path reports the record as gone
    assert!(service.remove(id).await?);
    assert!(matches!(service.get(id).await, Err(MeterError::NotFound(_))));
    assert!(matches!(
        service
            .report_usage(id, UsageReport { storage: 1, operations: 1 })
            .await,
        Err(MeterError::NotFound(_))
    ));

    // Removal is idempotent
    assert!(!service.remove(id).await?);

    Ok(())
}

#[tokio::test]
async fn test_competing_updates_one_winner() -> Result<()> {
    let service = setup_service();
    let created = service.insert(&descriptor()).await?;
    let id = created.meter.id;

    // Two clients both read sequence 0 and request sequence 1
    let update_a = MeterUpdate {
        id,
        sequence: 1,
        controller: Some("did:key:first".to_string()),
    };
    let update_b = MeterUpdate {
        id,
        sequence: 1,
        controller: Some("did:key:second".to_string()),
    };
    let (first, second) = futures::join!(service.update(&update_a), service.update(&update_b));

    let winners = [&first, &second].iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1, "exactly one competing update may win");
    let loser = if first.is_err() { first } else { second };
    assert!(matches!(
        loser,
        Err(MeterError::ConcurrentUpdate { sequence: 1, .. })
    ));

    // The loser recovers by re-reading and retrying against the new state
    let current = service.get(id).await?;
    assert_eq!(current.meter.sequence, 1);
    service
        .update(&MeterUpdate {
            id,
            sequence: current.meter.sequence + 1,
            controller: Some("did:key:retried".to_string()),
        })
        .await?;

    let settled = service.get(id).await?;
    assert_eq!(settled.meter.sequence, 2);
    assert_eq!(settled.meter.controller, "did:key:retried");

    Ok(())
}

#[tokio::test]
async fn test_concurrent_usage_reports_accumulate_exactly() -> Result<()> {
    let service = setup_service();
    let created = service.insert(&descriptor()).await?;
    let id = created.meter.id;

    let reports = (0..10).map(|_| {
        let service = service.clone();
        async move {
            service
                .report_usage(
                    id,
                    UsageReport {
                        storage: 512,
                        operations: 1,
                    },
                )
                .await
        }
    });
    for result in join_all(reports).await {
        result?;
    }

    let record = service.get(id).await?;
    assert_eq!(record.meter.usage.operations, 10);
    assert_eq!(record.meter.usage.storage, 512);

    Ok(())
}

#[tokio::test]
async fn test_concurrent_inserts_single_success() -> Result<()> {
    let service = setup_service();
    let descriptor = descriptor();

    let attempts = (0..4).map(|_| {
        let service = service.clone();
        let descriptor = descriptor.clone();
        async move { service.insert(&descriptor).await }
    });
    let results = join_all(attempts).await;

    let successes = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1, "the unique id constraint admits one insert");
    for result in results {
        if let Err(err) = result {
            assert!(matches!(err, MeterError::Duplicate(id) if id == descriptor.id));
        }
    }

    Ok(())
}

#[tokio::test]
async fn test_update_of_removed_meter_reports_conflict() -> Result<()> {
    let service = setup_service();
    let created = service.insert(&descriptor()).await?;
    let id = created.meter.id;

    service.remove(id).await?;

    // The sequence check cannot tell "gone" from "changed underneath me"
    let err = service
        .update(&MeterUpdate {
            id,
            sequence: 1,
            controller: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, MeterError::ConcurrentUpdate { .. }));

    Ok(())
}

#[tokio::test]
async fn test_malformed_id_text_is_rejected_up_front() {
    let short = "z123".parse::<MeterId>();
    assert!(short.is_err());

    let wrong_prefix = format!("f{}", "1".repeat(22)).parse::<MeterId>();
    assert!(wrong_prefix.is_err());

    let overflow = format!("z{}", "z".repeat(22)).parse::<MeterId>();
    assert!(overflow.is_err());
}
