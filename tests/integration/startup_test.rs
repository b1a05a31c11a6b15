// Startup Integration Test
// Verifies host lifecycle order: storage preparation, initial and
// sample meter provisioning (hook-free, duplicate-tolerant) and the
// handler completeness check that gates serving.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use meter_registry::error::BoxError;
use meter_registry::{
    samples, startup, HookEvent, HookKind, HookRegistry, MemoryMeterDatabase, MeterConfig,
    MeterDescriptor, MeterHook, MeterId,
};

struct AllowAll;

#[async_trait]
impl MeterHook for AllowAll {
    async fn invoke(&self, _event: HookEvent<'_>) -> std::result::Result<(), BoxError> {
        Ok(())
    }
}

struct CountingHook {
    calls: AtomicUsize,
}

impl CountingHook {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl MeterHook for CountingHook {
    async fn invoke(&self, _event: HookEvent<'_>) -> std::result::Result<(), BoxError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn full_registry() -> Arc<HookRegistry> {
    let mut registry = HookRegistry::new();
    for kind in HookKind::ALL {
        registry.register(kind, Arc::new(AllowAll)).unwrap();
    }
    Arc::new(registry)
}

fn initial_meter(id: u8) -> MeterDescriptor {
    MeterDescriptor {
        id: MeterId::from_bytes([id; 16]),
        controller: "did:key:z6MkrHLYfuzQsqjWeGLijrdJkgMDvbsqGikPJ9H7Gpdr33hk".to_string(),
        product: None,
        service_id: None,
    }
}

#[tokio::test]
async fn test_initialize_provisions_initial_meters() -> Result<()> {
    let config = MeterConfig {
        add_sample_meters: false,
        initial_meters: vec![initial_meter(1), initial_meter(2)],
    };
    let database = Arc::new(MemoryMeterDatabase::new());

    let service = startup::initialize(&config, database.clone(), full_registry()).await?;

    assert_eq!(database.len(), 2);
    let record = service.get(MeterId::from_bytes([1u8; 16])).await?;
    assert_eq!(record.meter.sequence, 0);

    Ok(())
}

#[tokio::test]
async fn test_initialize_tolerates_already_provisioned_meters() -> Result<()> {
    // The same meter listed twice, and a second startup over the same
    // storage: both must come up cleanly
    let config = MeterConfig {
        add_sample_meters: false,
        initial_meters: vec![initial_meter(3), initial_meter(3)],
    };
    let database = Arc::new(MemoryMeterDatabase::new());

    startup::initialize(&config, database.clone(), full_registry()).await?;
    assert_eq!(database.len(), 1);

    startup::initialize(&config, database.clone(), full_registry()).await?;
    assert_eq!(database.len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_initialize_seeds_sample_meters_when_enabled() -> Result<()> {
    let config = MeterConfig {
        add_sample_meters: true,
        initial_meters: vec![initial_meter(4)],
    };
    let database = Arc::new(MemoryMeterDatabase::new());

    let service = startup::initialize(&config, database.clone(), full_registry()).await?;

    let samples = samples::sample_meters();
    assert_eq!(database.len(), 1 + samples.len());
    for sample in &samples {
        let record = service.get(sample.id).await?;
        assert_eq!(record.meter.controller, sample.controller);
    }

    Ok(())
}

#[tokio::test]
async fn test_initialize_skips_samples_by_default() -> Result<()> {
    let config = MeterConfig::default();
    let database = Arc::new(MemoryMeterDatabase::new());

    startup::initialize(&config, database.clone(), full_registry()).await?;
    assert!(database.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_provisioning_bypasses_the_insert_gate() -> Result<()> {
    let insert_hook = CountingHook::new();
    let mut registry = HookRegistry::new();
    registry.register(HookKind::Insert, insert_hook.clone()).unwrap();
    registry.register(HookKind::Remove, Arc::new(AllowAll)).unwrap();
    registry.register(HookKind::Use, Arc::new(AllowAll)).unwrap();

    let config = MeterConfig {
        add_sample_meters: false,
        initial_meters: vec![initial_meter(5)],
    };
    let database = Arc::new(MemoryMeterDatabase::new());

    let service = startup::initialize(&config, database.clone(), Arc::new(registry)).await?;

    // Configured meters were created without consulting the hook; a
    // runtime insert still is
    assert_eq!(insert_hook.calls.load(Ordering::SeqCst), 0);
    service.insert(&initial_meter(6)).await?;
    assert_eq!(insert_hook.calls.load(Ordering::SeqCst), 1);

    Ok(())
}

#[tokio::test]
async fn test_initialize_fails_without_all_handlers() {
    let mut registry = HookRegistry::new();
    registry.register(HookKind::Insert, Arc::new(AllowAll)).unwrap();
    // remove and use stay unset

    let config = MeterConfig::default();
    let database = Arc::new(MemoryMeterDatabase::new());

    let err = startup::initialize(&config, database, Arc::new(registry))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("hook registration incomplete"));
}

#[tokio::test]
async fn test_initialize_fails_on_invalid_initial_meter() {
    let mut bad = initial_meter(7);
    bad.controller = String::new();
    let config = MeterConfig {
        add_sample_meters: false,
        initial_meters: vec![bad],
    };
    let database = Arc::new(MemoryMeterDatabase::new());

    let err = startup::initialize(&config, database, full_registry())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("failed to provision meter"));
}
