pub mod codec;
pub mod config;
pub mod database;
pub mod error;
pub mod hooks;
pub mod models;
pub mod samples;
pub mod service;
pub mod startup;
pub mod store;

pub use codec::MeterId;
pub use config::MeterConfig;
pub use database::{MemoryMeterDatabase, MeterDatabase, PostgresMeterDatabase};
pub use error::{MeterError, Result};
pub use hooks::{HookEvent, HookKind, HookRegistry, MeterHook};
pub use models::{MeterDescriptor, MeterRecord, MeterUpdate, UsageReport};
pub use service::MeterService;
pub use store::MeterStore;
