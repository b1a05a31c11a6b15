//! Storage boundary for meter records.
//!
//! The engine owns persistence semantics (uniqueness, the sequence
//! compare-and-set, the disjoint usage path) and reaches storage only
//! through [`MeterDatabase`]. Two backends are provided: Postgres for
//! production and an in-memory map for tests and embedded hosts.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::{info, warn};

use crate::codec::MeterId;
use crate::error::DatabaseError;
use crate::models::{MeterRecord, UsageReport};

pub mod memory;
pub mod postgres;

pub use memory::MemoryMeterDatabase;
pub use postgres::PostgresMeterDatabase;

/// Operations the engine needs from a record store.
///
/// Every mutation is a single atomic statement against one record; the
/// engine never issues read-modify-write cycles. Uniqueness of the id is
/// enforced by the backend, not checked beforehand.
#[async_trait]
pub trait MeterDatabase: Send + Sync {
    /// Create the meter collection and its unique id index if missing.
    /// Runs once at the host's storage-ready point; idempotent.
    async fn prepare(&self) -> std::result::Result<(), DatabaseError>;

    /// Persist a new record. A taken id surfaces as
    /// [`DatabaseError::Duplicate`], distinguishable from other failures.
    async fn insert(&self, record: &MeterRecord) -> std::result::Result<(), DatabaseError>;

    /// Exact-match fetch by binary id.
    async fn find(&self, id: MeterId) -> std::result::Result<Option<MeterRecord>, DatabaseError>;

    /// Conditional metadata write: when the stored record is at
    /// `expected_sequence`, set the controller (if given), advance the
    /// sequence by one and stamp `updated`. Returns the matched count;
    /// zero means the record changed concurrently or does not exist.
    async fn update_if_sequence(
        &self,
        id: MeterId,
        expected_sequence: u64,
        controller: Option<&str>,
        updated: DateTime<Utc>,
    ) -> std::result::Result<u64, DatabaseError>;

    /// Usage write: overwrite the storage gauge, add to the operations
    /// counter and stamp `updated`, all in one statement. Returns the
    /// updated record, or `None` when the id matches nothing.
    async fn apply_usage(
        &self,
        id: MeterId,
        report: UsageReport,
        updated: DateTime<Utc>,
    ) -> std::result::Result<Option<MeterRecord>, DatabaseError>;

    /// Delete by id. Returns whether a record was removed.
    async fn delete(&self, id: MeterId) -> std::result::Result<bool, DatabaseError>;

    /// Execution plan of the `find` query, without running it.
    async fn explain_find(&self, id: MeterId) -> std::result::Result<Value, DatabaseError> {
        let _ = id;
        Err(DatabaseError::DiagnosticsUnsupported)
    }

    /// Execution plan of the conditional update, without running it.
    async fn explain_update(
        &self,
        id: MeterId,
        expected_sequence: u64,
    ) -> std::result::Result<Value, DatabaseError> {
        let _ = (id, expected_sequence);
        Err(DatabaseError::DiagnosticsUnsupported)
    }

    /// Execution plan of the delete, without running it.
    async fn explain_delete(&self, id: MeterId) -> std::result::Result<Value, DatabaseError> {
        let _ = id;
        Err(DatabaseError::DiagnosticsUnsupported)
    }
}

/// Build the Postgres connection pool used by the production backend
pub async fn setup_database(database_url: &str) -> Result<PgPool> {
    info!("Connecting to meter database");

    if !database_url.contains("sslmode=") {
        warn!("Database connection does not enforce SSL. Consider adding sslmode=require to connection string");
    }

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(300))
        .test_before_acquire(true)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                sqlx::query("SET timezone = 'UTC'").execute(&mut *conn).await?;
                Ok(())
            })
        })
        .connect(database_url)
        .await?;

    sqlx::query("SELECT 1").execute(&pool).await?;
    info!("Database connection established");

    Ok(pool)
}
