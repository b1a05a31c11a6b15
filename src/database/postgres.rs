use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use tracing::{debug, info};

use crate::codec::MeterId;
use crate::database::MeterDatabase;
use crate::error::DatabaseError;
use crate::models::{Meter, MeterRecord, RecordMeta, Usage, UsageReport};

/// Column list shared by every query that reads records back
const COLUMNS: &str =
    "id, controller, product, service_id, sequence, storage_usage, operations_usage, created, updated";

/// Production backend: one `meters` table, keyed by the binary id.
/// The primary key doubles as the unique identifier index.
#[derive(Clone)]
pub struct PostgresMeterDatabase {
    pool: PgPool,
}

impl PostgresMeterDatabase {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect with the pool settings used across the service
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = crate::database::setup_database(database_url).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn explain(&self, sql: String) -> Result<Value, DatabaseError> {
        // EXPLAIN is a utility statement and cannot carry bind parameters,
        // so the key values are inlined as typed literals
        let plan: Value = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(plan)
    }
}

fn id_literal(id: MeterId) -> String {
    let hex: String = id.as_bytes().iter().map(|b| format!("{b:02x}")).collect();
    format!("'\\x{hex}'::bytea")
}

fn classify_insert(err: sqlx::Error) -> DatabaseError {
    if let sqlx::Error::Database(ref db_err) = err {
        if db_err.is_unique_violation() {
            return DatabaseError::Duplicate;
        }
    }
    DatabaseError::Sqlx(err)
}

/// Flat row shape of the `meters` table
#[derive(sqlx::FromRow)]
struct MeterRow {
    id: Vec<u8>,
    controller: String,
    product: Option<Value>,
    service_id: Option<String>,
    sequence: i64,
    storage_usage: i64,
    operations_usage: i64,
    created: DateTime<Utc>,
    updated: DateTime<Utc>,
}

impl MeterRow {
    fn into_record(self) -> Result<MeterRecord, DatabaseError> {
        let id = MeterId::try_from_slice(&self.id)
            .map_err(|e| DatabaseError::Corrupt(format!("bad id key: {e}")))?;
        let sequence = u64::try_from(self.sequence)
            .map_err(|_| DatabaseError::Corrupt(format!("negative sequence {}", self.sequence)))?;
        Ok(MeterRecord {
            meter: Meter {
                id,
                controller: self.controller,
                product: self.product,
                service_id: self.service_id,
                sequence,
                usage: Usage {
                    storage: self.storage_usage,
                    operations: self.operations_usage,
                },
            },
            meta: RecordMeta {
                created: self.created,
                updated: self.updated,
            },
        })
    }
}

#[async_trait]
impl MeterDatabase for PostgresMeterDatabase {
    async fn prepare(&self) -> Result<(), DatabaseError> {
        info!("Running meter database migrations");
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Meter database migrations completed");
        Ok(())
    }

    async fn insert(&self, record: &MeterRecord) -> Result<(), DatabaseError> {
        let sequence = i64::try_from(record.meter.sequence).map_err(|_| {
            DatabaseError::Corrupt(format!(
                "sequence {} exceeds storage range",
                record.meter.sequence
            ))
        })?;

        sqlx::query(
            r#"
            INSERT INTO meters (id, controller, product, service_id, sequence,
                                storage_usage, operations_usage, created, updated)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(record.meter.id.as_bytes().as_slice())
        .bind(&record.meter.controller)
        .bind(record.meter.product.as_ref())
        .bind(record.meter.service_id.as_ref())
        .bind(sequence)
        .bind(record.meter.usage.storage)
        .bind(record.meter.usage.operations)
        .bind(record.meta.created)
        .bind(record.meta.updated)
        .execute(&self.pool)
        .await
        .map_err(classify_insert)?;

        Ok(())
    }

    async fn find(&self, id: MeterId) -> Result<Option<MeterRecord>, DatabaseError> {
        let row = sqlx::query_as::<_, MeterRow>(&format!(
            "SELECT {COLUMNS} FROM meters WHERE id = $1"
        ))
        .bind(id.as_bytes().as_slice())
        .fetch_optional(&self.pool)
        .await?;

        row.map(MeterRow::into_record).transpose()
    }

    async fn update_if_sequence(
        &self,
        id: MeterId,
        expected_sequence: u64,
        controller: Option<&str>,
        updated: DateTime<Utc>,
    ) -> Result<u64, DatabaseError> {
        // Sequences beyond i64 cannot exist in storage, so nothing can match
        let Ok(expected) = i64::try_from(expected_sequence) else {
            return Ok(0);
        };

        let result = sqlx::query(
            r#"
            UPDATE meters
            SET controller = COALESCE($3, controller),
                sequence = sequence + 1,
                updated = $4
            WHERE id = $1 AND sequence = $2
            "#,
        )
        .bind(id.as_bytes().as_slice())
        .bind(expected)
        .bind(controller)
        .bind(updated)
        .execute(&self.pool)
        .await?;

        debug!(
            "Conditional meter update matched {} record(s)",
            result.rows_affected()
        );
        Ok(result.rows_affected())
    }

    async fn apply_usage(
        &self,
        id: MeterId,
        report: UsageReport,
        updated: DateTime<Utc>,
    ) -> Result<Option<MeterRecord>, DatabaseError> {
        let row = sqlx::query_as::<_, MeterRow>(&format!(
            r#"
            UPDATE meters
            SET storage_usage = $2,
                operations_usage = operations_usage + $3,
                updated = $4
            WHERE id = $1
            RETURNING {COLUMNS}
            "#
        ))
        .bind(id.as_bytes().as_slice())
        .bind(report.storage)
        .bind(report.operations)
        .bind(updated)
        .fetch_optional(&self.pool)
        .await?;

        row.map(MeterRow::into_record).transpose()
    }

    async fn delete(&self, id: MeterId) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM meters WHERE id = $1")
            .bind(id.as_bytes().as_slice())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn explain_find(&self, id: MeterId) -> Result<Value, DatabaseError> {
        self.explain(format!(
            "EXPLAIN (FORMAT JSON) SELECT {COLUMNS} FROM meters WHERE id = {}",
            id_literal(id)
        ))
        .await
    }

    async fn explain_update(
        &self,
        id: MeterId,
        expected_sequence: u64,
    ) -> Result<Value, DatabaseError> {
        self.explain(format!(
            "EXPLAIN (FORMAT JSON) UPDATE meters \
             SET controller = COALESCE(NULL, controller), sequence = sequence + 1, updated = now() \
             WHERE id = {} AND sequence = {expected_sequence}",
            id_literal(id)
        ))
        .await
    }

    async fn explain_delete(&self, id: MeterId) -> Result<Value, DatabaseError> {
        self.explain(format!(
            "EXPLAIN (FORMAT JSON) DELETE FROM meters WHERE id = {}",
            id_literal(id)
        ))
        .await
    }
}
