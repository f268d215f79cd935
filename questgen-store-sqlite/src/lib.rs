//! SQLite-backed [`ContentStore`] for generation records.

pub mod schema;

use std::convert::TryFrom;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use questgen_core::{ContentStore, GenerationRecord, RecordStatus, StoreError};

use crate::schema::{
    COUNT_BY_STATUS_SQL, MIGRATION_STATEMENTS_SQL, SELECT_RECORD_SQL, UPSERT_RECORD_SQL,
};

#[derive(Debug, Error)]
pub enum SqliteStoreError {
    #[error("failed to connect to sqlite: {0}")]
    Connection(#[source] sqlx::Error),
    #[error("failed to run sqlite migrations: {0}")]
    Migration(#[source] sqlx::Error),
}

#[derive(Debug, Clone)]
pub struct SqliteContentStore {
    pool: sqlx::SqlitePool,
}

#[derive(Debug, Clone)]
pub struct SqliteContentStoreBuilder {
    database_url: String,
    max_connections: u32,
    create_if_missing: bool,
}

impl SqliteContentStore {
    pub fn builder(database_url: impl Into<String>) -> SqliteContentStoreBuilder {
        SqliteContentStoreBuilder {
            database_url: database_url.into(),
            max_connections: 1,
            create_if_missing: true,
        }
    }

    pub fn pool(&self) -> &sqlx::SqlitePool {
        &self.pool
    }

    pub async fn count_by_status(&self, status: RecordStatus) -> Result<u64, StoreError> {
        let (count,): (i64,) = sqlx::query_as(COUNT_BY_STATUS_SQL)
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(internal)?;
        u64::try_from(count).map_err(|_| corrupt("negative row count"))
    }
}

impl SqliteContentStoreBuilder {
    pub fn max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn create_if_missing(mut self, create_if_missing: bool) -> Self {
        self.create_if_missing = create_if_missing;
        self
    }

    pub async fn build(self) -> Result<SqliteContentStore, SqliteStoreError> {
        let options = self
            .database_url
            .parse::<sqlx::sqlite::SqliteConnectOptions>()
            .map_err(SqliteStoreError::Connection)?
            .create_if_missing(self.create_if_missing);

        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(self.max_connections)
            .connect_with(options)
            .await
            .map_err(SqliteStoreError::Connection)?;

        run_migrations(&pool).await?;
        tracing::debug!(database_url = %self.database_url, "sqlite content store ready");

        Ok(SqliteContentStore { pool })
    }
}

pub async fn run_migrations(pool: &sqlx::SqlitePool) -> Result<(), SqliteStoreError> {
    for statement in MIGRATION_STATEMENTS_SQL {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(SqliteStoreError::Migration)?;
    }
    Ok(())
}

type RecordRow = (
    String,
    String,
    String,
    String,
    Option<String>,
    Option<f64>,
    i64,
    Option<String>,
    String,
);

fn internal(error: sqlx::Error) -> StoreError {
    StoreError::Internal(Box::new(error))
}

fn corrupt(message: impl Into<String>) -> StoreError {
    let message: String = message.into();
    StoreError::Internal(message.into())
}

fn decode_row(row: RecordRow) -> Result<GenerationRecord, StoreError> {
    let (key, run_id, template_id, status, fields_json, quality_score, attempts, error, updated_at) =
        row;

    let run_id = Uuid::parse_str(&run_id).map_err(|e| corrupt(format!("run_id: {e}")))?;
    let status =
        RecordStatus::parse(&status).ok_or_else(|| corrupt(format!("unknown status '{status}'")))?;
    let fields = fields_json
        .map(|json| serde_json::from_str(&json))
        .transpose()?;
    let attempts = u32::try_from(attempts).map_err(|_| corrupt("attempts out of range"))?;
    let updated_at = DateTime::parse_from_rfc3339(&updated_at)
        .map_err(|e| corrupt(format!("updated_at: {e}")))?
        .with_timezone(&Utc);

    Ok(GenerationRecord {
        key,
        run_id,
        template_id,
        status,
        fields,
        quality_score,
        attempts,
        error,
        updated_at,
    })
}

#[async_trait]
impl ContentStore for SqliteContentStore {
    async fn upsert(&self, record: GenerationRecord) -> Result<(), StoreError> {
        if record.key.trim().is_empty() {
            return Err(StoreError::InvalidKey(record.key));
        }
        let fields_json = record
            .fields
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(UPSERT_RECORD_SQL)
            .bind(&record.key)
            .bind(record.run_id.to_string())
            .bind(&record.template_id)
            .bind(record.status.as_str())
            .bind(fields_json)
            .bind(record.quality_score)
            .bind(i64::from(record.attempts))
            .bind(&record.error)
            .bind(record.updated_at.to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(internal)?;

        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<GenerationRecord>, StoreError> {
        let row: Option<RecordRow> = sqlx::query_as(SELECT_RECORD_SQL)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(internal)?;

        row.map(decode_row).transpose()
    }
}
