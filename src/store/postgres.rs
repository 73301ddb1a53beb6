//! # PostgreSQL Backlog
//!
//! Backlog table keyed by `(job_id, sub_sequence)` with a JSONB payload and the
//! processed flag stored bit-for-bit in a BIGINT column.
//!
//! ```text
//! change_notifier_backlog
//! ├── job_id            BIGINT  NOT NULL ─┐ primary key
//! ├── sub_sequence      BIGINT  NOT NULL ─┘
//! ├── payload           JSONB   NOT NULL
//! ├── processed_by_flag BIGINT  NOT NULL DEFAULT 0
//! └── created_at        TIMESTAMPTZ NOT NULL DEFAULT now()
//! ```
//!
//! Queries are built at runtime so the crate compiles without a database.

use super::{BacklogStore, Session, SessionError, SessionResult, StoreError, StoreResult};
use crate::config::{validate_table_name, ConfigResult, DatabaseConfig};
use crate::models::{ChangeRecord, CompletionMask, SequenceKey};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use std::marker::PhantomData;
use tracing::{debug, error, instrument};

/// Transactional session over a connection pool
#[derive(Debug)]
pub struct PgSession {
    pool: PgPool,
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgSession {
    pub fn new(pool: PgPool) -> Self {
        Self { pool, tx: None }
    }

    /// Open a pool sized by the database configuration
    pub async fn connect(config: &DatabaseConfig) -> SessionResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await
            .map_err(|e| SessionError::connect(e.to_string()))?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Connection of the open transaction; handlers write through this
    pub fn connection(&mut self) -> SessionResult<&mut PgConnection> {
        self.tx
            .as_deref_mut()
            .ok_or_else(|| SessionError::no_active_transaction("connection"))
    }
}

#[async_trait]
impl Session for PgSession {
    async fn begin(&mut self) -> SessionResult<()> {
        if self.tx.is_some() {
            return Err(SessionError::AlreadyInTransaction);
        }
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| SessionError::begin(e.to_string()))?;
        self.tx = Some(tx);
        Ok(())
    }

    async fn commit(&mut self) -> SessionResult<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| SessionError::no_active_transaction("commit"))?;
        tx.commit()
            .await
            .map_err(|e| SessionError::commit(e.to_string()))
    }

    async fn rollback(&mut self) -> SessionResult<()> {
        match self.tx.take() {
            Some(tx) => tx
                .rollback()
                .await
                .map_err(|e| SessionError::rollback(e.to_string())),
            None => Ok(()),
        }
    }

    fn in_transaction(&self) -> bool {
        self.tx.is_some()
    }
}

#[derive(sqlx::FromRow)]
struct BacklogRow {
    job_id: i64,
    sub_sequence: i64,
    payload: Value,
    processed_by_flag: i64,
}

/// Backlog stored in a PostgreSQL table, payloads decoded as `E`
#[derive(Debug, Clone)]
pub struct PgBacklogStore<E> {
    table: String,
    _event: PhantomData<fn() -> E>,
}

impl<E> PgBacklogStore<E> {
    /// Fails unless `table` is a plain SQL identifier
    pub fn new(table: impl Into<String>) -> ConfigResult<Self> {
        let table = table.into();
        validate_table_name(&table)?;
        Ok(Self {
            table,
            _event: PhantomData,
        })
    }

    pub fn from_config(config: &DatabaseConfig) -> ConfigResult<Self> {
        Self::new(config.table_name.clone())
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Create the backlog table if it does not exist
    pub async fn ensure_schema(&self, pool: &PgPool) -> StoreResult<()> {
        let ddl = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                job_id BIGINT NOT NULL,
                sub_sequence BIGINT NOT NULL,
                payload JSONB NOT NULL,
                processed_by_flag BIGINT NOT NULL DEFAULT 0,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                PRIMARY KEY (job_id, sub_sequence)
            )
            "#,
            table = self.table
        );
        sqlx::query(&ddl)
            .execute(pool)
            .await
            .map_err(|e| StoreError::database("ensure_schema", e.to_string()))?;
        debug!(table = %self.table, "Backlog table ready");
        Ok(())
    }
}

#[async_trait]
impl<E> BacklogStore for PgBacklogStore<E>
where
    E: DeserializeOwned + Send + Sync + 'static,
{
    type Session = PgSession;
    type Event = E;

    #[instrument(skip_all, fields(table = %self.table))]
    async fn list(&self, session: &mut PgSession) -> StoreResult<Vec<ChangeRecord<E>>> {
        let sql = format!(
            "SELECT job_id, sub_sequence, payload, processed_by_flag FROM {} ORDER BY job_id, sub_sequence",
            self.table
        );
        let query = sqlx::query_as::<_, BacklogRow>(&sql);
        let rows = match session.tx.as_deref_mut() {
            Some(conn) => query.fetch_all(conn).await,
            None => query.fetch_all(&session.pool).await,
        }
        .map_err(|e| {
            error!("Failed to list backlog: {}", e);
            StoreError::database("list", e.to_string())
        })?;

        rows.into_iter()
            .map(|row| {
                let key = SequenceKey::new(row.job_id, row.sub_sequence);
                let payload = serde_json::from_value::<E>(row.payload).map_err(|e| {
                    StoreError::Decode {
                        key,
                        message: e.to_string(),
                    }
                })?;
                Ok(ChangeRecord::new(key, payload)
                    .with_processed(CompletionMask::from_db(row.processed_by_flag)))
            })
            .collect()
    }

    async fn update_processed(
        &self,
        session: &mut PgSession,
        key: SequenceKey,
        processed: CompletionMask,
    ) -> StoreResult<()> {
        let sql = format!(
            "UPDATE {} SET processed_by_flag = $1 WHERE job_id = $2 AND sub_sequence = $3",
            self.table
        );
        let conn = session
            .tx
            .as_deref_mut()
            .ok_or_else(|| SessionError::no_active_transaction("update_processed"))?;
        let result = sqlx::query(&sql)
            .bind(processed.to_db())
            .bind(key.job_id)
            .bind(key.sub_sequence)
            .execute(conn)
            .await
            .map_err(|e| StoreError::database("update_processed", e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::RecordNotFound { key });
        }
        Ok(())
    }

    async fn delete_and_commit(&self, session: &mut PgSession, key: SequenceKey) -> StoreResult<()> {
        let sql = format!(
            "DELETE FROM {} WHERE job_id = $1 AND sub_sequence = $2",
            self.table
        );
        session.begin().await?;

        let deleted = match session.tx.as_deref_mut() {
            Some(conn) => sqlx::query(&sql)
                .bind(key.job_id)
                .bind(key.sub_sequence)
                .execute(conn)
                .await
                .map_err(|e| StoreError::database("delete_and_commit", e.to_string())),
            None => Err(SessionError::no_active_transaction("delete_and_commit").into()),
        };

        if let Err(e) = deleted {
            if let Err(rollback_error) = session.rollback().await {
                error!(error = %rollback_error, "Rollback after failed delete also failed");
            }
            return Err(e);
        }

        session.commit().await?;
        Ok(())
    }
}
