//! Runs the change notifier against the configured PostgreSQL backlog.
//!
//! Usage: `change_notifier [CONFIG_FILE]`
//!
//! Registers an audit handler that records every delivered change in
//! `<backlog table>_audit` inside the delivery transaction, then polls until
//! interrupted.

use anyhow::Context;
use async_trait::async_trait;
use change_notifier::config::NotifierConfig;
use change_notifier::dispatcher::{ChangeHandler, EventDispatcher, HandlerContext, HandlerOutcome};
use change_notifier::logging;
use change_notifier::store::{PgBacklogStore, PgSession};
use serde_json::Value;
use sqlx::PgPool;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

const AUDIT_HANDLER_ID: i64 = 0;

struct AuditHandler {
    table: String,
}

impl AuditHandler {
    fn new(backlog_table: &str) -> Self {
        Self {
            table: format!("{backlog_table}_audit"),
        }
    }

    async fn ensure_schema(&self, pool: &PgPool) -> anyhow::Result<()> {
        let ddl = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                job_id BIGINT NOT NULL,
                sub_sequence BIGINT NOT NULL,
                payload JSONB NOT NULL,
                recorded_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                PRIMARY KEY (job_id, sub_sequence)
            )
            "#,
            self.table
        );
        sqlx::query(&ddl).execute(pool).await?;
        Ok(())
    }

    async fn record(
        &self,
        ctx: &HandlerContext,
        session: &mut PgSession,
        event: &Value,
    ) -> anyhow::Result<()> {
        let key = ctx.record_key();
        let sql = format!(
            "INSERT INTO {} (job_id, sub_sequence, payload) VALUES ($1, $2, $3) ON CONFLICT DO NOTHING",
            self.table
        );
        sqlx::query(&sql)
            .bind(key.job_id)
            .bind(key.sub_sequence)
            .bind(event)
            .execute(session.connection()?)
            .await
            .with_context(|| format!("recording change {key}"))?;
        Ok(())
    }
}

#[async_trait]
impl ChangeHandler<PgSession, Value> for AuditHandler {
    async fn handle(&self, ctx: &HandlerContext, session: &mut PgSession, event: &Value) -> HandlerOutcome {
        HandlerOutcome::from_result(self.record(ctx, session, event).await)
    }

    fn name(&self) -> &str {
        "audit"
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_structured_logging();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = NotifierConfig::load(config_path.as_deref()).context("loading configuration")?;

    let session = PgSession::connect(&config.database)
        .await
        .context("connecting to backlog database")?;
    let store: PgBacklogStore<Value> = PgBacklogStore::from_config(&config.database)?;
    store.ensure_schema(session.pool()).await?;

    let audit = AuditHandler::new(store.table());
    audit.ensure_schema(session.pool()).await?;

    let mut dispatcher = EventDispatcher::new(session, store, &config.dispatcher)?;
    dispatcher.register(AUDIT_HANDLER_ID, audit)?;

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received");
                signal.cancel();
            }
            Err(e) => error!(error = %e, "Unable to listen for shutdown signal"),
        }
    });

    dispatcher.start(shutdown).await?;
    Ok(())
}
