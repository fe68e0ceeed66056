//! Herald campaign delivery service.
//!
//! Main entry point. Initializes logging, configuration, the database
//! pool, and the HTTP trigger surface.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use herald_api::{AppState, Config};
use herald_core::{storage::Storage, RealClock};
use sqlx::postgres::PgPoolOptions;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;

    init_tracing(&config.rust_log)?;

    info!("Starting Herald campaign delivery service");
    info!(
        database_url = %config.database_url_masked(),
        host = %config.host,
        port = config.port,
        max_connections = config.database_max_connections,
        "Configuration loaded"
    );

    let db_pool = create_database_pool(&config).await?;
    info!("Database connection pool established");

    run_migrations(&db_pool).await?;
    info!("Database migrations completed");

    let storage = Arc::new(Storage::new(db_pool.clone()));
    let state = AppState::new(storage, Arc::new(RealClock), &config);

    let addr = config.parse_server_addr()?;
    herald_api::start_server(state, addr, Duration::from_secs(config.request_timeout))
        .await
        .context("HTTP server failed")?;

    db_pool.close().await;
    info!("Database connections closed");

    info!("Herald shutdown complete");
    Ok(())
}

/// Initializes tracing with environment-based configuration.
fn init_tracing(default_filter: &str) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .context("invalid RUST_LOG filter")?;

    let fmt_layer = fmt::layer().with_target(true).with_file(true).with_line_number(true);

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
    Ok(())
}

/// Creates the database connection pool with retry logic.
async fn create_database_pool(config: &Config) -> Result<sqlx::PgPool> {
    let mut retries = 0;
    const MAX_RETRIES: u32 = 5;
    const RETRY_DELAY: Duration = Duration::from_secs(2);

    loop {
        match PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .min_connections(2)
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(600))
            .max_lifetime(Duration::from_secs(1800))
            .connect(&config.database_url)
            .await
        {
            Ok(pool) => {
                sqlx::query("SELECT 1")
                    .fetch_one(&pool)
                    .await
                    .context("Failed to verify database connection")?;

                return Ok(pool);
            },
            Err(_e) if retries < MAX_RETRIES => {
                retries += 1;
                info!(
                    attempt = retries,
                    max_retries = MAX_RETRIES,
                    "Database connection failed, retrying..."
                );
                tokio::time::sleep(RETRY_DELAY).await;
            },
            Err(e) => {
                return Err(e).context("Failed to create database connection pool after retries");
            },
        }
    }
}

/// Runs database migrations.
async fn run_migrations(pool: &sqlx::PgPool) -> Result<()> {
    // TODO: Use sqlx::migrate! macro once migrations are set up
    // For now, ensure tables exist

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS events (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            code TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            starts_at TIMESTAMPTZ NOT NULL,
            ends_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create events table")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS templates (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            event_id UUID NOT NULL REFERENCES events(id),
            channel TEXT NOT NULL,
            subject TEXT NOT NULL,
            html_body TEXT NOT NULL,
            text_body TEXT
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create templates table")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS participants (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            event_id UUID NOT NULL REFERENCES events(id),
            name TEXT NOT NULL,
            email TEXT,
            phone TEXT,
            company TEXT,
            language TEXT,
            is_vip BOOLEAN NOT NULL DEFAULT FALSE,
            status TEXT NOT NULL DEFAULT 'invited'
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create participants table")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS table_assignments (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            participant_id UUID NOT NULL REFERENCES participants(id),
            table_name TEXT NOT NULL,
            is_confirmed BOOLEAN NOT NULL DEFAULT FALSE
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create table_assignments table")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS campaign_jobs (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            event_id UUID NOT NULL REFERENCES events(id),
            template_id UUID NOT NULL REFERENCES templates(id),
            channel TEXT NOT NULL,
            segmentation JSONB NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            total_count INTEGER NOT NULL DEFAULT 0,
            processed_count INTEGER NOT NULL DEFAULT 0,
            success_count INTEGER NOT NULL DEFAULT 0,
            fail_count INTEGER NOT NULL DEFAULT 0,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create campaign_jobs table")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS delivery_logs (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            job_id UUID NOT NULL REFERENCES campaign_jobs(id),
            recipient_id UUID NOT NULL,
            address TEXT NOT NULL,
            status TEXT NOT NULL,
            error_message TEXT,
            sent_at TIMESTAMPTZ
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create delivery_logs table")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS automations (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            event_id UUID NOT NULL REFERENCES events(id),
            template_id UUID NOT NULL REFERENCES templates(id),
            channel TEXT NOT NULL,
            kind TEXT NOT NULL,
            time_type TEXT,
            send_at TIMESTAMPTZ,
            offset_days INTEGER,
            trigger_kind TEXT,
            segmentation JSONB NOT NULL,
            is_active BOOLEAN NOT NULL DEFAULT TRUE,
            last_run_at TIMESTAMPTZ,
            next_run_at TIMESTAMPTZ
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create automations table")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS follow_ups (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            event_id UUID NOT NULL REFERENCES events(id),
            template_id UUID NOT NULL REFERENCES templates(id),
            channel TEXT NOT NULL,
            base_job_id UUID NOT NULL REFERENCES campaign_jobs(id),
            trigger_type TEXT NOT NULL,
            delay_hours INTEGER,
            segmentation JSONB NOT NULL,
            is_active BOOLEAN NOT NULL DEFAULT TRUE,
            last_run_at TIMESTAMPTZ,
            next_run_at TIMESTAMPTZ
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create follow_ups table")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS queue_jobs (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            job_type TEXT NOT NULL,
            payload JSONB NOT NULL,
            status TEXT NOT NULL DEFAULT 'queued',
            idempotency_key TEXT,
            retry_count INTEGER NOT NULL DEFAULT 0,
            max_retries INTEGER NOT NULL DEFAULT 3,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            started_at TIMESTAMPTZ,
            completed_at TIMESTAMPTZ,
            error_message TEXT
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create queue_jobs table")?;

    // Claim queries scan pending rows oldest-first; give them an index.
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_campaign_jobs_pending
        ON campaign_jobs(created_at)
        WHERE status = 'pending'
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create campaign_jobs pending index")?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_queue_jobs_queued
        ON queue_jobs(job_type, created_at)
        WHERE status = 'queued'
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create queue_jobs queued index")?;

    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_queue_jobs_active_key
        ON queue_jobs(idempotency_key)
        WHERE idempotency_key IS NOT NULL AND status IN ('queued', 'processing')
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create queue_jobs idempotency index")?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_delivery_logs_job
        ON delivery_logs(job_id, status)
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create delivery_logs job index")?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_due_automations
        ON automations(next_run_at)
        WHERE is_active = TRUE AND next_run_at IS NOT NULL
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create automations due index")?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_due_follow_ups
        ON follow_ups(next_run_at)
        WHERE is_active = TRUE AND next_run_at IS NOT NULL
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create follow_ups due index")?;

    Ok(())
}
