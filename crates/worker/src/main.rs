use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use validator::Validate;

use cocho_core::health::HealthThresholds;
use cocho_db::repositories::file_record_repo::FileRecordRepo;
use cocho_etl::alert::webhook::WebhookSink;
use cocho_etl::config::WorkerConfig;
use cocho_etl::monitoring::MonitoringService;
use cocho_etl::orchestrator::Orchestrator;
use cocho_etl::pg::PgStore;
use cocho_etl::ports::LocalFileStorage;
use cocho_etl::retry::RetryExecutor;

mod csv;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cocho_worker=debug,cocho_etl=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = WorkerConfig::from_env();
    config.validate().expect("invalid worker configuration");
    tracing::info!(
        organization_id = config.organization_id,
        poll_interval_secs = config.poll_interval_secs,
        "Loaded worker configuration"
    );

    let pool = cocho_db::create_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");
    cocho_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    cocho_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database ready, migrations applied");

    let store = Arc::new(PgStore::new(pool.clone()));
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&store),
        Arc::new(LocalFileStorage::new(&config.storage_root)),
        Arc::new(csv::DelimitedParser),
        Arc::new(csv::ExportValidator),
        RetryExecutor::new(Arc::clone(&store), config.retry_config()),
    ));

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Shutdown signal received");
                cancel.cancel();
            }
        });
    }

    let monitor_handle = {
        let mut monitor = MonitoringService::new(
            Arc::clone(&store),
            HealthThresholds {
                dead_letter_warning: config.dead_letter_warning,
                active_retry_warning: config.active_retry_warning,
                hourly_error_warning: config.hourly_error_warning,
            },
        )
        .with_stale_after_minutes(config.stale_after_minutes);
        if let Some(url) = &config.alert_webhook_url {
            let sink = WebhookSink::new(url).expect("invalid webhook configuration");
            monitor.register_sink(Arc::new(sink));
            tracing::info!("Webhook alert sink registered");
        }
        let cancel = cancel.clone();
        let organization_id = config.organization_id;
        let interval = Duration::from_secs(config.health_check_interval_secs);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
                match monitor.check_alerts(organization_id).await {
                    Ok(report) => tracing::debug!(status = report.status, "health check done"),
                    Err(error) => tracing::warn!(%error, "health check failed"),
                }
            }
        })
    };

    tracing::info!("Worker started, polling for uploaded files");
    let poll_interval = Duration::from_secs(config.poll_interval_secs);
    while !cancel.is_cancelled() {
        match FileRecordRepo::claim_next_uploaded(&pool).await {
            Ok(Some(file)) => {
                tracing::info!(file_id = file.id, file_name = %file.file_name, "claimed file");
                match orchestrator.process_file(file.id, &cancel).await {
                    Ok(report) => tracing::info!(
                        file_id = file.id,
                        success = report.success,
                        inserted = report.summary.inserted,
                        updated = report.summary.updated,
                        skipped = report.summary.skipped,
                        pending = report.summary.pending,
                        failed = report.summary.failed,
                        "run finished"
                    ),
                    Err(error) => {
                        tracing::error!(file_id = file.id, %error, "run aborted")
                    }
                }
            }
            Ok(None) => {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(poll_interval) => {}
                }
            }
            Err(error) => {
                tracing::error!(%error, "failed to poll for uploaded files");
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(poll_interval) => {}
                }
            }
        }
    }

    cancel.cancel();
    let _ = monitor_handle.await;
    tracing::info!("Worker stopped");
}
