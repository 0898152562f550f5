mod api;
mod config;
mod db;
mod error;
mod feed;
mod quota;
mod reconcile;
mod sync;
mod types;

use std::sync::Arc;

use chrono::NaiveDate;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::health::HealthState;
use crate::api::routes::{router, ApiState};
use crate::config::Config;
use crate::db::{MetricStore, SqliteStore};
use crate::error::Result;
use crate::feed::JsonFeedSource;
use crate::quota::{Clock, QuotaTracker, SystemClock};
use crate::sync::{EtlService, ManualOutcome, SchedulerSettings, SyncScheduler};

#[derive(Debug, Parser)]
#[command(name = "cpa-sync")]
#[command(about = "Reconcile ad spend and conversion feeds into daily CPA, within API quota")]
struct Cli {
    /// First day to sync (YYYY-MM-DD), inclusive
    #[arg(long)]
    start_date: Option<NaiveDate>,

    /// Last day to sync (YYYY-MM-DD), inclusive
    #[arg(long)]
    end_date: Option<NaiveDate>,

    /// Keep running: periodic backfill plus the HTTP API
    #[arg(short, long)]
    scheduler: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cli, cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, cfg: Config) -> Result<()> {
    // --- Database setup ---
    let sqlite = SqliteStore::connect(&cfg.db_path).await?;
    let store: Arc<dyn MetricStore> = Arc::new(sqlite.clone());

    // --- Quota + scheduler wiring ---
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let quota = Arc::new(QuotaTracker::new(cfg.quota_ceiling(), Arc::clone(&clock)));
    info!(
        daily_limit = cfg.daily_limit,
        safety_margin = %cfg.safety_margin,
        ceiling = quota.ceiling(),
        "API quota configured"
    );

    let feeds = Arc::new(JsonFeedSource::new(cfg.spend_path(), cfg.conversions_path()));
    let health = Arc::new(HealthState::new());
    let scheduler = Arc::new(SyncScheduler::new(
        EtlService::new(feeds, Arc::clone(&store)),
        Arc::clone(&quota),
        clock,
        Arc::clone(&health),
        SchedulerSettings::from_config(&cfg),
    ));

    let result = if cli.scheduler {
        serve(&cfg, scheduler, store, quota, health).await
    } else {
        run_once(&scheduler, cli.start_date, cli.end_date).await
    };

    sqlite.close().await;
    result
}

/// One manual sync over the requested range, then exit.
async fn run_once(
    scheduler: &SyncScheduler,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Result<()> {
    match scheduler.run_manual_update(start, end).await? {
        ManualOutcome::Completed { summary } => {
            info!("Sync summary | {summary}");
        }
        ManualOutcome::Rejected {
            stats,
            next_available_at,
        } => {
            warn!(
                "Sync skipped: quota {}/{} used, next slot at {}",
                stats.used,
                stats.total,
                next_available_at
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "n/a".to_string()),
            );
        }
    }
    Ok(())
}

/// Arms the scheduler and serves the operator API until Ctrl-C / SIGTERM.
async fn serve(
    cfg: &Config,
    scheduler: Arc<SyncScheduler>,
    store: Arc<dyn MetricStore>,
    quota: Arc<QuotaTracker>,
    health: Arc<HealthState>,
) -> Result<()> {
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    let api_state = ApiState {
        scheduler: Arc::clone(&scheduler),
        store,
        quota,
        health,
    };
    let app = router(api_state);

    scheduler.start().await;

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    scheduler.stop().await;
    served?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
