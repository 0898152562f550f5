use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{Days, NaiveDate};
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::api::health::HealthState;
use crate::config::Config;
use crate::db::MetricStore;
use crate::error::Result;
use crate::quota::{Clock, QuotaTracker};
use crate::reconcile::SyncSummary;
use crate::sync::etl::EtlService;
use crate::sync::outcome::{DayOutcome, ManualOutcome, TickReport, TickStatus};
use crate::types::DateRange;

#[derive(Debug, Clone, Copy)]
pub struct SchedulerSettings {
    pub interval: Duration,
    /// Trailing days, today included, scanned for missing rows.
    pub window_days: u32,
}

impl SchedulerSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            interval: cfg.sync_interval(),
            window_days: cfg.staleness_window_days,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    Armed,
    Disarmed,
}

enum SchedulerControl {
    Disarmed,
    Armed {
        shutdown_tx: watch::Sender<bool>,
        handle: JoinHandle<()>,
    },
}

struct SchedulerInner {
    etl: EtlService,
    quota: Arc<QuotaTracker>,
    clock: Arc<dyn Clock>,
    health: Arc<HealthState>,
    settings: SchedulerSettings,
    /// Held for the duration of a tick. Overlapping ticks bail out instead of queueing.
    tick_guard: Mutex<()>,
    /// Set only while stop() waits on the driver. Checked between days so the
    /// current day finishes.
    stopping: AtomicBool,
}

/// Periodic backfill of stale days plus an on-demand sync path, both under quota.
pub struct SyncScheduler {
    inner: Arc<SchedulerInner>,
    control: Mutex<SchedulerControl>,
}

impl SyncScheduler {
    pub fn new(
        etl: EtlService,
        quota: Arc<QuotaTracker>,
        clock: Arc<dyn Clock>,
        health: Arc<HealthState>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                etl,
                quota,
                clock,
                health,
                settings,
                tick_guard: Mutex::new(()),
                stopping: AtomicBool::new(false),
            }),
            control: Mutex::new(SchedulerControl::Disarmed),
        }
    }

    pub async fn state(&self) -> SchedulerState {
        match *self.control.lock().await {
            SchedulerControl::Disarmed => SchedulerState::Disarmed,
            SchedulerControl::Armed { .. } => SchedulerState::Armed,
        }
    }

    /// Arms the periodic driver. Returns false (and does nothing) if already armed.
    pub async fn start(&self) -> bool {
        let mut control = self.control.lock().await;
        if matches!(*control, SchedulerControl::Armed { .. }) {
            warn!("Scheduler already running");
            return false;
        }

        self.inner.stopping.store(false, Ordering::SeqCst);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move { inner.drive(shutdown_rx).await });

        *control = SchedulerControl::Armed { shutdown_tx, handle };
        self.inner.health.set_armed(true);
        info!(
            interval_secs = self.inner.settings.interval.as_secs(),
            window_days = self.inner.settings.window_days,
            "Scheduler started"
        );
        true
    }

    /// Disarms the driver and waits for an in-flight tick to finish its current day.
    pub async fn stop(&self) {
        let mut control = self.control.lock().await;
        let SchedulerControl::Armed { shutdown_tx, handle } =
            std::mem::replace(&mut *control, SchedulerControl::Disarmed)
        else {
            return;
        };

        info!("Stopping scheduler");
        self.inner.stopping.store(true, Ordering::SeqCst);
        let _ = shutdown_tx.send(true);
        if let Err(e) = handle.await {
            error!("Scheduler task ended abnormally: {e}");
        }
        self.inner.stopping.store(false, Ordering::SeqCst);
        self.inner.health.set_armed(false);
        info!("Scheduler stopped");
    }

    /// One periodic tick, on demand.
    pub async fn run_tick(&self) -> TickReport {
        self.inner.run_tick().await
    }

    /// Syncs `start..=end` once, outside the staleness scan. Costs one quota slot
    /// on success, regardless of how many days the range spans.
    pub async fn run_manual_update(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<ManualOutcome> {
        let range = DateRange::new(start, end)?;
        info!(%range, "Manual sync requested");

        let Some(permit) = self.inner.quota.try_reserve() else {
            let (stats, next_available_at) = self.inner.quota.snapshot();
            error!(
                used = stats.used,
                total = stats.total,
                next_available_at = ?next_available_at,
                "Manual sync rejected: API quota exhausted"
            );
            return Ok(ManualOutcome::Rejected {
                stats,
                next_available_at,
            });
        };

        let records = self.inner.etl.run(range).await?;
        permit.commit();

        let summary = SyncSummary::from_records(&records);
        let stats = self.inner.quota.stats();
        info!(
            records = summary.records,
            used = stats.used,
            total = stats.total,
            usage_percent = stats.usage_percent,
            "Manual sync complete"
        );
        Ok(ManualOutcome::Completed { summary })
    }
}

impl SchedulerInner {
    async fn drive(self: Arc<Self>, mut shutdown_rx: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.settings.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        interval.tick().await; // consume immediate first tick

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => break,
                _ = interval.tick() => {
                    self.run_tick().await;
                }
            }
        }
    }

    async fn run_tick(&self) -> TickReport {
        let Ok(_guard) = self.tick_guard.try_lock() else {
            warn!("Previous sync tick still running, skipping");
            return TickReport::without_work(TickStatus::AlreadyRunning);
        };

        info!("Scheduled sync tick started");
        let report = self.tick().await;
        self.health
            .record_tick(self.clock.now(), report.synced_days(), report.failed_days());
        info!(
            synced = report.synced_days(),
            failed = report.failed_days(),
            "Scheduled sync tick finished"
        );
        report
    }

    async fn tick(&self) -> TickReport {
        if !self.quota.can_consume() {
            let (stats, next_available_at) = self.quota.snapshot();
            warn!(
                used = stats.used,
                total = stats.total,
                usage_percent = stats.usage_percent,
                next_available_at = ?next_available_at,
                "API quota exhausted, deferring tick"
            );
            return TickReport::without_work(TickStatus::Deferred {
                stats,
                next_available_at,
            });
        }

        let stale = match self.stale_days().await {
            Ok(days) => days,
            Err(e) => {
                error!("Staleness scan failed: {e}");
                return TickReport::without_work(TickStatus::Aborted {
                    error: e.to_string(),
                });
            }
        };
        if stale.is_empty() {
            info!("All days up to date, nothing to load");
            return TickReport::without_work(TickStatus::UpToDate);
        }
        info!(count = stale.len(), "Stale days found");

        let mut outcomes = Vec::with_capacity(stale.len());
        let mut interrupted = false;
        for (i, &date) in stale.iter().enumerate() {
            if self.stopping.load(Ordering::SeqCst) {
                info!("Stop requested, leaving remaining days for the next run");
                interrupted = true;
                break;
            }

            let Some(permit) = self.quota.try_reserve() else {
                warn!(remaining = stale.len() - i, "API quota exhausted mid-tick");
                outcomes.extend(stale[i..].iter().map(|&date| DayOutcome::SkippedByQuota { date }));
                break;
            };

            info!(%date, "Loading day");
            match self.etl.run_day(date).await {
                Ok(records) => {
                    permit.commit();
                    info!(%date, records, "Day loaded");
                    outcomes.push(DayOutcome::Synced { date, records });
                }
                Err(e) => {
                    error!(%date, "Day sync failed: {e}");
                    outcomes.push(DayOutcome::Failed {
                        date,
                        error: e.to_string(),
                    });
                    break;
                }
            }
        }

        let stats = self.quota.stats();
        info!(
            used = stats.used,
            total = stats.total,
            available = stats.available,
            usage_percent = stats.usage_percent,
            "Quota after tick"
        );
        TickReport {
            status: if interrupted {
                TickStatus::Interrupted
            } else {
                TickStatus::Processed
            },
            outcomes,
        }
    }

    /// Days in the trailing window with no stored rows, oldest first.
    async fn stale_days(&self) -> Result<Vec<NaiveDate>> {
        let today = self.clock.now().date_naive();
        let mut stale = Vec::new();
        for back in (0..self.settings.window_days).rev() {
            let Some(date) = today.checked_sub_days(Days::new(u64::from(back))) else {
                continue;
            };
            if !self.etl.store().exists_for_date(date).await? {
                stale.push(date);
            }
        }
        Ok(stale)
    }
}
