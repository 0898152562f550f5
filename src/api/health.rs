//! Shared health state for the /health endpoint.
//! Updated by the sync scheduler.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Shared health counters. Updated by the scheduler, read by the API.
#[derive(Default)]
pub struct HealthState {
    /// True while the periodic driver is armed.
    pub armed: AtomicBool,
    pub ticks_completed: AtomicU64,
    pub days_synced: AtomicU64,
    pub days_failed: AtomicU64,
    /// Unix seconds of the last finished tick (0 = none yet).
    pub last_tick_at: AtomicI64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthSnapshot {
    pub armed: bool,
    pub ticks_completed: u64,
    pub days_synced: u64,
    pub days_failed: u64,
    pub last_tick_at: Option<DateTime<Utc>>,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_armed(&self, v: bool) {
        self.armed.store(v, Ordering::Relaxed);
    }

    pub fn record_tick(&self, at: DateTime<Utc>, synced: usize, failed: usize) {
        self.ticks_completed.fetch_add(1, Ordering::Relaxed);
        self.days_synced.fetch_add(synced as u64, Ordering::Relaxed);
        self.days_failed.fetch_add(failed as u64, Ordering::Relaxed);
        self.last_tick_at.store(at.timestamp(), Ordering::Relaxed);
    }

    pub fn armed(&self) -> bool {
        self.armed.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        let last = self.last_tick_at.load(Ordering::Relaxed);
        HealthSnapshot {
            armed: self.armed(),
            ticks_completed: self.ticks_completed.load(Ordering::Relaxed),
            days_synced: self.days_synced.load(Ordering::Relaxed),
            days_failed: self.days_failed.load(Ordering::Relaxed),
            last_tick_at: (last != 0)
                .then(|| DateTime::from_timestamp(last, 0))
                .flatten(),
        }
    }
}
