use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, warn};

use crate::quota::Clock;

/// Length of the sliding window.
fn window() -> Duration {
    Duration::hours(24)
}

/// Added to the expiry instant so the slot is gone by the time a caller retries.
fn expiry_epsilon() -> Duration {
    Duration::seconds(1)
}

#[derive(Debug, Default)]
struct WindowState {
    /// Commit instants of consumed slots, oldest first.
    slots: VecDeque<DateTime<Utc>>,
    /// Permits handed out but not yet committed or dropped.
    reserved: usize,
}

impl WindowState {
    fn prune(&mut self, now: DateTime<Utc>) {
        let cutoff = now - window();
        self.slots.retain(|ts| *ts > cutoff);
    }

    fn held(&self) -> usize {
        self.slots.len() + self.reserved
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuotaStats {
    /// Committed slots still inside the window.
    pub used: usize,
    /// Slots held by in-flight calls, not yet committed.
    pub reserved: usize,
    pub available: usize,
    pub total: usize,
    pub usage_percent: f64,
}

/// Sliding 24h counter of external call slots.
///
/// Every read prunes slots older than the window first. `try_reserve` is the
/// check-and-hold critical section: two callers can never both be admitted
/// for the last free slot.
pub struct QuotaTracker {
    ceiling: usize,
    state: Mutex<WindowState>,
    clock: Arc<dyn Clock>,
}

impl QuotaTracker {
    pub fn new(ceiling: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            ceiling,
            state: Mutex::new(WindowState::default()),
            clock,
        }
    }

    /// Lock the window, recovering from poison. A panicked holder can at worst
    /// leave a stale reservation count, which is better than wedging the scheduler.
    fn lock_state(&self) -> MutexGuard<'_, WindowState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            warn!("Quota window mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn pruned(&self) -> (MutexGuard<'_, WindowState>, DateTime<Utc>) {
        let now = self.clock.now();
        let mut state = self.lock_state();
        state.prune(now);
        (state, now)
    }

    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    /// True iff one more slot fits under the ceiling, counting in-flight reservations.
    pub fn can_consume(&self) -> bool {
        let (state, _) = self.pruned();
        state.held() < self.ceiling
    }

    /// Records one slot at the current instant. Does not check the ceiling.
    pub fn consume(&self) {
        let (mut state, now) = self.pruned();
        state.slots.push_back(now);
        debug!(used = state.slots.len(), total = self.ceiling, "Quota slot consumed");
    }

    pub fn available(&self) -> usize {
        let (state, _) = self.pruned();
        self.ceiling.saturating_sub(state.held())
    }

    /// When the oldest recorded slot leaves the window. `None` while a slot is free,
    /// or when nothing recorded could expire.
    pub fn next_available_at(&self) -> Option<DateTime<Utc>> {
        let (state, _) = self.pruned();
        Self::next_expiry(&state, self.ceiling)
    }

    fn next_expiry(state: &WindowState, ceiling: usize) -> Option<DateTime<Utc>> {
        if state.held() < ceiling {
            return None;
        }
        state
            .slots
            .iter()
            .min()
            .map(|earliest| *earliest + window() + expiry_epsilon())
    }

    pub fn stats(&self) -> QuotaStats {
        let (state, _) = self.pruned();
        self.stats_locked(&state)
    }

    /// Stats and next expiry read under one lock.
    pub fn snapshot(&self) -> (QuotaStats, Option<DateTime<Utc>>) {
        let (state, _) = self.pruned();
        (self.stats_locked(&state), Self::next_expiry(&state, self.ceiling))
    }

    fn stats_locked(&self, state: &WindowState) -> QuotaStats {
        let used = state.slots.len();
        let usage_percent = if self.ceiling == 0 {
            0.0
        } else {
            (Decimal::from(used) * Decimal::ONE_HUNDRED / Decimal::from(self.ceiling))
                .round_dp(2)
                .to_f64()
                .unwrap_or(0.0)
        };
        QuotaStats {
            used,
            reserved: state.reserved,
            available: self.ceiling.saturating_sub(state.held()),
            total: self.ceiling,
            usage_percent,
        }
    }

    /// Holds one slot if one is free. Commit the permit once the call succeeded;
    /// dropping it uncommitted gives the slot back.
    pub fn try_reserve(&self) -> Option<QuotaPermit<'_>> {
        let (mut state, _) = self.pruned();
        if state.held() >= self.ceiling {
            return None;
        }
        state.reserved += 1;
        Some(QuotaPermit {
            tracker: self,
            committed: false,
        })
    }
}

/// A held quota slot. See [`QuotaTracker::try_reserve`].
#[must_use = "an uncommitted permit releases its slot when dropped"]
pub struct QuotaPermit<'a> {
    tracker: &'a QuotaTracker,
    committed: bool,
}

impl QuotaPermit<'_> {
    /// Turns the reservation into a consumed slot stamped now.
    pub fn commit(mut self) {
        let (mut state, now) = self.tracker.pruned();
        state.reserved = state.reserved.saturating_sub(1);
        state.slots.push_back(now);
        self.committed = true;
        debug!(used = state.slots.len(), total = self.tracker.ceiling, "Quota slot committed");
    }
}

impl Drop for QuotaPermit<'_> {
    fn drop(&mut self) {
        if !self.committed {
            let mut state = self.tracker.lock_state();
            state.reserved = state.reserved.saturating_sub(1);
        }
    }
}
