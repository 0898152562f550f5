use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::quota::QuotaStats;
use crate::reconcile::SyncSummary;

/// What happened to one stale day during a tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DayOutcome {
    Synced { date: NaiveDate, records: usize },
    SkippedByQuota { date: NaiveDate },
    Failed { date: NaiveDate, error: String },
}

impl DayOutcome {
    pub fn date(&self) -> NaiveDate {
        match self {
            DayOutcome::Synced { date, .. }
            | DayOutcome::SkippedByQuota { date }
            | DayOutcome::Failed { date, .. } => *date,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TickStatus {
    /// Quota exhausted before the tick started.
    Deferred {
        stats: QuotaStats,
        next_available_at: Option<DateTime<Utc>>,
    },
    /// Every day in the window already has rows.
    UpToDate,
    /// At least one stale day was visited; see the outcomes.
    Processed,
    /// A stop request arrived before every stale day was visited.
    Interrupted,
    /// Another tick held the guard.
    AlreadyRunning,
    /// The staleness scan itself failed.
    Aborted { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickReport {
    #[serde(flatten)]
    pub status: TickStatus,
    pub outcomes: Vec<DayOutcome>,
}

impl TickReport {
    pub fn without_work(status: TickStatus) -> Self {
        Self {
            status,
            outcomes: Vec::new(),
        }
    }

    pub fn synced_days(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, DayOutcome::Synced { .. }))
            .count()
    }

    pub fn failed_days(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, DayOutcome::Failed { .. }))
            .count()
    }
}

/// Result of an operator-requested sync.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ManualOutcome {
    Completed {
        summary: SyncSummary,
    },
    /// Quota already exhausted; nothing was run or consumed.
    Rejected {
        stats: QuotaStats,
        next_available_at: Option<DateTime<Utc>>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_counts_and_json_shape() {
        let date: NaiveDate = "2025-06-04".parse().unwrap();
        let report = TickReport {
            status: TickStatus::Processed,
            outcomes: vec![
                DayOutcome::Synced { date, records: 3 },
                DayOutcome::Failed { date, error: "boom".into() },
                DayOutcome::SkippedByQuota { date },
            ],
        };
        assert_eq!(report.synced_days(), 1);
        assert_eq!(report.failed_days(), 1);
        assert_eq!(report.outcomes[2].date(), date);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "processed");
        assert_eq!(json["outcomes"][0]["outcome"], "synced");
        assert_eq!(json["outcomes"][0]["records"], 3);
        assert_eq!(json["outcomes"][2]["outcome"], "skipped_by_quota");
    }
}
