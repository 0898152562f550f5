use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

// ---------------------------------------------------------------------------
// Feed records
// ---------------------------------------------------------------------------

/// One row of the spend feed. `spend` is exact and never negative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpendRecord {
    pub date: NaiveDate,
    pub campaign_id: String,
    pub spend: Decimal,
}

/// One row of the conversions feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionRecord {
    pub date: NaiveDate,
    pub campaign_id: String,
    pub conversions: u32,
}

// ---------------------------------------------------------------------------
// Reconciled metric
// ---------------------------------------------------------------------------

/// One reconciled row per (date, campaign_id).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedMetric {
    pub date: NaiveDate,
    pub campaign_id: String,
    pub spend: Decimal,
    pub conversions: u32,
    /// spend / conversions at 2 dp; `None` when there were no conversions.
    pub cpa: Option<Decimal>,
}

impl MergedMetric {
    pub fn key(&self) -> (NaiveDate, &str) {
        (self.date, self.campaign_id.as_str())
    }
}

// ---------------------------------------------------------------------------
// Date range
// ---------------------------------------------------------------------------

/// Inclusive date bounds. A missing bound is unrestricted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<Self> {
        if let (Some(s), Some(e)) = (start, end) {
            if s > e {
                return Err(AppError::InvalidInput(format!(
                    "start date {s} is after end date {e}"
                )));
            }
        }
        Ok(Self { start, end })
    }

    pub fn day(date: NaiveDate) -> Self {
        Self {
            start: Some(date),
            end: Some(date),
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.map_or(true, |s| date >= s) && self.end.map_or(true, |e| date <= e)
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let bound = |d: Option<NaiveDate>| d.map(|d| d.to_string()).unwrap_or_else(|| "*".to_string());
        write!(f, "{}..={}", bound(self.start), bound(self.end))
    }
}
