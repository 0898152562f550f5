use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::types::MergedMetric;

/// Totals over one sync run, logged after one-shot and manual runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub records: usize,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    pub total_spend: Decimal,
    pub total_conversions: u64,
    pub records_with_cpa: usize,
    /// Mean cpa over records that have one, 2 dp.
    pub avg_cpa: Option<Decimal>,
}

impl SyncSummary {
    pub fn from_records(records: &[MergedMetric]) -> Self {
        let mut summary = SyncSummary {
            records: records.len(),
            first_date: records.iter().map(|r| r.date).min(),
            last_date: records.iter().map(|r| r.date).max(),
            ..Default::default()
        };

        let mut cpa_sum = Decimal::ZERO;
        for r in records {
            summary.total_spend += r.spend;
            summary.total_conversions += u64::from(r.conversions);
            if let Some(cpa) = r.cpa {
                cpa_sum += cpa;
                summary.records_with_cpa += 1;
            }
        }

        if summary.records_with_cpa > 0 {
            summary.avg_cpa = Some((cpa_sum / Decimal::from(summary.records_with_cpa)).round_dp(2));
        }
        summary
    }

    pub fn is_empty(&self) -> bool {
        self.records == 0
    }
}

impl std::fmt::Display for SyncSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return write!(f, "no records");
        }
        write!(
            f,
            "records: {} | spend: ${} | conversions: {} | with cpa: {}",
            self.records,
            self.total_spend.round_dp(2),
            self.total_conversions,
            self.records_with_cpa,
        )?;
        if let Some(avg) = self.avg_cpa {
            write!(f, " | avg cpa: ${avg}")?;
        }
        Ok(())
    }
}
