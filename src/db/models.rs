use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::error::AppError;
use crate::types::MergedMetric;

/// Row of `daily_stats` as stored. Dates and decimals are kept as text.
#[derive(Debug, sqlx::FromRow)]
pub struct DailyStatsRow {
    pub date: String,
    pub campaign_id: String,
    pub spend: String,
    pub conversions: i64,
    pub cpa: Option<String>,
}

impl TryFrom<DailyStatsRow> for MergedMetric {
    type Error = AppError;

    fn try_from(row: DailyStatsRow) -> Result<Self, Self::Error> {
        let corrupt = |field: &str, value: &str| {
            AppError::CorruptRow(format!(
                "{} / {}: bad {field} {value:?}",
                row.date, row.campaign_id
            ))
        };
        let date = row
            .date
            .parse::<NaiveDate>()
            .map_err(|_| corrupt("date", &row.date))?;
        let spend = row
            .spend
            .parse::<Decimal>()
            .map_err(|_| corrupt("spend", &row.spend))?;
        let conversions =
            u32::try_from(row.conversions).map_err(|_| corrupt("conversions", &row.conversions.to_string()))?;
        let cpa = match row.cpa.as_deref() {
            Some(s) => Some(s.parse::<Decimal>().map_err(|_| corrupt("cpa", s))?),
            None => None,
        };
        Ok(MergedMetric {
            date,
            campaign_id: row.campaign_id,
            spend,
            conversions,
            cpa,
        })
    }
}
