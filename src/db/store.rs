use std::path::Path;

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::{debug, info};

use crate::db::models::DailyStatsRow;
use crate::error::Result;
use crate::types::{DateRange, MergedMetric};

/// Persistence contract for reconciled metrics.
#[async_trait]
pub trait MetricStore: Send + Sync {
    /// True iff at least one row exists for `date`, for any campaign.
    async fn exists_for_date(&self, date: NaiveDate) -> Result<bool>;

    /// Insert or overwrite every record keyed by (date, campaign_id), all or nothing.
    /// Returns the number of rows written.
    async fn upsert_many(&self, records: &[MergedMetric]) -> Result<usize>;

    /// Stored rows inside `range`, ordered by (date, campaign_id).
    async fn list_range(&self, range: DateRange) -> Result<Vec<MergedMetric>>;
}

/// Money columns hold decimal(10,2) text: "37.50", not "37.5".
fn to_money(value: Decimal) -> String {
    let mut v = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    v.rescale(2);
    v.to_string()
}

fn to_day(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// SQLite-backed store on a single pooled connection.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (creating if missing) the database file and applies migrations.
    pub async fn connect(db_path: impl AsRef<Path>) -> Result<Self> {
        let opts = SqliteConnectOptions::new()
            .filename(db_path.as_ref())
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        info!("Database ready at {}", db_path.as_ref().display());
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    #[cfg(test)]
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl MetricStore for SqliteStore {
    async fn exists_for_date(&self, date: NaiveDate) -> Result<bool> {
        let found: i64 = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM daily_stats WHERE date = ?)",
        )
        .bind(to_day(date))
        .fetch_one(&self.pool)
        .await?;
        Ok(found != 0)
    }

    async fn upsert_many(&self, records: &[MergedMetric]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        for r in records {
            sqlx::query(
                r#"
                INSERT INTO daily_stats (date, campaign_id, spend, conversions, cpa)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(date, campaign_id) DO UPDATE SET
                    spend = excluded.spend,
                    conversions = excluded.conversions,
                    cpa = excluded.cpa
                "#,
            )
            .bind(to_day(r.date))
            .bind(r.campaign_id.as_str())
            .bind(to_money(r.spend))
            .bind(i64::from(r.conversions))
            .bind(r.cpa.map(to_money))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        debug!(rows = records.len(), "Upserted daily_stats batch");
        Ok(records.len())
    }

    async fn list_range(&self, range: DateRange) -> Result<Vec<MergedMetric>> {
        let rows: Vec<DailyStatsRow> = sqlx::query_as(
            r#"
            SELECT date, campaign_id, spend, conversions, cpa
            FROM daily_stats
            WHERE (?1 IS NULL OR date >= ?1)
              AND (?2 IS NULL OR date <= ?2)
            ORDER BY date, campaign_id
            "#,
        )
        .bind(range.start.map(to_day))
        .bind(range.end.map(to_day))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(MergedMetric::try_from).collect()
    }
}
