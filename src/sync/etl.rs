use std::sync::Arc;

use chrono::NaiveDate;
use tracing::debug;

use crate::db::MetricStore;
use crate::error::Result;
use crate::feed::FeedSource;
use crate::reconcile::{filter_by_range, merge};
use crate::types::{DateRange, MergedMetric};

/// Load both feed snapshots, reconcile, keep the requested dates, persist.
pub struct EtlService {
    feeds: Arc<dyn FeedSource>,
    store: Arc<dyn MetricStore>,
}

impl EtlService {
    pub fn new(feeds: Arc<dyn FeedSource>, store: Arc<dyn MetricStore>) -> Self {
        Self { feeds, store }
    }

    pub fn store(&self) -> &Arc<dyn MetricStore> {
        &self.store
    }

    /// One full pass over `range`. Returns the records written.
    pub async fn run(&self, range: DateRange) -> Result<Vec<MergedMetric>> {
        let spend = self.feeds.load_spend().await?;
        let conversions = self.feeds.load_conversions().await?;

        let records = filter_by_range(merge(&spend, &conversions), range);
        let written = self.store.upsert_many(&records).await?;
        debug!(%range, spend = spend.len(), conversions = conversions.len(), written, "ETL pass complete");
        Ok(records)
    }

    /// Single day-partition. Returns the number of rows upserted.
    pub async fn run_day(&self, date: NaiveDate) -> Result<usize> {
        Ok(self.run(DateRange::day(date)).await?.len())
    }
}
