use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::Mutex;

use crate::db::MetricStore;
use crate::error::Result;
use crate::types::{DateRange, MergedMetric};

/// Map-backed store for scheduler and API tests.
#[derive(Default)]
pub struct InMemoryStore {
    rows: Mutex<BTreeMap<(NaiveDate, String), MergedMetric>>,
    upsert_calls: std::sync::atomic::AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.rows.lock().await.len()
    }

    pub fn upsert_calls(&self) -> usize {
        self.upsert_calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl MetricStore for InMemoryStore {
    async fn exists_for_date(&self, date: NaiveDate) -> Result<bool> {
        Ok(self.rows.lock().await.keys().any(|(d, _)| *d == date))
    }

    async fn upsert_many(&self, records: &[MergedMetric]) -> Result<usize> {
        self.upsert_calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let mut rows = self.rows.lock().await;
        for r in records {
            rows.insert((r.date, r.campaign_id.clone()), r.clone());
        }
        Ok(records.len())
    }

    async fn list_range(&self, range: DateRange) -> Result<Vec<MergedMetric>> {
        Ok(self
            .rows
            .lock()
            .await
            .values()
            .filter(|m| range.contains(m.date))
            .cloned()
            .collect())
    }
}
