use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::error::{AppError, Result};
use crate::feed::FeedSource;
use crate::types::{ConversionRecord, SpendRecord};

/// Spend feed row as written by the exporter. `spend` may be a JSON number or string.
#[derive(Debug, Deserialize)]
struct RawSpend {
    date: NaiveDate,
    campaign_id: String,
    spend: Decimal,
}

#[derive(Debug, Deserialize)]
struct RawConversion {
    date: NaiveDate,
    campaign_id: String,
    conversions: i64,
}

/// Reads both feeds from JSON array files on local disk.
#[derive(Debug, Clone)]
pub struct JsonFeedSource {
    spend_path: PathBuf,
    conversions_path: PathBuf,
}

impl JsonFeedSource {
    pub fn new(spend_path: impl Into<PathBuf>, conversions_path: impl Into<PathBuf>) -> Self {
        Self {
            spend_path: spend_path.into(),
            conversions_path: conversions_path.into(),
        }
    }
}

#[async_trait]
impl FeedSource for JsonFeedSource {
    async fn load_spend(&self) -> Result<Vec<SpendRecord>> {
        let raw: Vec<RawSpend> = read_array(&self.spend_path).await?;
        let records = raw
            .into_iter()
            .enumerate()
            .map(|(index, r)| validate_spend(index, r))
            .collect::<Result<Vec<_>>>()?;
        debug!(path = %self.spend_path.display(), count = records.len(), "Loaded spend feed");
        Ok(records)
    }

    async fn load_conversions(&self) -> Result<Vec<ConversionRecord>> {
        let raw: Vec<RawConversion> = read_array(&self.conversions_path).await?;
        let records = raw
            .into_iter()
            .enumerate()
            .map(|(index, r)| validate_conversion(index, r))
            .collect::<Result<Vec<_>>>()?;
        debug!(path = %self.conversions_path.display(), count = records.len(), "Loaded conversions feed");
        Ok(records)
    }
}

async fn read_array<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let bytes = tokio::fs::read(path).await.map_err(|source| AppError::FeedRead {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|source| AppError::FeedParse {
        path: path.to_path_buf(),
        source,
    })
}

fn validate_spend(index: usize, raw: RawSpend) -> Result<SpendRecord> {
    let invalid = |reason: String| AppError::InvalidRecord {
        feed: "spend",
        index,
        reason,
    };
    if raw.spend.is_sign_negative() && !raw.spend.is_zero() {
        return Err(invalid(format!("negative spend {}", raw.spend)));
    }
    Ok(SpendRecord {
        date: raw.date,
        campaign_id: raw.campaign_id,
        spend: raw.spend,
    })
}

fn validate_conversion(index: usize, raw: RawConversion) -> Result<ConversionRecord> {
    let invalid = |reason: String| AppError::InvalidRecord {
        feed: "conversions",
        index,
        reason,
    };
    let conversions = u32::try_from(raw.conversions)
        .map_err(|_| invalid(format!("conversions out of range: {}", raw.conversions)))?;
    Ok(ConversionRecord {
        date: raw.date,
        campaign_id: raw.campaign_id,
        conversions,
    })
}

/// Feeds held in memory. Contents can be swapped between runs.
#[cfg(test)]
#[derive(Default)]
pub struct InMemoryFeeds {
    spend: std::sync::Mutex<Vec<SpendRecord>>,
    conversions: std::sync::Mutex<Vec<ConversionRecord>>,
}

#[cfg(test)]
impl InMemoryFeeds {
    pub fn new(spend: Vec<SpendRecord>, conversions: Vec<ConversionRecord>) -> Self {
        Self {
            spend: std::sync::Mutex::new(spend),
            conversions: std::sync::Mutex::new(conversions),
        }
    }

    pub fn set_spend(&self, spend: Vec<SpendRecord>) {
        *self.spend.lock().unwrap() = spend;
    }
}

#[cfg(test)]
#[async_trait]
impl FeedSource for InMemoryFeeds {
    async fn load_spend(&self) -> Result<Vec<SpendRecord>> {
        Ok(self.spend.lock().unwrap().clone())
    }

    async fn load_conversions(&self) -> Result<Vec<ConversionRecord>> {
        Ok(self.conversions.lock().unwrap().clone())
    }
}
