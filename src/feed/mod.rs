pub mod loader;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{ConversionRecord, SpendRecord};

pub use loader::JsonFeedSource;

/// Snapshot source for the two daily feeds. Read again on every sync run.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn load_spend(&self) -> Result<Vec<SpendRecord>>;
    async fn load_conversions(&self) -> Result<Vec<ConversionRecord>>;
}

#[cfg(test)]
pub use loader::InMemoryFeeds;
