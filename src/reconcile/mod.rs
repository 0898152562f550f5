pub mod merge;
pub mod summary;

pub use merge::{compute_cpa, filter_by_range, merge};
pub use summary::SyncSummary;
