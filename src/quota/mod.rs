pub mod clock;
pub mod tracker;

pub use clock::{Clock, SystemClock};
pub use tracker::{QuotaStats, QuotaTracker};

#[cfg(test)]
pub use clock::ManualClock;
