pub mod models;
pub mod store;

#[cfg(test)]
pub mod memory;

pub use store::{MetricStore, SqliteStore};
