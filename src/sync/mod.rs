pub mod etl;
pub mod outcome;
pub mod scheduler;

pub use etl::EtlService;
pub use outcome::ManualOutcome;
pub use scheduler::{SchedulerSettings, SchedulerState, SyncScheduler};
