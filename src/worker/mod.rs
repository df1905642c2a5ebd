mod scheduler;

pub use scheduler::{BatchFileResult, BatchScheduler, DEFAULT_MAX_CONCURRENT};
