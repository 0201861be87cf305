//! Run execution and run comparison. Both drive independent, possibly failing calls through a
//! bounded thread pool and record per-item failures as data.

mod evaluator;
mod executor;
mod pool;
mod prompt;
mod retry;
mod snapshot;
mod summary;
#[cfg(test)]
mod tests;

pub use evaluator::{CompareOptions, compare_configured_runs, compare_runs};
pub use executor::{RunOptions, execute_configured_run, execute_run};
pub use pool::{Progress, ProgressCallback};
pub use retry::RetryPolicy;
pub use snapshot::{snapshot_checksum, verify_run_snapshot};
pub use summary::{ComparisonSummary, SystemSummary};
