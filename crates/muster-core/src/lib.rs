//! muster-core: Bounded-concurrency fleet run engine
//!
//! Runs one pluggable action against every target in a list, with a hard
//! cap on simultaneous work, and turns the per-target results into a
//! structured report. Unreachable hosts, failing actions, timeouts, and
//! panics all become report rows; they never take the run down.
//!
//! Actions come from `muster-exec`; this crate only sees the `HostAction`
//! trait.

pub mod aggregator;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod limiter;
pub mod outcome;
pub mod probe;
pub mod progress;
pub mod target;
pub mod writer;

pub use aggregator::Aggregator;
pub use config::RunConfig;
pub use dispatcher::Dispatcher;
pub use error::CoreError;
pub use events::RunEvent;
pub use limiter::{Slot, SlotPool};
pub use outcome::{Outcome, RunReport, RunSummary, TaskStatus};
pub use probe::{AlwaysReachable, ReachabilityProbe, TcpProbe};
pub use progress::{LogProgress, NullProgress, ProgressObserver};
pub use target::{Target, parse_targets, targets_from_file};
pub use writer::{ReportFormat, ReportWriter};
