//! Concurrent batch execution engine.
//!
//! Runs independent asynchronous work items in fixed-size batches with
//! unordered completion inside each batch, publishes progress to observers,
//! and optionally feeds newly discovered work back into the queue for a
//! bounded number of rounds.

pub mod progress;
pub mod runner;

pub use progress::{ProgressObserver, ProgressSnapshot, ProgressTracker};
pub use runner::{
    run_batches, run_batches_tagged, task, BatchOptions, ExpandFn, TaskFactory, TaskFuture,
    TaskOutcome,
};
