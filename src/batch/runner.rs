//! Batch scheduling loop: bounded rounds, unordered intra-batch completion,
//! per-item failure isolation, optional work expansion between rounds.

use crate::batch::progress::ProgressTracker;
use anyhow::Result;
use futures_util::stream::{FuturesUnordered, StreamExt};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use tracing::{debug, warn};

/// Boxed future produced by a task factory.
pub type TaskFuture<T> = Pin<Box<dyn Future<Output = Result<T>> + Send>>;

/// Deferred unit of asynchronous work: invoked once, yields one value or one
/// error. Owned by the caller; the runner holds it only until its batch is
/// dispatched.
pub type TaskFactory<T> = Box<dyn FnOnce() -> TaskFuture<T> + Send>;

/// Derives new task factories from a batch's successful results. New work
/// joins the tail of the pending queue and becomes eligible in a later
/// round, never the current one. A panic here aborts the whole run:
/// expansion logic is caller code and a panic in it is a caller bug.
pub type ExpandFn<T> = Box<dyn FnMut(&[T]) -> Vec<TaskFactory<T>> + Send>;

/// Build a [`TaskFactory`] from an async closure.
pub fn task<T, F, Fut>(f: F) -> TaskFactory<T>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    Box::new(move || Box::pin(f()))
}

/// Per-slot result of a run, position-stable against the order tasks were
/// queued. Failed slots stay in place instead of being dropped, so callers
/// can zip outcomes against their input list without misalignment.
#[derive(Debug)]
pub enum TaskOutcome<T> {
    Success(T),
    Failure(anyhow::Error),
}

impl<T> TaskOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Success(_))
    }

    pub fn success(self) -> Option<T> {
        match self {
            TaskOutcome::Success(value) => Some(value),
            TaskOutcome::Failure(_) => None,
        }
    }

    pub fn success_ref(&self) -> Option<&T> {
        match self {
            TaskOutcome::Success(value) => Some(value),
            TaskOutcome::Failure(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&anyhow::Error> {
        match self {
            TaskOutcome::Success(_) => None,
            TaskOutcome::Failure(err) => Some(err),
        }
    }
}

/// Options for a batch run.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Maximum number of tasks dispatched together. Values below 1 are
    /// treated as 1.
    pub batch_size: usize,

    /// Maximum number of batch rounds. `None` runs until the queue drains;
    /// `Some(0)` returns immediately with zero dispatches.
    pub max_rounds: Option<usize>,

    /// Ceiling on total tasks dispatched across the whole run. Guards
    /// against an expansion function that keeps producing large amounts of
    /// work within the round bound. `None` disables the cap.
    pub max_tasks: Option<usize>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            batch_size: 100,
            max_rounds: Some(5),
            max_tasks: None,
        }
    }
}

/// Run task factories in batches, returning one outcome per dispatched task.
///
/// Outcomes are batch-major and position-stable: slot `i` of a batch holds
/// the result of the `i`-th factory drawn for that batch, whatever order
/// completions arrived in. Batch N is fully resolved, recorded, and expanded
/// before batch N+1 dispatches.
///
/// Inside a batch every factory is polled concurrently on the caller's task
/// and completions are consumed as they arrive, so a slow item neither
/// delays a fast sibling's progress update nor keeps it out of the
/// expansion input. A failing task is counted and recorded in its slot;
/// siblings are unaffected and there is no retry.
pub async fn run_batches_tagged<T>(
    tasks: Vec<TaskFactory<T>>,
    options: &BatchOptions,
    tracker: Option<&ProgressTracker>,
    mut expand: Option<ExpandFn<T>>,
) -> Vec<TaskOutcome<T>> {
    let batch_size = options.batch_size.max(1);
    let mut pending: VecDeque<TaskFactory<T>> = tasks.into();
    let mut outcomes: Vec<TaskOutcome<T>> = Vec::new();
    let mut dispatched = 0usize;
    let mut round = 0usize;

    while !pending.is_empty() && options.max_rounds.map_or(true, |max| round < max) {
        let allowance = match options.max_tasks {
            Some(cap) => {
                let left = cap.saturating_sub(dispatched);
                if left == 0 {
                    warn!(
                        cap,
                        dropped = pending.len(),
                        "task ceiling reached, dropping remaining work"
                    );
                    break;
                }
                left.min(batch_size)
            }
            None => batch_size,
        };

        let batch_len = allowance.min(pending.len());
        let batch: Vec<TaskFactory<T>> = pending.drain(..batch_len).collect();
        dispatched += batch_len;

        if let Some(tracker) = tracker {
            tracker.add_sent(batch_len);
        }

        let mut in_flight: FuturesUnordered<_> = batch
            .into_iter()
            .enumerate()
            .map(|(slot, factory)| async move { (slot, factory().await) })
            .collect();

        let mut slots: Vec<Option<SlotOutcome>> = Vec::new();
        slots.resize_with(batch_len, || None);
        let mut batch_results: Vec<T> = Vec::new();

        while let Some((slot, result)) = in_flight.next().await {
            match result {
                Ok(value) => {
                    slots[slot] = Some(SlotOutcome::Success(batch_results.len()));
                    batch_results.push(value);
                    if let Some(tracker) = tracker {
                        tracker.add_completed(1);
                    }
                }
                Err(err) => {
                    debug!(slot, error = %err, "task failed");
                    slots[slot] = Some(SlotOutcome::Failure(err));
                    if let Some(tracker) = tracker {
                        tracker.add_failed(1);
                    }
                }
            }
        }

        if let Some(expand) = expand.as_mut() {
            pending.extend(expand(&batch_results));
        }

        // Re-thread the completion-ordered successes back into slot order.
        let mut values: Vec<Option<T>> = batch_results.into_iter().map(Some).collect();
        for state in slots {
            match state {
                Some(SlotOutcome::Success(idx)) => {
                    if let Some(value) = values[idx].take() {
                        outcomes.push(TaskOutcome::Success(value));
                    }
                }
                Some(SlotOutcome::Failure(err)) => outcomes.push(TaskOutcome::Failure(err)),
                None => unreachable!("every dispatched slot resolves exactly once"),
            }
        }

        round += 1;
    }

    outcomes
}

/// Run task factories in batches, returning successful values only.
///
/// The successes-only view of [`run_batches_tagged`]: failed tasks are
/// absent, visible solely through the tracker's `failed` counter. Callers
/// that reconcile results positionally against their input should use the
/// tagged variant instead.
pub async fn run_batches<T>(
    tasks: Vec<TaskFactory<T>>,
    options: &BatchOptions,
    tracker: Option<&ProgressTracker>,
    expand: Option<ExpandFn<T>>,
) -> Vec<T> {
    run_batches_tagged(tasks, options, tracker, expand)
        .await
        .into_iter()
        .filter_map(TaskOutcome::success)
        .collect()
}

enum SlotOutcome {
    /// Index into the batch's completion-ordered success buffer.
    Success(usize),
    Failure(anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    fn value_task(value: usize) -> TaskFactory<usize> {
        task(move || async move { Ok(value) })
    }

    fn failing_task(message: &'static str) -> TaskFactory<usize> {
        task(move || async move { Err(anyhow!(message)) })
    }

    #[tokio::test]
    async fn test_empty_input_returns_empty() {
        let results: Vec<usize> =
            run_batches(Vec::new(), &BatchOptions::default(), None, None).await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_zero_batch_size_is_clamped() {
        let tasks = vec![value_task(1), value_task(2)];
        let options = BatchOptions {
            batch_size: 0,
            max_rounds: None,
            max_tasks: None,
        };
        let mut results = run_batches(tasks, &options, None, None).await;
        results.sort_unstable();
        assert_eq!(results, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_tagged_outcomes_are_position_stable() {
        let tasks = vec![
            value_task(10),
            failing_task("boom"),
            value_task(30),
            failing_task("bang"),
        ];
        let options = BatchOptions {
            batch_size: 4,
            max_rounds: None,
            max_tasks: None,
        };
        let outcomes = run_batches_tagged(tasks, &options, None, None).await;

        assert_eq!(outcomes.len(), 4);
        assert_eq!(outcomes[0].success_ref(), Some(&10));
        assert_eq!(outcomes[1].failure().map(|e| e.to_string()).as_deref(), Some("boom"));
        assert_eq!(outcomes[2].success_ref(), Some(&30));
        assert_eq!(outcomes[3].failure().map(|e| e.to_string()).as_deref(), Some("bang"));
    }

    #[tokio::test]
    async fn test_task_ceiling_stops_dispatch() {
        let tracker = ProgressTracker::new();
        let tasks: Vec<TaskFactory<usize>> = (0..10).map(value_task).collect();
        let options = BatchOptions {
            batch_size: 3,
            max_rounds: None,
            max_tasks: Some(7),
        };
        let results = run_batches(tasks, &options, Some(&tracker), None).await;

        // 3 + 3 + 1: the last batch is trimmed to the remaining allowance.
        assert_eq!(results.len(), 7);
        assert_eq!(tracker.snapshot().sent, 7);
    }

    #[tokio::test]
    async fn test_expansion_joins_queue_tail() {
        let tasks = vec![value_task(0), value_task(1), value_task(2)];
        let expand: ExpandFn<usize> = Box::new(|batch: &[usize]| {
            batch
                .iter()
                .filter(|v| **v < 2)
                .map(|v| value_task(v + 100))
                .collect()
        });
        let options = BatchOptions {
            batch_size: 2,
            max_rounds: None,
            max_tasks: None,
        };
        let results = run_batches(tasks, &options, None, Some(expand)).await;

        // Round 1: [0, 1] -> spawns 100, 101. Round 2: [2, 100]. Round 3: [101].
        let mut sorted = results.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![0, 1, 2, 100, 101]);
        // Cross-batch order: originals resolve before expanded work.
        assert_eq!(&results[..2], &[0, 1]);
    }
}
