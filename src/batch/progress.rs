//! Progress counters with a publish/subscribe interface.

use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Immutable counter snapshot published to observers after every update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// Tasks dispatched so far. An item counts as sent the instant its batch
    /// is dispatched, before it resolves, so `sent >= completed + failed`
    /// holds at every snapshot.
    pub sent: usize,
    /// Tasks that resolved successfully.
    pub completed: usize,
    /// Tasks that resolved with an error.
    pub failed: usize,
}

impl ProgressSnapshot {
    /// Tasks dispatched but not yet resolved.
    pub fn in_flight(&self) -> usize {
        self.sent.saturating_sub(self.completed + self.failed)
    }

    /// Tasks that have resolved either way.
    pub fn resolved(&self) -> usize {
        self.completed + self.failed
    }
}

/// Callback invoked with the post-update snapshot.
pub type ProgressObserver = Box<dyn Fn(ProgressSnapshot) + Send + Sync>;

struct TrackerState {
    snapshot: ProgressSnapshot,
    observers: Vec<ProgressObserver>,
}

/// Tracks the counters of one batch run and fans snapshots out to observers.
///
/// Observers are appended without de-duplication and are never removed; they
/// are notified synchronously, in registration order, after every counter
/// mutation. The delta application and the notification sweep form a single
/// critical section, so an observer never sees a partially applied update.
/// Observers must not panic and must not call back into the tracker.
///
/// A tracker belongs to one logical run. Independent runs each need their
/// own instance.
pub struct ProgressTracker {
    state: Mutex<TrackerState>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(TrackerState {
                snapshot: ProgressSnapshot::default(),
                observers: Vec::new(),
            }),
        }
    }

    /// Register an observer. It receives every snapshot from now on.
    pub fn register(&self, observer: impl Fn(ProgressSnapshot) + Send + Sync + 'static) {
        if let Ok(mut state) = self.state.lock() {
            state.observers.push(Box::new(observer));
        }
    }

    /// Apply counter deltas and notify every observer with the new snapshot.
    pub fn update(&self, sent: usize, completed: usize, failed: usize) {
        if let Ok(mut state) = self.state.lock() {
            state.snapshot.sent += sent;
            state.snapshot.completed += completed;
            state.snapshot.failed += failed;
            let snapshot = state.snapshot;
            for observer in &state.observers {
                observer(snapshot);
            }
        }
    }

    /// Record `n` tasks as dispatched.
    pub fn add_sent(&self, n: usize) {
        self.update(n, 0, 0);
    }

    /// Record `n` tasks as successfully resolved.
    pub fn add_completed(&self, n: usize) {
        self.update(0, n, 0);
    }

    /// Record `n` tasks as failed.
    pub fn add_failed(&self, n: usize) {
        self.update(0, 0, n);
    }

    /// Current counter values.
    pub fn snapshot(&self) -> ProgressSnapshot {
        self.state
            .lock()
            .map(|state| state.snapshot)
            .unwrap_or_default()
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_updates_accumulate_in_call_order() {
        let tracker = ProgressTracker::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        tracker.register(move |snapshot| sink.lock().unwrap().push(snapshot));

        tracker.add_sent(3);
        tracker.add_completed(1);
        tracker.add_failed(1);
        tracker.add_completed(1);

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                ProgressSnapshot {
                    sent: 3,
                    completed: 0,
                    failed: 0
                },
                ProgressSnapshot {
                    sent: 3,
                    completed: 1,
                    failed: 0
                },
                ProgressSnapshot {
                    sent: 3,
                    completed: 1,
                    failed: 1
                },
                ProgressSnapshot {
                    sent: 3,
                    completed: 2,
                    failed: 1
                },
            ]
        );
    }

    #[test]
    fn test_sent_dominates_resolved_at_every_snapshot() {
        let tracker = ProgressTracker::new();
        let ok = Arc::new(Mutex::new(true));
        let flag = ok.clone();
        tracker.register(move |snapshot| {
            if snapshot.sent < snapshot.completed + snapshot.failed {
                *flag.lock().unwrap() = false;
            }
        });

        tracker.add_sent(5);
        for _ in 0..4 {
            tracker.add_completed(1);
        }
        tracker.add_failed(1);
        tracker.add_sent(2);
        tracker.add_completed(2);

        assert!(*ok.lock().unwrap());
        let last = tracker.snapshot();
        assert_eq!(last.sent, 7);
        assert_eq!(last.resolved(), 7);
        assert_eq!(last.in_flight(), 0);
    }

    #[test]
    fn test_observers_notified_in_registration_order_without_dedup() {
        let tracker = ProgressTracker::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for id in 0..3 {
            let sink = order.clone();
            tracker.register(move |_| sink.lock().unwrap().push(id));
        }
        // Same logical observer registered twice fires twice.
        let sink = order.clone();
        tracker.register(move |_| sink.lock().unwrap().push(0));

        tracker.add_sent(1);
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 0]);
    }

    #[test]
    fn test_snapshot_without_observers() {
        let tracker = ProgressTracker::new();
        tracker.update(10, 4, 2);
        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.sent, 10);
        assert_eq!(snapshot.completed, 4);
        assert_eq!(snapshot.failed, 2);
        assert_eq!(snapshot.in_flight(), 4);
    }
}
