//! Bounded worker pools.
//!
//! Work runs on private rayon pools (never the global one). Analytics jobs
//! are memory-heavy, so they run in batches with a fresh pool per batch and
//! only one batch alive at a time. Results are handed back to the calling
//! thread as each task finishes.
//!
//! A panicking task is caught and reported. Because a panic inside the
//! analytics engine usually means the process is short on memory or threads,
//! the current batch is drained and the remaining batches are not started.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use thiserror::Error;
use tracing::{error, info, warn};

/// Jobs per analytics batch.
pub const BATCH_SIZE: usize = 50;
/// Workers per analytics batch.
pub const MAX_WORKERS: usize = 6;
/// Engine threads per analytics worker.
pub const POLARS_MAX_THREADS: usize = 4;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimits {
    pub batch_size: usize,
    pub max_workers: usize,
}

impl BatchLimits {
    /// Batching for tick analytics.
    pub fn analytics() -> Self {
        Self {
            batch_size: BATCH_SIZE,
            max_workers: MAX_WORKERS,
        }
    }

    /// One pool for everything, for I/O-bound work.
    pub fn single_pool(max_workers: usize) -> Self {
        Self {
            batch_size: usize::MAX,
            max_workers,
        }
    }
}

/// How one task ended.
#[derive(Debug)]
pub enum TaskOutcome<R> {
    Done(R),
    /// The task panicked; carries the panic message.
    Panicked(String),
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub batches: usize,
    pub completed: usize,
    pub panicked: usize,
    /// Never started, because of cancellation or an earlier panic.
    pub skipped: usize,
    pub aborted: bool,
}

enum Message<T, R> {
    Finished(T, TaskOutcome<R>),
    Skipped,
}

pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}

/// Run `task` over `items` on bounded pools, calling `on_done` on the
/// calling thread as each task finishes.
pub fn run_in_batches<T, R, F, H>(
    items: Vec<T>,
    limits: BatchLimits,
    cancel: &AtomicBool,
    task: F,
    mut on_done: H,
) -> Result<BatchReport, SchedulerError>
where
    T: Send,
    R: Send,
    F: Fn(&T) -> R + Sync,
    H: FnMut(T, TaskOutcome<R>),
{
    let mut report = BatchReport::default();
    let total = items.len();
    let batch_size = limits.batch_size.max(1);
    let mut remaining = items.into_iter();

    loop {
        let batch: Vec<T> = remaining.by_ref().take(batch_size).collect();
        if batch.is_empty() {
            break;
        }
        if report.aborted || cancel.load(Ordering::SeqCst) {
            report.skipped += batch.len();
            continue;
        }

        report.batches += 1;
        info!(
            batch = report.batches,
            size = batch.len(),
            done = report.completed + report.panicked,
            total,
            "starting batch"
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(limits.max_workers.max(1))
            .thread_name(|i| format!("tradevault-worker-{i}"))
            .build()?;

        let (tx, rx) = mpsc::channel::<Message<T, R>>();
        let task = &task;
        let mut batch_panicked = false;

        pool.in_place_scope(|scope| {
            for item in batch {
                let tx = tx.clone();
                scope.spawn(move |_| {
                    if cancel.load(Ordering::SeqCst) {
                        let _ = tx.send(Message::Skipped);
                        return;
                    }
                    let outcome = match catch_unwind(AssertUnwindSafe(|| task(&item))) {
                        Ok(r) => TaskOutcome::Done(r),
                        Err(payload) => TaskOutcome::Panicked(panic_message(payload.as_ref())),
                    };
                    let _ = tx.send(Message::Finished(item, outcome));
                });
            }
            drop(tx);

            for message in rx.iter() {
                match message {
                    Message::Skipped => report.skipped += 1,
                    Message::Finished(item, outcome) => {
                        match &outcome {
                            TaskOutcome::Done(_) => report.completed += 1,
                            TaskOutcome::Panicked(msg) => {
                                error!(panic = %msg, "worker panicked");
                                report.panicked += 1;
                                batch_panicked = true;
                            }
                        }
                        on_done(item, outcome);
                    }
                }
            }
        });

        if batch_panicked {
            warn!("worker pool broken by a panic, remaining batches will not run");
            report.aborted = true;
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn every_item_is_reported_once() {
        let mut seen = Vec::new();
        let report = run_in_batches(
            (0..23).collect(),
            BatchLimits { batch_size: 5, max_workers: 3 },
            &AtomicBool::new(false),
            |n: &i32| n * 2,
            |n, outcome| {
                if let TaskOutcome::Done(r) = outcome {
                    assert_eq!(r, n * 2);
                }
                seen.push(n);
            },
        )
        .unwrap();

        seen.sort();
        assert_eq!(seen, (0..23).collect::<Vec<_>>());
        assert_eq!(report.batches, 5);
        assert_eq!(report.completed, 23);
        assert!(!report.aborted);
    }

    #[test]
    fn panic_aborts_later_batches() {
        let mut panicked = Vec::new();
        let report = run_in_batches(
            (0..10).collect(),
            BatchLimits { batch_size: 4, max_workers: 2 },
            &AtomicBool::new(false),
            |n: &i32| {
                if *n == 2 {
                    panic!("out of memory");
                }
                *n
            },
            |n, outcome| {
                if let TaskOutcome::Panicked(msg) = outcome {
                    panicked.push((n, msg));
                }
            },
        )
        .unwrap();

        assert_eq!(panicked, vec![(2, "out of memory".to_string())]);
        assert!(report.aborted);
        assert_eq!(report.batches, 1);
        assert_eq!(report.completed, 3);
        assert_eq!(report.skipped, 6);
    }

    #[test]
    fn cancelled_before_start_skips_everything() {
        let calls = AtomicUsize::new(0);
        let report = run_in_batches(
            vec![1, 2, 3],
            BatchLimits::analytics(),
            &AtomicBool::new(true),
            |_: &i32| calls.fetch_add(1, Ordering::SeqCst),
            |_, _| {},
        )
        .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(report.skipped, 3);
    }

    #[test]
    fn pool_size_is_bounded() {
        let threads = std::sync::Mutex::new(HashSet::new());
        run_in_batches(
            (0..40).collect(),
            BatchLimits::single_pool(3),
            &AtomicBool::new(false),
            |_: &i32| {
                threads
                    .lock()
                    .unwrap()
                    .insert(std::thread::current().name().map(str::to_string));
                std::thread::sleep(std::time::Duration::from_millis(1));
            },
            |_, _| {},
        )
        .unwrap();
        assert!(threads.lock().unwrap().len() <= 3);
    }

    proptest! {
        #[test]
        fn batches_partition_the_input(n in 0usize..120, size in 1usize..60) {
            let mut count = 0;
            let report = run_in_batches(
                (0..n).collect(),
                BatchLimits { batch_size: size, max_workers: 2 },
                &AtomicBool::new(false),
                |x: &usize| *x,
                |_, _| count += 1,
            )
            .unwrap();
            prop_assert_eq!(count, n);
            prop_assert_eq!(report.batches, n.div_ceil(size));
        }
    }
}
