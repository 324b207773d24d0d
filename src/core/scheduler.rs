//! Fan-out: one pipeline per target, run concurrently, results in target order.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::thread;

use crate::error::Error;
use crate::pipeline::{self, ExecutionResult, PipelineJob};
use crate::session::SessionFactory;
use crate::target::ExecutionTarget;

type Queue = Arc<Mutex<VecDeque<(usize, ExecutionTarget)>>>;

/// Number of workers for `targets` pipelines under an optional cap.
pub fn worker_count(targets: usize, max_concurrency: Option<usize>) -> usize {
    match max_concurrency {
        Some(cap) if cap > 0 => cap.min(targets),
        _ => targets,
    }
}

/// Run every target's pipeline and return exactly one result per target, in
/// the order the targets were given. A failure in one pipeline never stops
/// another.
pub fn fan_out(
    targets: &[ExecutionTarget],
    factory: Arc<dyn SessionFactory>,
    job: Arc<PipelineJob>,
    max_concurrency: Option<usize>,
) -> Vec<ExecutionResult> {
    if targets.is_empty() {
        return Vec::new();
    }

    let workers = worker_count(targets.len(), max_concurrency);
    log_status!(
        "run",
        "Dispatching {} pipeline(s) across {} worker(s)",
        targets.len(),
        workers
    );

    let queue: Queue = Arc::new(Mutex::new(targets.iter().cloned().enumerate().collect()));

    let handles: Vec<_> = (0..workers)
        .map(|_| {
            let queue = Arc::clone(&queue);
            let factory = Arc::clone(&factory);
            let job = Arc::clone(&job);
            thread::spawn(move || drain(&queue, factory.as_ref(), &job))
        })
        .collect();

    let mut slots: Vec<Option<ExecutionResult>> = vec![None; targets.len()];
    for handle in handles {
        // Pipelines catch their own panics, so a join error is unexpected; any
        // slots it leaves empty are filled below.
        if let Ok(finished) = handle.join() {
            for (index, result) in finished {
                slots[index] = Some(result);
            }
        }
    }

    slots
        .into_iter()
        .zip(targets)
        .map(|(slot, target)| {
            slot.unwrap_or_else(|| {
                aborted(target, "worker exited before finishing this target")
            })
        })
        .collect()
}

fn drain(
    queue: &Queue,
    factory: &dyn SessionFactory,
    job: &PipelineJob,
) -> Vec<(usize, ExecutionResult)> {
    let mut finished = Vec::new();

    loop {
        let next = match queue.lock() {
            Ok(mut queue) => queue.pop_front(),
            Err(poisoned) => poisoned.into_inner().pop_front(),
        };
        let Some((index, target)) = next else {
            break;
        };

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            pipeline::run(&target, factory, job)
        }))
        .unwrap_or_else(|_| aborted(&target, "pipeline panicked"));

        log_status!(
            "run",
            "{}: {}",
            target.name,
            if result.is_success() { "succeeded" } else { "failed" }
        );
        finished.push((index, result));
    }

    finished
}

fn aborted(target: &ExecutionTarget, reason: &str) -> ExecutionResult {
    let err = Error::internal_unexpected(format!("{}: {}", target.name, reason));
    ExecutionResult::not_started(target, vec![format!("error: {}", reason)], &err)
}
