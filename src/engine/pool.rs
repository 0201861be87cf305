use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::thread;

use rayon::ThreadPoolBuilder;
use rayon::prelude::*;
use serde::Serialize;

use crate::error::EngineError;

/// Running totals handed to progress callbacks after every completed item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub done: usize,
    pub total: usize,
    pub ok: usize,
    pub failed: usize,
}

pub type ProgressCallback<'a> = &'a mut dyn FnMut(Progress);

pub(super) struct ProgressTracker<'a> {
    current: Progress,
    callback: Option<ProgressCallback<'a>>,
}

impl<'a> ProgressTracker<'a> {
    pub(super) fn new(total: usize, callback: Option<ProgressCallback<'a>>) -> Self {
        Self {
            current: Progress {
                done: 0,
                total,
                ok: 0,
                failed: 0,
            },
            callback,
        }
    }

    pub(super) fn record(&mut self, ok: bool) {
        self.current.done += 1;
        if ok {
            self.current.ok += 1;
        } else {
            self.current.failed += 1;
        }
        if let Some(callback) = self.callback.as_mut() {
            callback(self.current);
        }
    }
}

/// Runs `work` over every item on a rayon pool of `concurrency` threads and returns the outputs
/// in input order.
///
/// Workers report `is_ok(&output)` over a channel; the tracker is driven from the calling thread
/// only, so progress callbacks never run concurrently.
pub(super) fn run_ordered<T, R, W, K>(
    items: &[T],
    concurrency: usize,
    work: W,
    is_ok: K,
    tracker: &mut ProgressTracker<'_>,
) -> Result<Vec<R>, EngineError>
where
    T: Sync,
    R: Send,
    W: Fn(usize, &T) -> R + Sync,
    K: Fn(&R) -> bool + Sync,
{
    if concurrency <= 1 || items.len() <= 1 {
        let mut outputs = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            let output = work(index, item);
            tracker.record(is_ok(&output));
            outputs.push(output);
        }
        return Ok(outputs);
    }

    let pool = ThreadPoolBuilder::new()
        .num_threads(concurrency.min(items.len()))
        .thread_name(|index| format!("rageval-worker-{index}"))
        .build()?;
    let (sender, receiver) = mpsc::channel::<bool>();

    thread::scope(|scope| {
        let pool = &pool;
        let work = &work;
        let is_ok = &is_ok;
        let handle = scope.spawn(move || {
            pool.install(|| {
                items
                    .par_iter()
                    .enumerate()
                    .map_with(sender, |sender, (index, item)| {
                        let output = work(index, item);
                        // The receiver outlives every worker.
                        let _ = sender.send(is_ok(&output));
                        output
                    })
                    .collect::<Vec<R>>()
            })
        });

        for ok in receiver {
            tracker.record(ok);
        }

        match handle.join() {
            Ok(outputs) => Ok(outputs),
            Err(payload) => panic::resume_unwind(payload),
        }
    })
}

/// Calls `op`, turning a panic into an error message so one bad item cannot take down its siblings.
pub(super) fn isolate<T, E, F>(op: F) -> Result<T, String>
where
    E: std::fmt::Display,
    F: FnOnce() -> Result<T, E>,
{
    match panic::catch_unwind(AssertUnwindSafe(op)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(err.to_string()),
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|value| value.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(format!("panicked: {message}"))
        }
    }
}
