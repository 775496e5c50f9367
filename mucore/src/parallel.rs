//! Fixed-size worker pool for map stages and single-threaded coordinated stages.
//!
//! Map stages pre-size their output to the input length. Inputs and outputs
//! are split into the same contiguous ranges, one per worker, so each worker
//! only ever writes the output slots matching its own input positions.
use std::{
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
    time::Instant,
};

use parking_lot::Mutex;

use crate::{
    ext::diag::Diagnostics,
    mudebug,
    utils::error::{MuError, MuResult},
};

/// One unit of work of a map stage.
///
/// A task value is owned by a single worker for the whole stage, so it can
/// carry worker-private state (a parsing context for instance).
pub trait Task: Send {
    type Input: Send;
    type Output: Send;

    /// Process one input.
    ///
    /// `Ok(None)` drops the item: the task is expected to have reported why
    /// through `diag`. An error is fatal for the whole stage, workers finish
    /// their current unit and pick no new one.
    fn run(&mut self, input: &mut Self::Input, diag: &Diagnostics) -> MuResult<Option<Self::Output>>;
}

/// Runs a [`Task`] over a slice of inputs on a fixed number of workers.
pub struct TaskExecutor<'a, T: Task> {
    diag: &'a Diagnostics,
    stage: String,
    tasks: Vec<T>,
}

impl<'a, T: Task> TaskExecutor<'a, T> {
    /// Create an executor with `workers` tasks built by `make_task` (which
    /// receives the worker index).
    pub fn new(
        diag: &'a Diagnostics,
        stage: impl Into<String>,
        workers: usize,
        make_task: impl FnMut(usize) -> T,
    ) -> Self {
        Self {
            diag,
            stage: stage.into(),
            tasks: (0..workers.max(1)).map(make_task).collect(),
        }
    }

    pub fn workers(&self) -> usize {
        self.tasks.len()
    }

    /// Run the stage. The output has one slot per input, in input order.
    pub fn execute(mut self, inputs: &mut [T::Input]) -> MuResult<Vec<Option<T::Output>>> {
        let start = Instant::now();
        let total = inputs.len();
        let mut outputs: Vec<Option<T::Output>> = (0..total).map(|_| None).collect();
        if total == 0 {
            self.diag
                .progress(&self.stage, self.tasks.len(), 0, 0, start.elapsed());
            return Ok(outputs);
        }

        let threads = self.tasks.len().min(total);
        let chunk = total.div_ceil(threads);
        let abort = AtomicBool::new(false);
        let done = AtomicUsize::new(0);
        let failure: Mutex<Option<MuError>> = Mutex::new(None);
        let diag = self.diag;

        let result = crossbeam::scope(|scope| -> std::io::Result<()> {
            let ranges = inputs.chunks_mut(chunk).zip(outputs.chunks_mut(chunk));
            for (worker, (task, (inputs, outputs))) in self.tasks.iter_mut().zip(ranges).enumerate()
            {
                let (abort, done, failure) = (&abort, &done, &failure);
                let stage = self.stage.as_str();
                scope
                    .builder()
                    .name(format!("{}-{}", stage, worker))
                    .spawn(move |_| {
                        for (input, slot) in inputs.iter_mut().zip(outputs.iter_mut()) {
                            if abort.load(Ordering::Acquire) {
                                mudebug!(diag, "{}: worker {} stops early", stage, worker);
                                break;
                            }
                            match task.run(input, diag) {
                                Ok(output) => *slot = output,
                                Err(e) => {
                                    abort.store(true, Ordering::Release);
                                    failure.lock().get_or_insert(e);
                                    break;
                                }
                            }
                            done.fetch_add(1, Ordering::Relaxed);
                        }
                    })?;
            }
            Ok(())
        });

        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(MuError::IoError(e)),
            Err(_) => return Err(MuError::WorkerPanicked(self.stage)),
        }
        if let Some(e) = failure.into_inner() {
            return Err(e);
        }

        self.diag.progress(
            &self.stage,
            threads,
            done.load(Ordering::Relaxed),
            total,
            start.elapsed(),
        );
        Ok(outputs)
    }
}

/// Runs a coordinated stage on the calling thread, reporting its progress
/// the same way map stages do.
pub struct SingleTaskExecutor<'a> {
    diag: &'a Diagnostics,
    stage: String,
}

impl<'a> SingleTaskExecutor<'a> {
    pub fn new(diag: &'a Diagnostics, stage: impl Into<String>) -> Self {
        Self {
            diag,
            stage: stage.into(),
        }
    }

    pub fn execute<R>(self, f: impl FnOnce() -> MuResult<R>) -> MuResult<R> {
        let start = Instant::now();
        let result = f()?;
        self.diag.progress(&self.stage, 1, 1, 1, start.elapsed());
        Ok(result)
    }
}
