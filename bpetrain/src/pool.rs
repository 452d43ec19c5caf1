//! Fork-join execution of independent jobs on a fixed number of threads.
//!
//! The pattern is a crossbeam channel used as a job queue:
//! - every job is queued up front, and the sender is dropped, so a worker knows the work is done
//!   when `recv` fails
//! - each worker folds the jobs it takes into an output value that only it owns
//! - the caller joins every worker and gets back one output per worker
//!
//! Workers never share mutable state; combining their outputs is left to the caller, on the
//! caller's thread, after the join.

use crate::error::*;
use crate::Result;
use crossbeam::channel::{unbounded, Receiver};
use std::thread;
use tracing::*;

/// Run `work` over every job on up to `workers` threads, and return each worker's output.
///
/// If any job fails, the failing worker empties the queue so the rest finish quickly, and the
/// first error (in worker order) is returned.  A worker that panics is reported as
/// [`TrainError::WorkerPanicked`].
pub(crate) fn fork_join<J, T, F>(
    worker_name: &'static str,
    jobs: Vec<J>,
    workers: usize,
    work: F,
) -> Result<Vec<T>>
where
    J: Send,
    T: Default + Send,
    F: Fn(J, &mut T) -> Result<()> + Sync,
{
    if jobs.is_empty() {
        return Ok(Vec::new());
    }

    // No point starting threads that will never get a job
    let workers = workers.clamp(1, jobs.len());
    debug!(worker = worker_name, workers, jobs = jobs.len(), "Starting workers");

    let (sender, receiver) = unbounded();
    for job in jobs {
        sender
            .send(job)
            .expect("BUG: the receiver is held by this function");
    }
    drop(sender);

    let current_span = Span::current();
    let work = &work;

    let joined = thread::scope(|scope| {
        let handles = (0..workers)
            .map(|id| {
                let receiver = receiver.clone();
                let current_span = current_span.clone();
                scope.spawn(move || {
                    // Propagate the span from the caller into this thread too
                    let span = debug_span!(
                        parent: &current_span,
                        "thread_worker",
                        worker = worker_name,
                        id
                    );
                    let _guard = span.enter();

                    run_worker(&receiver, work)
                })
            })
            .collect::<Vec<_>>();

        handles
            .into_iter()
            .map(|handle| handle.join())
            .collect::<Vec<_>>()
    });

    joined
        .into_iter()
        .map(|result| match result {
            Ok(output) => output,
            Err(_) => {
                error!(worker = worker_name, "Worker thread panicked");
                WorkerPanickedSnafu.fail()
            }
        })
        .collect()
}

fn run_worker<J, T, F>(receiver: &Receiver<J>, work: &F) -> Result<T>
where
    T: Default,
    F: Fn(J, &mut T) -> Result<()>,
{
    let mut output = T::default();
    let mut completed = 0usize;

    while let Ok(job) = receiver.recv() {
        if let Err(e) = work(job, &mut output) {
            error!(error = %e, "Worker failed");

            // Nobody will use the results of the remaining jobs
            while receiver.try_recv().is_ok() {}

            return Err(e);
        }
        completed += 1;
    }

    debug!(completed, "Worker completed successfully");
    Ok(output)
}
