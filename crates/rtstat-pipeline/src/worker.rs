//! Background analysis on a dedicated thread.
//!
//! [`AnalysisWorker`] runs one [`AnalysisJob`] off the calling thread.
//! The caller keeps the worker and, once it has finished, hands its
//! output to [`Session::publish`](crate::Session::publish), which refuses
//! results from superseded generations.

use std::thread::{self, JoinHandle};

use crate::cancel::CancelToken;
use crate::session::{AnalysisJob, JobOutput};
use crate::types::PipelineError;

/// A running or finished background job.
#[derive(Debug)]
pub struct AnalysisWorker {
    generation: u64,
    cancel: CancelToken,
    handle: JoinHandle<Result<JobOutput, PipelineError>>,
}

impl AnalysisWorker {
    /// Start `job` on a new thread.
    #[must_use]
    pub fn spawn(job: AnalysisJob) -> Self {
        let generation = job.generation();
        let cancel = job.cancel_token();
        let handle = thread::spawn(move || {
            let result = job.run();
            if let Err(e) = &result {
                tracing::debug!(generation, error = %e, "analysis job stopped");
            }
            result
        });
        Self {
            generation,
            cancel,
            handle,
        }
    }

    /// Generation of the job being run.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Ask the job to stop at the next frame boundary.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the thread has finished.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the job and take its output.
    ///
    /// # Errors
    ///
    /// Returns the job's own error, or [`PipelineError::WorkerLost`] if
    /// the thread panicked.
    pub fn join(self) -> Result<JobOutput, PipelineError> {
        self.handle
            .join()
            .map_err(|_| PipelineError::WorkerLost)?
    }
}
