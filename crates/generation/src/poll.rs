use crate::{
    GenerationBackend, GenerationError, GenerationRequest, GenerationResult, GenerationTask,
    PollStep, Timer,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Task shared between the runner and whoever displays it
pub type SharedTask = Arc<Mutex<GenerationTask>>;

/// Poll cadence for long-running jobs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    pub initial_delay_ms: u64,
    pub interval_ms: u64,
    pub max_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1_000,
            interval_ms: 5_000,
            max_attempts: 60,
        }
    }
}

impl PollConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Drives a [`SharedTask`] from submit to a terminal state.
///
/// The task lock is never held across an await, so readers see every
/// intermediate state.
#[derive(Clone)]
pub struct PollRunner {
    backend: Arc<dyn GenerationBackend>,
    timer: Arc<dyn Timer>,
    config: PollConfig,
}

impl PollRunner {
    pub fn new(
        backend: Arc<dyn GenerationBackend>,
        timer: Arc<dyn Timer>,
        config: PollConfig,
    ) -> Self {
        Self {
            backend,
            timer,
            config,
        }
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    /// Submit `prompt` and, for long-running kinds, poll until the task settles.
    pub async fn execute(
        &self,
        task: &SharedTask,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<GenerationResult, GenerationError> {
        let request = task.lock().begin_submit(prompt)?;
        self.submit(task, request, cancel).await
    }

    /// Send a request the task already moved to `Submitting` for, then poll
    /// if the job runs long.
    pub async fn submit(
        &self,
        task: &SharedTask,
        request: GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<GenerationResult, GenerationError> {
        tracing::info!(
            target: "generation",
            kind = %request.kind,
            scene = %request.scene_ref,
            "submitting generation"
        );

        let submitted = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(task.lock().cancel()),
            submitted = self.backend.submit(&request) => submitted,
        };
        let step = match submitted {
            Ok(submission) => task.lock().on_submit_ok(submission)?,
            Err(err) => return Err(task.lock().on_submit_err(err)),
        };

        match step {
            PollStep::Done(result) => Ok(result),
            PollStep::Pending => self.run(task, cancel).await,
        }
    }

    /// Poll a task that is already `Processing`.
    pub async fn run(
        &self,
        task: &SharedTask,
        cancel: &CancellationToken,
    ) -> Result<GenerationResult, GenerationError> {
        let job_id = {
            let guard = task.lock();
            match guard.job_ref() {
                Some(job_id) => job_id.to_string(),
                None => {
                    return Err(GenerationError::InvalidTransition {
                        action: "poll",
                        status: guard.status(),
                    })
                }
            }
        };

        let mut delay = self.config.initial_delay();
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!(target: "generation", job_id = %job_id, "polling cancelled");
                    return Err(task.lock().cancel());
                }
                _ = self.timer.sleep(delay) => {}
            }

            let polled = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(task.lock().cancel()),
                polled = self.backend.poll(&job_id) => polled,
            };

            let step = match polled {
                Ok(report) => {
                    tracing::debug!(
                        target: "generation",
                        job_id = %job_id,
                        status = %report.status,
                        "poll"
                    );
                    let step = task.lock().on_poll(report, self.config.max_attempts);
                    step?
                }
                Err(err) => {
                    let err = task.lock().on_poll_err(err);
                    tracing::warn!(
                        target: "generation",
                        job_id = %job_id,
                        %err,
                        "poll request failed"
                    );
                    return Err(err);
                }
            };

            match step {
                PollStep::Done(result) => {
                    tracing::info!(target: "generation", job_id = %job_id, "generation completed");
                    return Ok(result);
                }
                PollStep::Pending => delay = self.config.interval(),
            }
        }
    }
}
