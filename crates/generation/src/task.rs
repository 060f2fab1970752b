use crate::{FailureReason, GenerationError, FALLBACK_MESSAGE, TIMEOUT_MESSAGE};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use studio_api::ApiError;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationKind {
    Script,
    Image,
    Voice,
    Sound,
    Video,
}

impl GenerationKind {
    pub const ALL: [GenerationKind; 5] = [
        GenerationKind::Script,
        GenerationKind::Image,
        GenerationKind::Voice,
        GenerationKind::Sound,
        GenerationKind::Video,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Script => "script",
            Self::Image => "image",
            Self::Voice => "voice",
            Self::Sound => "sound",
            Self::Video => "video",
        }
    }

    /// Only video jobs hand back a job id to poll.
    pub fn is_long_running(&self) -> bool {
        matches!(self, Self::Video)
    }
}

impl fmt::Display for GenerationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GenerationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown generation kind: {s}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Idle,
    Submitting,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, TaskStatus::Submitting | TaskStatus::Processing)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskStatus::Idle => "idle",
            TaskStatus::Submitting => "submitting",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Scene entry the script generator may add to the series
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneOption {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub kind: GenerationKind,
    pub result_ref: Option<String>,
    pub last_frame: Option<String>,
    #[serde(default)]
    pub scenes: Vec<SceneOption>,
    pub text: Option<String>,
}

impl GenerationResult {
    pub fn new(kind: GenerationKind) -> Self {
        Self {
            kind,
            result_ref: None,
            last_frame: None,
            scenes: Vec::new(),
            text: None,
        }
    }
}

/// What `begin_submit` hands to the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub kind: GenerationKind,
    pub scene_ref: String,
    pub prompt: String,
}

/// Answer to a submit call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// Synchronous job finished inside the submit call
    Completed(GenerationResult),
    /// Long-running job accepted; poll with this id
    Accepted { job_id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressStatus {
    InProgress,
    Succeeded,
    Failed,
}

impl ProgressStatus {
    /// Unknown values count as in progress; the attempt ceiling bounds them.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "COMPLETED" | "SUCCESS" | "SUCCEEDED" => ProgressStatus::Succeeded,
            "FAILED" | "ERROR" | "CANCELLED" | "CANCELED" => ProgressStatus::Failed,
            _ => ProgressStatus::InProgress,
        }
    }
}

/// One poll answer for a long-running job
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressReport {
    #[serde(default)]
    pub status: String,
    #[serde(default, alias = "downloadUrl", alias = "resultUrl")]
    pub result_ref: Option<String>,
    #[serde(default)]
    pub last_frame: Option<String>,
    #[serde(default, alias = "errorMsg")]
    pub error_message: Option<String>,
}

impl ProgressReport {
    pub fn status(&self) -> ProgressStatus {
        ProgressStatus::parse(&self.status)
    }

    pub fn in_progress(status: &str) -> Self {
        Self {
            status: status.to_string(),
            ..Self::default()
        }
    }

    pub fn completed(result_ref: impl Into<String>) -> Self {
        Self {
            status: "COMPLETED".into(),
            result_ref: Some(result_ref.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStep {
    Pending,
    Done(GenerationResult),
}

/// One generation request for a (kind, scene) pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationTask {
    task_id: Uuid,
    kind: GenerationKind,
    scene_ref: String,
    status: TaskStatus,
    poll_attempt: u32,
    created_at: DateTime<Utc>,
    prompt: Option<String>,
    job_ref: Option<String>,
    result: Option<GenerationResult>,
    error: Option<String>,
}

impl GenerationTask {
    pub fn new(kind: GenerationKind, scene_ref: impl Into<String>) -> Self {
        Self {
            task_id: Uuid::new_v4(),
            kind,
            scene_ref: scene_ref.into(),
            status: TaskStatus::Idle,
            poll_attempt: 0,
            created_at: Utc::now(),
            prompt: None,
            job_ref: None,
            result: None,
            error: None,
        }
    }

    pub fn task_id(&self) -> Uuid {
        self.task_id
    }

    pub fn kind(&self) -> GenerationKind {
        self.kind
    }

    pub fn scene_ref(&self) -> &str {
        &self.scene_ref
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn poll_attempt(&self) -> u32 {
        self.poll_attempt
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn job_ref(&self) -> Option<&str> {
        self.job_ref.as_deref()
    }

    pub fn result(&self) -> Option<&GenerationResult> {
        self.result.as_ref()
    }

    pub fn result_ref(&self) -> Option<&str> {
        self.result.as_ref().and_then(|r| r.result_ref.as_deref())
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// `Idle -> Submitting`
    pub fn begin_submit(&mut self, prompt: &str) -> Result<GenerationRequest, GenerationError> {
        self.require_status(TaskStatus::Idle, "submit")?;
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(GenerationError::EmptyPrompt);
        }
        self.status = TaskStatus::Submitting;
        self.created_at = Utc::now();
        self.prompt = Some(prompt.to_string());
        Ok(GenerationRequest {
            kind: self.kind,
            scene_ref: self.scene_ref.clone(),
            prompt: prompt.to_string(),
        })
    }

    /// `Submitting -> Completed` or, for long-running kinds, `Submitting -> Processing`.
    pub fn on_submit_ok(&mut self, submission: Submission) -> Result<PollStep, GenerationError> {
        self.require_status(TaskStatus::Submitting, "accept a submission")?;
        match submission {
            Submission::Completed(result) => {
                self.complete(result.clone());
                Ok(PollStep::Done(result))
            }
            Submission::Accepted { job_id } if self.kind.is_long_running() => {
                self.status = TaskStatus::Processing;
                self.job_ref = Some(job_id);
                Ok(PollStep::Pending)
            }
            Submission::Accepted { .. } => Err(self.fail(GenerationError::failed(
                format!("{} generation returned a job id instead of a result", self.kind),
                FailureReason::Request,
            ))),
        }
    }

    /// `Submitting -> Failed`. Returns the error to report.
    pub fn on_submit_err(&mut self, err: ApiError) -> GenerationError {
        if let Err(invalid) = self.require_status(TaskStatus::Submitting, "fail a submission")
        {
            return invalid;
        }
        self.fail(GenerationError::from_request(err))
    }

    /// One poll cycle while `Processing`.
    ///
    /// The task fails on a failure status, on an explicit error message, or
    /// once `max_attempts` polls have come back without a terminal status.
    pub fn on_poll(
        &mut self,
        report: ProgressReport,
        max_attempts: u32,
    ) -> Result<PollStep, GenerationError> {
        self.require_status(TaskStatus::Processing, "poll")?;
        self.poll_attempt += 1;

        if let Some(message) = report.error_message.as_deref().map(str::trim) {
            if !message.is_empty() {
                let err = GenerationError::failed(message, FailureReason::ServerMessage);
                return Err(self.fail(err));
            }
        }

        match report.status() {
            ProgressStatus::Succeeded => match report.result_ref {
                Some(result_ref) => {
                    let result = GenerationResult {
                        result_ref: Some(result_ref),
                        last_frame: report.last_frame,
                        ..GenerationResult::new(self.kind)
                    };
                    self.complete(result.clone());
                    Ok(PollStep::Done(result))
                }
                None => Err(self.fail(GenerationError::failed(
                    "generation finished without a result",
                    FailureReason::ServerStatus,
                ))),
            },
            ProgressStatus::Failed => Err(self.fail(GenerationError::failed(
                FALLBACK_MESSAGE,
                FailureReason::ServerStatus,
            ))),
            ProgressStatus::InProgress if self.poll_attempt >= max_attempts => Err(
                self.fail(GenerationError::failed(TIMEOUT_MESSAGE, FailureReason::Timeout)),
            ),
            ProgressStatus::InProgress => Ok(PollStep::Pending),
        }
    }

    /// A poll request failed: `Processing -> Failed`.
    pub fn on_poll_err(&mut self, err: ApiError) -> GenerationError {
        if let Err(invalid) = self.require_status(TaskStatus::Processing, "fail a poll") {
            return invalid;
        }
        self.poll_attempt += 1;
        self.fail(GenerationError::from_request(err))
    }

    /// Abandon an active task. Terminal tasks are left alone.
    pub fn cancel(&mut self) -> GenerationError {
        if self.status.is_active() {
            self.fail(GenerationError::Cancelled)
        } else {
            GenerationError::Cancelled
        }
    }

    /// Back to `Idle` with a fresh id.
    pub fn reset(&mut self) {
        *self = Self::new(self.kind, std::mem::take(&mut self.scene_ref));
    }

    fn require_status(
        &self,
        status: TaskStatus,
        action: &'static str,
    ) -> Result<(), GenerationError> {
        if self.status == status {
            Ok(())
        } else {
            Err(GenerationError::InvalidTransition {
                action,
                status: self.status,
            })
        }
    }

    fn complete(&mut self, result: GenerationResult) {
        self.status = TaskStatus::Completed;
        self.result = Some(result);
        self.error = None;
    }

    fn fail(&mut self, err: GenerationError) -> GenerationError {
        self.status = TaskStatus::Failed;
        self.error = Some(err.to_string());
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn processing_video() -> GenerationTask {
        let mut task = GenerationTask::new(GenerationKind::Video, "S1");
        task.begin_submit("a cat on a roof").unwrap();
        task.on_submit_ok(Submission::Accepted {
            job_id: "job-9".into(),
        })
        .unwrap();
        task
    }

    #[test]
    fn test_blank_prompt_rejected_before_submit() {
        let mut task = GenerationTask::new(GenerationKind::Script, "S1");
        assert_eq!(task.begin_submit("   ").unwrap_err(), GenerationError::EmptyPrompt);
        assert_eq!(task.status(), TaskStatus::Idle);
    }

    #[test]
    fn test_synchronous_job_completes_on_submit() {
        let mut task = GenerationTask::new(GenerationKind::Image, "S1");
        let request = task.begin_submit(" sunset ").unwrap();
        assert_eq!(request.prompt, "sunset");
        assert_eq!(task.status(), TaskStatus::Submitting);

        let result = GenerationResult {
            result_ref: Some("https://x/img.png".into()),
            ..GenerationResult::new(GenerationKind::Image)
        };
        let step = task.on_submit_ok(Submission::Completed(result.clone())).unwrap();
        assert_eq!(step, PollStep::Done(result));
        assert_eq!(task.status(), TaskStatus::Completed);
        assert_eq!(task.result_ref(), Some("https://x/img.png"));
    }

    #[test]
    fn test_video_polls_until_completed() {
        let mut task = processing_video();
        assert_eq!(task.status(), TaskStatus::Processing);
        assert_eq!(task.job_ref(), Some("job-9"));

        let step = task.on_poll(ProgressReport::in_progress("PROCESSING"), 60).unwrap();
        assert_eq!(step, PollStep::Pending);
        let step = task
            .on_poll(ProgressReport::completed("https://x/video.mp4"), 60)
            .unwrap();
        assert!(matches!(step, PollStep::Done(_)));
        assert_eq!(task.status(), TaskStatus::Completed);
        assert_eq!(task.poll_attempt(), 2);
        assert_eq!(task.result_ref(), Some("https://x/video.mp4"));
    }

    #[test]
    fn test_poll_ceiling_fails_with_timeout() {
        let mut task = processing_video();
        for _ in 0..4 {
            assert_eq!(
                task.on_poll(ProgressReport::in_progress("QUEUED"), 5).unwrap(),
                PollStep::Pending
            );
        }
        let err = task.on_poll(ProgressReport::in_progress("QUEUED"), 5).unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(err.to_string(), TIMEOUT_MESSAGE);
        assert_eq!(task.poll_attempt(), 5);
        assert_eq!(task.status(), TaskStatus::Failed);
    }

    #[test]
    fn test_error_message_fails_regardless_of_status() {
        let mut task = processing_video();
        let report = ProgressReport {
            error_message: Some("content policy".into()),
            ..ProgressReport::in_progress("PROCESSING")
        };
        let err = task.on_poll(report, 60).unwrap_err();
        assert_eq!(
            err,
            GenerationError::failed("content policy", FailureReason::ServerMessage)
        );
        assert_eq!(task.error(), Some("content policy"));
    }

    #[test]
    fn test_failure_status() {
        let mut task = processing_video();
        let err = task.on_poll(ProgressReport::in_progress("failed"), 60).unwrap_err();
        assert!(matches!(
            err,
            GenerationError::GenerationFailed {
                reason: FailureReason::ServerStatus,
                ..
            }
        ));
    }

    #[test]
    fn test_terminal_state_only_accepts_reset() {
        let mut task = processing_video();
        task.on_poll(ProgressReport::completed("u"), 60).unwrap();
        let id = task.task_id();

        assert!(matches!(
            task.on_poll(ProgressReport::in_progress("RUNNING"), 60),
            Err(GenerationError::InvalidTransition { .. })
        ));
        assert!(matches!(
            task.begin_submit("again"),
            Err(GenerationError::InvalidTransition { .. })
        ));
        assert_eq!(task.status(), TaskStatus::Completed);

        task.reset();
        assert_eq!(task.status(), TaskStatus::Idle);
        assert_eq!(task.scene_ref(), "S1");
        assert_ne!(task.task_id(), id);
        assert!(task.result().is_none());
    }

    #[test]
    fn test_submit_error_maps_unauthorized() {
        let mut task = GenerationTask::new(GenerationKind::Voice, "S1");
        task.begin_submit("hello").unwrap();
        let err = task.on_submit_err(ApiError::Unauthorized);
        assert!(err.is_unauthorized());
        assert_eq!(task.status(), TaskStatus::Failed);
    }

    #[test]
    fn test_synchronous_kind_rejects_job_id() {
        let mut task = GenerationTask::new(GenerationKind::Sound, "S1");
        task.begin_submit("rain").unwrap();
        assert!(task
            .on_submit_ok(Submission::Accepted { job_id: "j".into() })
            .is_err());
        assert_eq!(task.status(), TaskStatus::Failed);
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!(ProgressStatus::parse("success"), ProgressStatus::Succeeded);
        assert_eq!(ProgressStatus::parse(" Succeeded "), ProgressStatus::Succeeded);
        assert_eq!(ProgressStatus::parse("CANCELLED"), ProgressStatus::Failed);
        assert_eq!(ProgressStatus::parse("warming_up"), ProgressStatus::InProgress);
        assert_eq!("Video".parse::<GenerationKind>(), Ok(GenerationKind::Video));
        assert!("movie".parse::<GenerationKind>().is_err());
    }
}
