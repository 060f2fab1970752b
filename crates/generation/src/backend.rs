use crate::{
    GenerationKind, GenerationRequest, GenerationResult, ProgressReport, SceneOption, Submission,
};
use serde::Deserialize;
use serde_json::{json, Value};
use studio_api::{ApiClient, ApiError, Method};

/// Where generation jobs are submitted and polled
#[async_trait::async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn submit(&self, request: &GenerationRequest) -> Result<Submission, ApiError>;

    async fn poll(&self, job_id: &str) -> Result<ProgressReport, ApiError>;
}

/// Submit response; which fields are present depends on the job kind.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    #[serde(default, alias = "fileId", alias = "taskId")]
    job_id: Option<Value>,
    #[serde(default, alias = "downloadUrl", alias = "url")]
    result_ref: Option<String>,
    #[serde(default)]
    last_frame: Option<String>,
    #[serde(default)]
    scenes: Vec<SceneOption>,
    #[serde(default, alias = "content")]
    text: Option<String>,
}

impl SubmitResponse {
    fn into_submission(self, kind: GenerationKind) -> Submission {
        if kind.is_long_running() && self.result_ref.is_none() {
            if let Some(job_id) = self.job_id.and_then(id_string) {
                return Submission::Accepted { job_id };
            }
        }
        Submission::Completed(GenerationResult {
            kind,
            result_ref: self.result_ref,
            last_frame: self.last_frame,
            scenes: self.scenes,
            text: self.text,
        })
    }
}

/// Job ids arrive either as strings or as numbers.
fn id_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn submit_path(kind: GenerationKind) -> String {
    format!("/generate/{}", kind.as_str())
}

pub fn progress_path(job_id: &str) -> String {
    format!("/generate/video/progress/{job_id}")
}

/// [`GenerationBackend`] over the envelope API
#[derive(Clone)]
pub struct ApiGenerationBackend {
    client: ApiClient,
}

impl ApiGenerationBackend {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl GenerationBackend for ApiGenerationBackend {
    async fn submit(&self, request: &GenerationRequest) -> Result<Submission, ApiError> {
        let body = json!({
            "sceneId": request.scene_ref,
            "prompt": request.prompt,
        });
        let response: Option<SubmitResponse> = self
            .client
            .call(Method::Post, &submit_path(request.kind), Some(body))
            .await?;
        let submission = response.unwrap_or_default().into_submission(request.kind);
        if let (GenerationKind::Video, Submission::Completed(result)) =
            (request.kind, &submission)
        {
            if result.result_ref.is_none() {
                return Err(ApiError::Decode(
                    "video submit returned neither a job id nor a result".into(),
                ));
            }
        }
        Ok(submission)
    }

    async fn poll(&self, job_id: &str) -> Result<ProgressReport, ApiError> {
        let report: Option<ProgressReport> = self.client.get(&progress_path(job_id)).await?;
        Ok(report.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use studio_api::mock::MockRequestPort;
    use studio_api::Envelope;

    fn backend(port: &Arc<MockRequestPort>) -> ApiGenerationBackend {
        ApiGenerationBackend::new(ApiClient::new(port.clone()))
    }

    fn request(kind: GenerationKind) -> GenerationRequest {
        GenerationRequest {
            kind,
            scene_ref: "S1".into(),
            prompt: "storm at sea".into(),
        }
    }

    #[tokio::test]
    async fn test_video_submit_returns_job() {
        let port = Arc::new(MockRequestPort::new());
        port.respond(Method::Post, "/generate/video", Envelope::ok(json!({"fileId": 88})));
        let submission = backend(&port).submit(&request(GenerationKind::Video)).await.unwrap();
        assert_eq!(
            submission,
            Submission::Accepted {
                job_id: "88".into()
            }
        );
        let call = port.last_call_to("/generate/video").unwrap();
        assert_eq!(
            call.body,
            Some(json!({"sceneId": "S1", "prompt": "storm at sea"}))
        );
    }

    #[tokio::test]
    async fn test_script_submit_carries_scenes() {
        let port = Arc::new(MockRequestPort::new());
        port.respond(
            Method::Post,
            "/generate/script",
            Envelope::ok(json!({
                "content": "INT. DECK - NIGHT",
                "scenes": [{"id": "S7", "name": "Deck"}]
            })),
        );
        let submission = backend(&port).submit(&request(GenerationKind::Script)).await.unwrap();
        let Submission::Completed(result) = submission else {
            panic!("script should complete synchronously");
        };
        assert_eq!(result.text.as_deref(), Some("INT. DECK - NIGHT"));
        assert_eq!(result.scenes[0].id, "S7");
    }

    #[tokio::test]
    async fn test_null_data_completes_voice_job() {
        let port = Arc::new(MockRequestPort::new());
        port.respond(Method::Post, "/generate/voice", Envelope::ok_empty());
        let submission = backend(&port).submit(&request(GenerationKind::Voice)).await.unwrap();
        assert_eq!(
            submission,
            Submission::Completed(GenerationResult::new(GenerationKind::Voice))
        );
    }

    #[tokio::test]
    async fn test_poll_decodes_progress() {
        let port = Arc::new(MockRequestPort::new());
        port.respond(
            Method::Get,
            "/generate/video/progress/88",
            Envelope::ok(json!({
                "status": "COMPLETED",
                "downloadUrl": "https://x/v.mp4",
                "lastFrame": "https://x/f.png"
            })),
        );
        let report = backend(&port).poll("88").await.unwrap();
        assert_eq!(report.result_ref.as_deref(), Some("https://x/v.mp4"));
        assert_eq!(report.last_frame.as_deref(), Some("https://x/f.png"));
    }
}
