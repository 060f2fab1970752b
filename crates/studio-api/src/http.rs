/// reqwest-backed Request port
use crate::{ApiError, Envelope, Method, RequestPort};
use serde_json::Value;
use std::time::Duration;

pub struct HttpRequestPort {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl HttpRequestPort {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ApiError::Transport(format!("build http client: {err}")))?;
        Ok(Self {
            base_url: base_url.into(),
            token: None,
            client,
        })
    }

    /// With bearer token
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.token = (!token.trim().is_empty()).then_some(token);
        self
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[async_trait::async_trait]
impl RequestPort for HttpRequestPort {
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Envelope, ApiError> {
        let url = self.url(path);
        let mut request = match method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
            Method::Put => self.client.put(&url),
            Method::Delete => self.client.delete(&url),
        };
        if let Some(token) = self.token.as_deref() {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body.as_ref() {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|err| ApiError::Transport(format!("{method} {path}: {err}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ApiError::Unauthorized);
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ApiError::Transport(format!("{method} {path}: {status} - {text}")));
        }

        response
            .json::<Envelope>()
            .await
            .map_err(|err| ApiError::Decode(format!("{method} {path}: {err}")))
    }
}
