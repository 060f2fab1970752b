use crate::{ApiError, Envelope, Method};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

/// Transport for every server call
#[async_trait::async_trait]
pub trait RequestPort: Send + Sync {
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Envelope, ApiError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Error,
}

/// Fire-and-forget toast sink
pub trait Notifier: Send + Sync {
    fn notify(&self, kind: NoticeKind, text: &str);
}

/// Process-wide reaction to an expired session (clear state, redirect to login).
pub trait UnauthorizedHandler: Send + Sync {
    fn on_unauthorized(&self);
}

/// Writes toasts to the log; used by headless front ends.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, kind: NoticeKind, text: &str) {
        match kind {
            NoticeKind::Success => tracing::info!(target: "notice", "{text}"),
            NoticeKind::Error => tracing::warn!(target: "notice", "{text}"),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopUnauthorized;

impl UnauthorizedHandler for NoopUnauthorized {
    fn on_unauthorized(&self) {
        tracing::warn!("session expired; no unauthorized handler installed");
    }
}

/// Typed wrapper over a [`RequestPort`] that unwraps envelopes.
#[derive(Clone)]
pub struct ApiClient {
    port: Arc<dyn RequestPort>,
}

impl ApiClient {
    pub fn new(port: Arc<dyn RequestPort>) -> Self {
        Self { port }
    }

    pub fn port(&self) -> Arc<dyn RequestPort> {
        Arc::clone(&self.port)
    }

    /// Raw `data` of a successful envelope
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Option<Value>, ApiError> {
        tracing::debug!(%method, path, "api request");
        let envelope = self.port.request(method, path, body).await?;
        envelope.into_data()
    }

    pub async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<T, ApiError> {
        let data = self.send(method, path, body).await?.unwrap_or(Value::Null);
        serde_json::from_value(data).map_err(|err| ApiError::Decode(format!("{path}: {err}")))
    }

    pub async fn call_unit(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<(), ApiError> {
        self.send(method, path, body).await.map(|_| ())
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.call(Method::Get, path, None).await
    }

    pub async fn post<T: DeserializeOwned>(&self, path: &str, body: Value) -> Result<T, ApiError> {
        self.call(Method::Post, path, Some(body)).await
    }
}
