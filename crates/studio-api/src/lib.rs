/// Ports the authoring engine needs from the outside world
///
/// Every server call goes through [`RequestPort`] and comes back as an
/// [`Envelope`]; user-facing toasts go to a [`Notifier`]; session expiry is
/// routed to a single [`UnauthorizedHandler`].
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

mod client;
pub use client::*;

pub mod http;
pub mod mock;

pub use http::HttpRequestPort;

/// Envelope code for a successful call
pub const CODE_OK: i64 = 0;

/// Envelope code that signals an expired or missing session
pub const CODE_UNAUTHORIZED: i64 = 401;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("request rejected (code {code}): {}", message.as_deref().unwrap_or("no message"))]
    Rejected { code: i64, message: Option<String> },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("unexpected response shape: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn rejected(code: i64, message: impl Into<String>) -> Self {
        ApiError::Rejected {
            code,
            message: Some(message.into()),
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized)
    }

    /// Server-provided message when there is one, else `fallback`.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            ApiError::Rejected {
                message: Some(message),
                ..
            } if !message.trim().is_empty() => message.clone(),
            _ => fallback.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Get => write!(f, "GET"),
            Self::Post => write!(f, "POST"),
            Self::Put => write!(f, "PUT"),
            Self::Delete => write!(f, "DELETE"),
        }
    }
}

/// Uniform `{ code, message?, data? }` response body
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub code: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Envelope {
    pub fn ok(data: Value) -> Self {
        Self {
            code: CODE_OK,
            message: None,
            data: Some(data),
        }
    }

    pub fn ok_empty() -> Self {
        Self::default()
    }

    pub fn rejected(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: Some(message.into()),
            data: None,
        }
    }

    pub fn unauthorized() -> Self {
        Self::rejected(CODE_UNAUTHORIZED, "session expired")
    }

    pub fn is_ok(&self) -> bool {
        self.code == CODE_OK
    }

    pub fn into_data(self) -> Result<Option<Value>, ApiError> {
        match self.code {
            CODE_OK => Ok(self.data),
            CODE_UNAUTHORIZED => Err(ApiError::Unauthorized),
            code => Err(ApiError::Rejected {
                code,
                message: self.message,
            }),
        }
    }
}
