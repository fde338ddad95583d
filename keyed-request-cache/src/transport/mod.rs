pub mod http;

use crate::descriptor::RequestDescriptor;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Structured response envelope returned by a transport.
///
/// `code == 0` means success; `msg` carries a human readable message, if any.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub code: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
}

impl ApiResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            code: 0,
            data: Some(data),
            msg: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == 0
    }
}

/// Failure of a single transport invocation. Always retryable via refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum TransportError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("HTTP status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("API error code {code}: {}", .message.as_deref().unwrap_or("no message"))]
    Api { code: i64, message: Option<String> },
    #[error("Could not decode response: {0}")]
    Decode(String),
    #[error("Invalid request URL: {0}")]
    InvalidUrl(String),
}

impl TransportError {
    /// Text surfaced to the user-facing error notifier.
    pub fn message(&self) -> String {
        match self {
            TransportError::Status { message, .. } if !message.is_empty() => message.clone(),
            TransportError::Api {
                message: Some(message),
                ..
            } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Capability performing the actual network call for a descriptor.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn invoke(&self, request: &RequestDescriptor) -> Result<ApiResponse, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn invoke(&self, request: &RequestDescriptor) -> Result<ApiResponse, TransportError> {
        (**self).invoke(request).await
    }
}
