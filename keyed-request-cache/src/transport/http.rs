use super::{ApiResponse, Transport, TransportError};
use crate::descriptor::RequestDescriptor;
use async_trait::async_trait;
use serde_json::Value;
use surf::{Client, RequestBuilder, Url};
use utils::surf_logging::SurfLogging;
use utils::urls;

/// [`Transport`] backed by a `surf` HTTP client.
///
/// Bodies of `GET`/`HEAD` requests are sent as the query string, every other method
/// sends the body as JSON. A JSON object carrying a numeric `code` is treated as an
/// [`ApiResponse`] envelope; any other payload is wrapped as successful `data`.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    http: Client,
    base_url: Option<Url>,
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            http: Client::new().with(SurfLogging),
            base_url: None,
        }
    }

    /// Relative descriptor paths are resolved against `base_url`.
    pub fn with_base_url(base_url: Url) -> Self {
        Self {
            http: Client::new().with(SurfLogging),
            base_url: Some(base_url),
        }
    }

    pub fn base_url(&self) -> Option<&Url> {
        self.base_url.as_ref()
    }

    pub(crate) fn url_for(&self, request: &RequestDescriptor) -> Result<Url, TransportError> {
        let url = urls::resolve(self.base_url.as_ref(), request.path())
            .map_err(|e| TransportError::InvalidUrl(format!("{}: {}", request.path(), e)))?;
        let pairs = request.query_pairs();
        Ok(urls::with_query(
            url,
            pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())),
        ))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn invoke(&self, request: &RequestDescriptor) -> Result<ApiResponse, TransportError> {
        let url = self.url_for(request)?;

        let mut builder = RequestBuilder::new(request.method().into(), url);
        if request.method().carries_body() {
            if let Some(body) = request.body() {
                builder = builder
                    .body_json(body)
                    .map_err(|e| TransportError::Decode(e.to_string()))?;
            }
        }

        let mut response = self
            .http
            .send(builder)
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;
        let status = response.status();
        let text = response
            .body_string()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        if !status.is_success() {
            return Err(TransportError::Status {
                status: u16::from(status),
                message: text,
            });
        }

        decode_payload(&text)
    }
}

pub(crate) fn decode_payload(text: &str) -> Result<ApiResponse, TransportError> {
    if text.trim().is_empty() {
        return Ok(ApiResponse::default());
    }

    let payload: Value =
        serde_json::from_str(text).map_err(|e| TransportError::Decode(e.to_string()))?;
    let is_envelope = payload.get("code").is_some_and(Value::is_i64);
    if !is_envelope {
        return Ok(ApiResponse::ok(payload));
    }

    let envelope: ApiResponse =
        serde_json::from_value(payload).map_err(|e| TransportError::Decode(e.to_string()))?;
    if envelope.is_success() {
        Ok(envelope)
    } else {
        Err(TransportError::Api {
            code: envelope.code,
            message: envelope.msg,
        })
    }
}
