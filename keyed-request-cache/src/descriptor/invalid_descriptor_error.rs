/// Reasons a request descriptor is rejected before any transport call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidDescriptorError {
    #[error("Unsupported HTTP method: {0}")]
    UnsupportedMethod(String),
    #[error("Request path is empty")]
    EmptyPath,
    #[error("Request path contains whitespace: {0:?}")]
    InvalidPath(String),
    #[error("Request body must be a JSON object, got {0}")]
    BodyNotAnObject(&'static str),
}
