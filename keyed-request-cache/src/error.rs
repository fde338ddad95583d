use crate::descriptor::invalid_descriptor_error::InvalidDescriptorError;
use crate::transport::TransportError;
use strum_macros::Display;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    InvalidDescriptor(#[from] InvalidDescriptorError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("Invalid cache configuration: {0}")]
    Config(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ErrorKind {
    InvalidDescriptor,
    Transport,
    Config,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidDescriptor(_) => ErrorKind::InvalidDescriptor,
            Error::Transport(_) => ErrorKind::Transport,
            Error::Config(_) => ErrorKind::Config,
        }
    }

    /// Only transport failures may succeed when the same request is issued again.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transport
    }
}
