//! Single-flight keyed request cache.
//!
//! Requests are identified by a [`RequestDescriptor`] and collapsed onto a content
//! [`RequestKey`]. [`KeyedRequestCache`] runs at most one [`Transport`] call per key for
//! concurrent callers, memoizes the outcome and lets callers force a refresh that
//! supersedes any call still running.

pub mod cache;
pub mod config;
pub mod descriptor;
pub mod entry;
mod error;
pub mod key;
pub mod notify;
pub mod options;
mod request;
pub mod subscription;
pub mod transport;


pub use cache::{CacheStats, KeyedRequestCache};
pub use config::CacheConfig;
pub use descriptor::invalid_descriptor_error::InvalidDescriptorError;
pub use descriptor::method::Method;
pub use descriptor::RequestDescriptor;
pub use entry::{CacheEntry, EntryState};
pub use error::{Error, ErrorKind};
pub use key::RequestKey;
pub use notify::{ErrorNotifier, LogNotifier, NoopNotifier};
pub use options::CallOptions;
pub use request::ApiRequest;
pub use subscription::Subscription;
pub use transport::http::HttpTransport;
pub use transport::{ApiResponse, Transport, TransportError};
