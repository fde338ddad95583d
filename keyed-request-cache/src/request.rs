use crate::cache::KeyedRequestCache;
use crate::descriptor::RequestDescriptor;
use crate::entry::CacheEntry;
use crate::error::Error;
use crate::key::RequestKey;
use crate::options::CallOptions;
use crate::subscription::Subscription;
use crate::transport::ApiResponse;

/// A request bound to a cache, the way view code holds on to the data it renders.
///
/// Options set on the handle are written to the shared entry on every call, so the
/// last caller's options decide how a failure of the next flight surfaces.
#[derive(Clone, Debug)]
pub struct ApiRequest {
    cache: KeyedRequestCache,
    descriptor: RequestDescriptor,
    options: Option<CallOptions>,
}

impl ApiRequest {
    pub(crate) fn new(cache: KeyedRequestCache, descriptor: RequestDescriptor) -> Self {
        Self {
            cache,
            descriptor,
            options: None,
        }
    }

    pub fn descriptor(&self) -> &RequestDescriptor {
        &self.descriptor
    }

    pub fn key(&self) -> RequestKey {
        RequestKey::from_descriptor(&self.descriptor)
    }

    pub fn set_options(mut self, options: CallOptions) -> Self {
        self.options = Some(options);
        self
    }

    pub async fn call(&self) -> Result<CacheEntry, Error> {
        match self.options {
            Some(options) => self.cache.resolve_with(&self.descriptor, options).await,
            None => self.cache.resolve(&self.descriptor).await,
        }
    }

    pub async fn refresh(&self) -> Result<CacheEntry, Error> {
        match self.options {
            Some(options) => self.cache.refresh_with(&self.descriptor, options).await,
            None => self.cache.refresh(&self.descriptor).await,
        }
    }

    /// Last successful response, if any. Never starts a request.
    pub fn response(&self) -> Option<ApiResponse> {
        self.cache
            .entry(&self.descriptor)
            .and_then(|entry| entry.result().clone())
    }

    pub fn is_loading(&self) -> bool {
        self.cache
            .entry(&self.descriptor)
            .is_some_and(|entry| entry.is_loading())
    }

    pub fn is_successful(&self) -> bool {
        self.cache
            .entry(&self.descriptor)
            .is_some_and(|entry| entry.is_successful())
    }

    pub fn subscribe<F>(&self, on_change: F) -> Result<Subscription, Error>
    where
        F: Fn(&CacheEntry) + Send + Sync + 'static,
    {
        self.cache.subscribe(&self.descriptor, on_change)
    }
}
