use crate::cache::Inner;
use crate::entry::CacheEntry;
use crate::key::RequestKey;
use std::fmt;
use std::sync::{Arc, Weak};

/// Callback invoked with the new snapshot whenever an entry changes.
pub type Listener = Arc<dyn Fn(&CacheEntry) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(pub(crate) u64);

/// Registration of interest in one entry.
///
/// Dropping the handle unsubscribes. The handle does not keep the cache alive.
pub struct Subscription {
    key: RequestKey,
    id: SubscriberId,
    cache: Weak<Inner>,
    active: bool,
}

impl Subscription {
    pub(crate) fn new(key: RequestKey, id: SubscriberId, cache: Weak<Inner>) -> Self {
        Self {
            key,
            id,
            cache,
            active: true,
        }
    }

    pub fn key(&self) -> &RequestKey {
        &self.key
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Some(inner) = self.cache.upgrade() {
            inner.remove_listener(&self.key, self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key.short())
            .field("id", &self.id)
            .field("active", &self.active)
            .finish()
    }
}

pub(crate) fn emit(listeners: &[Listener], entry: &CacheEntry) {
    for listener in listeners {
        listener(entry);
    }
}
