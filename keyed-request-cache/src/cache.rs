use crate::config::CacheConfig;
use crate::descriptor::RequestDescriptor;
use crate::entry::{CacheEntry, EntryState};
use crate::error::Error;
use crate::key::RequestKey;
use crate::notify::{ErrorNotifier, LogNotifier};
use crate::options::CallOptions;
use crate::request::ApiRequest;
use crate::subscription::{emit, Listener, SubscriberId, Subscription};
use crate::transport::{ApiResponse, Transport, TransportError};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;

#[cfg(feature = "graphql")]
use async_graphql::SimpleObject;

type Outcome = Result<ApiResponse, TransportError>;
type Flight = Shared<BoxFuture<'static, Outcome>>;

/// Directory record for one request key.
struct Slot {
    key: RequestKey,
    descriptor: RequestDescriptor,
    state: EntryState,
    result: Option<ApiResponse>,
    error: Option<TransportError>,
    generation: u64,
    /// Set while `state` is `InFlight`, cleared by the commit of the same generation.
    flight: Option<Flight>,
    options: CallOptions,
    listeners: Vec<(SubscriberId, Listener)>,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
}

impl Slot {
    fn new(key: RequestKey, descriptor: RequestDescriptor, options: CallOptions) -> Self {
        Self {
            key,
            descriptor,
            state: EntryState::Idle,
            result: None,
            error: None,
            generation: 0,
            flight: None,
            options,
            listeners: vec![],
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    fn snapshot(&self) -> CacheEntry {
        CacheEntry {
            key: self.key.clone(),
            state: self.state,
            result: self.result.clone(),
            error: self.error.clone(),
            generation: self.generation,
            subscriber_count: self.listeners.len(),
            updated_at: self.updated_at,
        }
    }

    fn listeners(&self) -> Vec<Listener> {
        self.listeners.iter().map(|(_, l)| Arc::clone(l)).collect()
    }

    fn is_expired(&self, ttl: Option<Duration>) -> bool {
        match (ttl, self.updated_at) {
            // Past the representable range the entry never expires.
            (Some(ttl), Some(updated_at)) => updated_at
                .checked_add_signed(ttl)
                .is_some_and(|expires_at| Utc::now() >= expires_at),
            _ => false,
        }
    }

    fn is_evictable(&self) -> bool {
        self.state != EntryState::InFlight && self.listeners.is_empty()
    }

    fn last_touched(&self) -> DateTime<Utc> {
        self.updated_at.unwrap_or(self.created_at)
    }
}

/// A flight created under the directory lock. It stays parked until [`Inner::fire`]
/// has published the `InFlight` transition.
struct Launch {
    flight: Flight,
    armed: oneshot::Sender<()>,
    entry: CacheEntry,
    listeners: Vec<Listener>,
}

struct Started {
    key: RequestKey,
    entry: CacheEntry,
    flight: Option<Flight>,
}

pub(crate) struct Inner {
    entries: DashMap<RequestKey, Slot>,
    transport: Arc<dyn Transport>,
    notifier: Arc<dyn ErrorNotifier>,
    config: CacheConfig,
    next_generation: AtomicU64,
    next_subscriber: AtomicU64,
    transport_calls: AtomicU64,
    stale_discarded: AtomicU64,
}

impl Inner {
    pub(crate) fn remove_listener(&self, key: &RequestKey, id: SubscriberId) {
        if let Some(mut slot) = self.entries.get_mut(key) {
            slot.listeners.retain(|(subscriber, _)| *subscriber != id);
        }
    }

    fn launch(self: &Arc<Self>, slot: &mut Slot) -> Launch {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
        let (armed, armed_rx) = oneshot::channel::<()>();
        let cache = Arc::downgrade(self);
        let transport = Arc::clone(&self.transport);
        let descriptor = slot.descriptor.clone();
        let key = slot.key.clone();

        let flight = async move {
            // A dropped sender only means the starter went away; run regardless.
            let _ = armed_rx.await;
            let outcome = transport.invoke(&descriptor).await;
            if let Some(cache) = cache.upgrade() {
                cache.commit(&key, generation, &outcome);
            }
            outcome
        }
        .boxed()
        .shared();

        slot.generation = generation;
        slot.state = EntryState::InFlight;
        slot.flight = Some(flight.clone());
        self.transport_calls.fetch_add(1, Ordering::Relaxed);
        log::debug!(
            "Starting request {} {} (generation {})",
            slot.descriptor.method(),
            slot.key.short(),
            generation
        );

        Launch {
            flight,
            armed,
            entry: slot.snapshot(),
            listeners: slot.listeners(),
        }
    }

    fn fire(&self, launch: Launch) {
        let Launch {
            flight,
            armed,
            entry,
            listeners,
        } = launch;

        emit(&listeners, &entry);
        let _ = armed.send(());

        // Drive the flight even if every caller stops waiting. Outside a runtime the
        // waiters poll it themselves.
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(flight);
        }
    }

    /// Apply a transport outcome, unless a newer generation has started since.
    fn commit(&self, key: &RequestKey, generation: u64, outcome: &Outcome) {
        let (entry, listeners, failure) = {
            let Some(mut slot) = self.entries.get_mut(key) else {
                log::debug!("Dropping result for removed request {}", key.short());
                return;
            };
            if slot.generation != generation {
                self.stale_discarded.fetch_add(1, Ordering::Relaxed);
                log::debug!(
                    "Discarding stale result for request {} (generation {}, current {})",
                    key.short(),
                    generation,
                    slot.generation
                );
                return;
            }

            slot.flight = None;
            slot.updated_at = Some(Utc::now());
            let mut failure = None;
            match outcome {
                Ok(response) => {
                    slot.state = EntryState::Resolved;
                    slot.result = Some(response.clone());
                    slot.error = None;
                }
                Err(error) => {
                    log::debug!("Request {} failed: {}", key.short(), error);
                    slot.state = EntryState::Failed;
                    slot.error = Some(error.clone());
                    if slot.options.should_notify() {
                        failure = Some(error.message());
                    }
                }
            }
            (slot.snapshot(), slot.listeners(), failure)
        };

        if let Some(message) = failure {
            self.notifier.notify_error(key, &message);
        }
        emit(&listeners, &entry);
    }
}

/// Single-flight keyed request cache.
///
/// Equivalent descriptors share one entry. At most one transport call per key runs on
/// behalf of [`resolve`](Self::resolve); [`refresh`](Self::refresh) always starts a new
/// one and any older call still running has its result discarded on arrival.
///
/// Cloning is cheap and every clone shares the same directory.
#[derive(Clone)]
pub struct KeyedRequestCache {
    inner: Arc<Inner>,
}

impl fmt::Debug for KeyedRequestCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedRequestCache")
            .field("config", &self.inner.config)
            .field("entries", &self.inner.entries.len())
            .finish()
    }
}

impl KeyedRequestCache {
    pub fn new(transport: impl Transport) -> Self {
        Self::build(Arc::new(transport), CacheConfig::default(), Arc::new(LogNotifier))
    }

    /// Fails with [`Error::Config`] when `config` does not validate.
    pub fn with_config(transport: impl Transport, config: CacheConfig) -> Result<Self, Error> {
        Self::with_notifier(transport, config, LogNotifier)
    }

    pub fn with_notifier(
        transport: impl Transport,
        config: CacheConfig,
        notifier: impl ErrorNotifier + 'static,
    ) -> Result<Self, Error> {
        config.validate()?;
        Ok(Self::build(Arc::new(transport), config, Arc::new(notifier)))
    }

    fn build(
        transport: Arc<dyn Transport>,
        config: CacheConfig,
        notifier: Arc<dyn ErrorNotifier>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: DashMap::new(),
                transport,
                notifier,
                config,
                next_generation: AtomicU64::new(0),
                next_subscriber: AtomicU64::new(0),
                transport_calls: AtomicU64::new(0),
                stale_discarded: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Caller-side handle bound to `descriptor`.
    pub fn request(&self, descriptor: RequestDescriptor) -> ApiRequest {
        ApiRequest::new(self.clone(), descriptor)
    }

    /// Return the memoized entry, joining or starting a flight when needed.
    ///
    /// Failed, idle and expired entries are fetched again. The returned entry is the
    /// settled state of the newest flight for the key.
    pub async fn resolve(&self, descriptor: &RequestDescriptor) -> Result<CacheEntry, Error> {
        self.run(descriptor, false, None).await
    }

    /// Like [`resolve`](Self::resolve), storing `options` on the entry first.
    pub async fn resolve_with(
        &self,
        descriptor: &RequestDescriptor,
        options: CallOptions,
    ) -> Result<CacheEntry, Error> {
        self.run(descriptor, false, Some(options)).await
    }

    /// Start a new flight regardless of the entry state and wait for it.
    pub async fn refresh(&self, descriptor: &RequestDescriptor) -> Result<CacheEntry, Error> {
        self.run(descriptor, true, None).await
    }

    pub async fn refresh_with(
        &self,
        descriptor: &RequestDescriptor,
        options: CallOptions,
    ) -> Result<CacheEntry, Error> {
        self.run(descriptor, true, Some(options)).await
    }

    /// Start or join a flight without waiting for it.
    pub fn prefetch(&self, descriptor: &RequestDescriptor) -> Result<CacheEntry, Error> {
        Ok(self.start(descriptor, false, None)?.entry)
    }

    /// Register `on_change`, called with a fresh snapshot on every transition of the
    /// entry. Does not call the transport.
    pub fn subscribe<F>(
        &self,
        descriptor: &RequestDescriptor,
        on_change: F,
    ) -> Result<Subscription, Error>
    where
        F: Fn(&CacheEntry) + Send + Sync + 'static,
    {
        descriptor.validate()?;
        let key = RequestKey::from_descriptor(descriptor);
        if !self.inner.entries.contains_key(&key) {
            self.make_room();
        }

        let id = SubscriberId(self.inner.next_subscriber.fetch_add(1, Ordering::Relaxed));
        self.slot(&key, descriptor)
            .listeners
            .push((id, Arc::new(on_change)));
        log::debug!("Subscriber {:?} added to request {}", id, key.short());

        Ok(Subscription::new(key, id, Arc::downgrade(&self.inner)))
    }

    /// Store `options` on the entry, creating it idle if absent.
    pub fn set_options(
        &self,
        descriptor: &RequestDescriptor,
        options: CallOptions,
    ) -> Result<(), Error> {
        descriptor.validate()?;
        let key = RequestKey::from_descriptor(descriptor);
        self.slot(&key, descriptor).options = options;
        Ok(())
    }

    /// Current snapshot, without touching the transport.
    pub fn entry(&self, descriptor: &RequestDescriptor) -> Option<CacheEntry> {
        let key = RequestKey::from_descriptor(descriptor);
        self.inner.entries.get(&key).map(|slot| slot.snapshot())
    }

    /// Drop a settled, unsubscribed entry. Returns whether anything was removed.
    pub fn invalidate(&self, descriptor: &RequestDescriptor) -> bool {
        let key = RequestKey::from_descriptor(descriptor);
        self.inner
            .entries
            .remove_if(&key, |_, slot| slot.is_evictable())
            .is_some()
    }

    /// Forget every settled result.
    ///
    /// In-flight entries are kept so the single-flight guarantee holds. Subscribed
    /// entries go back to `Idle` and their subscribers are notified.
    pub fn clear(&self) {
        let mut reset = vec![];
        self.inner.entries.retain(|_, slot| {
            if slot.state == EntryState::InFlight {
                return true;
            }
            if slot.listeners.is_empty() {
                return false;
            }
            slot.state = EntryState::Idle;
            slot.result = None;
            slot.error = None;
            slot.updated_at = None;
            reset.push((slot.snapshot(), slot.listeners()));
            true
        });

        for (entry, listeners) in reset {
            emit(&listeners, &entry);
        }
        log::info!("Request cache cleared");
    }

    /// Remove unsubscribed entries older than the configured TTL.
    pub fn evict_expired(&self) -> usize {
        let ttl = self.inner.config.ttl();
        if ttl.is_none() {
            return 0;
        }

        let before = self.inner.entries.len();
        self.inner
            .entries
            .retain(|_, slot| !(slot.is_evictable() && slot.is_expired(ttl)));
        let evicted = before.saturating_sub(self.inner.entries.len());

        log::debug!("Evicted {} expired cache entries", evicted);
        evicted
    }

    pub fn stats(&self) -> CacheStats {
        let mut stats = CacheStats {
            transport_calls: self.inner.transport_calls.load(Ordering::Relaxed),
            stale_discarded: self.inner.stale_discarded.load(Ordering::Relaxed),
            max_entries: self.inner.config.max_entries,
            ..CacheStats::default()
        };

        for slot in self.inner.entries.iter() {
            stats.total_entries += 1;
            stats.subscribers += slot.listeners.len();
            match slot.state {
                EntryState::Idle => stats.idle += 1,
                EntryState::InFlight => stats.in_flight += 1,
                EntryState::Resolved => stats.resolved += 1,
                EntryState::Failed => stats.failed += 1,
            }
        }
        stats
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    fn slot(
        &self,
        key: &RequestKey,
        descriptor: &RequestDescriptor,
    ) -> dashmap::mapref::one::RefMut<'_, RequestKey, Slot> {
        self.inner.entries.entry(key.clone()).or_insert_with(|| {
            Slot::new(
                key.clone(),
                descriptor.clone(),
                self.inner.config.default_options,
            )
        })
    }

    async fn run(
        &self,
        descriptor: &RequestDescriptor,
        force: bool,
        options: Option<CallOptions>,
    ) -> Result<CacheEntry, Error> {
        let started = self.start(descriptor, force, options)?;
        match started.flight {
            None => Ok(started.entry),
            Some(flight) => self.settle(started.key, started.entry.generation, flight).await,
        }
    }

    fn start(
        &self,
        descriptor: &RequestDescriptor,
        force: bool,
        options: Option<CallOptions>,
    ) -> Result<Started, Error> {
        descriptor.validate()?;
        let key = RequestKey::from_descriptor(descriptor);
        if !self.inner.entries.contains_key(&key) {
            self.make_room();
        }

        let ttl = self.inner.config.ttl();
        let (started, launch) = {
            let mut slot = self.slot(&key, descriptor);
            if let Some(options) = options {
                slot.options = options;
            }

            let joined = match &slot.flight {
                Some(flight) if !force && slot.state == EntryState::InFlight => {
                    Some(flight.clone())
                }
                _ => None,
            };
            let memoized = !force
                && slot.state == EntryState::Resolved
                && self.inner.config.enabled
                && !slot.is_expired(ttl);

            if let Some(flight) = joined {
                log::debug!("Joining in-flight request {}", key.short());
                let started = Started {
                    key: key.clone(),
                    entry: slot.snapshot(),
                    flight: Some(flight),
                };
                (started, None)
            } else if memoized {
                log::debug!("Cache hit for request {}", key.short());
                let started = Started {
                    key: key.clone(),
                    entry: slot.snapshot(),
                    flight: None,
                };
                (started, None)
            } else {
                let launch = self.inner.launch(&mut slot);
                let started = Started {
                    key: key.clone(),
                    entry: launch.entry.clone(),
                    flight: Some(launch.flight.clone()),
                };
                (started, Some(launch))
            }
        };

        if let Some(launch) = launch {
            self.inner.fire(launch);
        }
        Ok(started)
    }

    /// Wait for `flight`, then for any newer flight that superseded it.
    async fn settle(
        &self,
        key: RequestKey,
        generation: u64,
        mut flight: Flight,
    ) -> Result<CacheEntry, Error> {
        loop {
            let outcome = flight.await;

            let current = self.inner.entries.get(&key).map(|slot| {
                let newer = match (&slot.flight, slot.state) {
                    (Some(newer), EntryState::InFlight) => Some(newer.clone()),
                    _ => None,
                };
                (slot.snapshot(), slot.options, newer)
            });

            match current {
                Some((_, _, Some(newer))) => flight = newer,
                Some((entry, options, None)) => return surface(entry, options),
                None => {
                    let entry = CacheEntry {
                        key,
                        state: match outcome {
                            Ok(_) => EntryState::Resolved,
                            Err(_) => EntryState::Failed,
                        },
                        result: outcome.as_ref().ok().cloned(),
                        error: outcome.err(),
                        generation,
                        subscriber_count: 0,
                        updated_at: Some(Utc::now()),
                    };
                    return surface(entry, self.inner.config.default_options);
                }
            }
        }
    }

    /// Evict settled, unsubscribed entries oldest first when the directory is full.
    fn make_room(&self) {
        let Some(max_entries) = self.inner.config.max_entries else {
            return;
        };
        if self.inner.entries.len() < max_entries {
            return;
        }

        self.evict_expired();
        if self.inner.entries.len() < max_entries {
            return;
        }

        let mut candidates: Vec<_> = self
            .inner
            .entries
            .iter()
            .filter(|slot| slot.is_evictable())
            .map(|slot| (slot.key().clone(), slot.last_touched()))
            .collect();
        candidates.sort_by_key(|(_, touched)| *touched);

        let to_remove = (max_entries / 4).max(1);
        let mut removed = 0;
        for (key, _) in candidates.into_iter().take(to_remove) {
            if self
                .inner
                .entries
                .remove_if(&key, |_, slot| slot.is_evictable())
                .is_some()
            {
                removed += 1;
            }
        }

        log::debug!("Evicted {} oldest cache entries", removed);
    }
}

fn surface(entry: CacheEntry, options: CallOptions) -> Result<CacheEntry, Error> {
    if entry.state == EntryState::Failed && !options.fail_silently {
        if let Some(error) = entry.error.clone() {
            return Err(Error::Transport(error));
        }
    }
    Ok(entry)
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "graphql", derive(SimpleObject))]
pub struct CacheStats {
    pub total_entries: usize,
    pub idle: usize,
    pub in_flight: usize,
    pub resolved: usize,
    pub failed: usize,
    pub subscribers: usize,
    pub transport_calls: u64,
    pub stale_discarded: u64,
    pub max_entries: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_past_the_calendar_never_expires() {
        let descriptor = RequestDescriptor::get("/x");
        let mut slot = Slot::new(
            RequestKey::from_descriptor(&descriptor),
            descriptor,
            CallOptions::default(),
        );
        assert!(!slot.is_expired(Some(Duration::milliseconds(1))));

        slot.updated_at = Some(DateTime::<Utc>::MAX_UTC - Duration::seconds(1));
        assert!(!slot.is_expired(Some(Duration::days(365))));

        slot.updated_at = Some(Utc::now() - Duration::seconds(5));
        assert!(slot.is_expired(Some(Duration::seconds(1))));
        assert!(!slot.is_expired(None));
    }
}
