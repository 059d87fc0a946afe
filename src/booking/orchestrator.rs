//! Resource orchestrator: cached, single-flight remote reads.
//!
//! For every fetch:
//! 1. Build the cache key from the operation and its parameters.
//! 2. Without `force_refresh`, a cached value is returned immediately: no
//!    network call, no loading-state change.
//! 3. Without `force_refresh`, an outstanding fetch for the same key is
//!    joined instead of issuing a duplicate.
//! 4. Otherwise a new fetch is issued under a fresh generation number,
//!    `loading_state[kind]` is set and the previous error cleared.
//! 5. When it settles, the value is cached and the loading flag cleared; a
//!    failure is classified into `api_errors[kind]` and never cached.
//! 6. A fetch whose generation is no longer the latest for its key was
//!    superseded; it writes nothing and its callers get
//!    `FetchError::Superseded`.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use futures::FutureExt;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::api::BookingApi;
use crate::error::{ApiError, ApiFailure, ErrorKind, FetchError, SelectionError, classify};

use super::cache::{ResourceCache, SharedFetch};
use super::model::{Service, TimeSlot};
use super::state::{BookingState, ResourceKind, keys};

/// All caches owned by the orchestrator plus generation bookkeeping.
#[derive(Default)]
struct Caches {
    services: ResourceCache<Vec<Service>>,
    dates: ResourceCache<Vec<NaiveDate>>,
    time_slots: ResourceCache<Vec<TimeSlot>>,
    /// Monotonic across resets so a pre-reset fetch can never match.
    next_generation: u64,
    /// Latest generation issued per resource kind; only that fetch may
    /// write the kind's loading flag and error.
    latest_by_kind: HashMap<ResourceKind, u64>,
}

impl Caches {
    fn clear(&mut self) {
        self.services.clear();
        self.dates.clear();
        self.time_slots.clear();
        self.latest_by_kind.clear();
    }
}

type Select<V> = fn(&mut Caches) -> &mut ResourceCache<V>;

fn services_cache(c: &mut Caches) -> &mut ResourceCache<Vec<Service>> {
    &mut c.services
}

fn dates_cache(c: &mut Caches) -> &mut ResourceCache<Vec<NaiveDate>> {
    &mut c.dates
}

fn time_slots_cache(c: &mut Caches) -> &mut ResourceCache<Vec<TimeSlot>> {
    &mut c.time_slots
}

/// Wraps the read side of `BookingApi` with caching, loading-state tracking,
/// single-flight execution, and stale-response suppression.
///
/// Cheap to clone; clones share the same caches and state.
#[derive(Clone)]
pub struct ResourceOrchestrator {
    api: Arc<dyn BookingApi>,
    state: Arc<Mutex<BookingState>>,
    caches: Arc<Mutex<Caches>>,
    request_timeout: Duration,
}

impl ResourceOrchestrator {
    pub fn new(
        api: Arc<dyn BookingApi>,
        state: Arc<Mutex<BookingState>>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            api,
            state,
            caches: Arc::new(Mutex::new(Caches::default())),
            request_timeout,
        }
    }

    /// Service catalog.
    pub async fn fetch_services(&self, force_refresh: bool) -> Result<Vec<Service>, FetchError> {
        self.fetch(
            ResourceKind::Services,
            keys::services(),
            force_refresh,
            services_cache,
            |api| async move { api.list_services().await },
        )
        .await
    }

    /// Bookable dates for a service.
    pub async fn fetch_dates(
        &self,
        service_id: &str,
        force_refresh: bool,
    ) -> Result<Vec<NaiveDate>, FetchError> {
        if service_id.is_empty() {
            return Err(FetchError::MissingSelection {
                resource: ResourceKind::Dates,
                reason: SelectionError::EmptyServiceId,
            });
        }
        let service_id = service_id.to_string();
        self.fetch(
            ResourceKind::Dates,
            keys::dates(&service_id),
            force_refresh,
            dates_cache,
            move |api| async move { api.list_available_dates(&service_id).await },
        )
        .await
    }

    /// Time slots for a service on a date.
    pub async fn fetch_time_slots(
        &self,
        service_id: &str,
        date: NaiveDate,
        force_refresh: bool,
    ) -> Result<Vec<TimeSlot>, FetchError> {
        if service_id.is_empty() {
            return Err(FetchError::MissingSelection {
                resource: ResourceKind::TimeSlots,
                reason: SelectionError::EmptyServiceId,
            });
        }
        let service_id = service_id.to_string();
        self.fetch(
            ResourceKind::TimeSlots,
            keys::time_slots(&service_id, date),
            force_refresh,
            time_slots_cache,
            move |api| async move { api.list_time_slots(&service_id, date).await },
        )
        .await
    }

    /// Last successfully fetched catalog, without touching the network.
    pub fn cached_services(&self) -> Option<Vec<Service>> {
        self.caches.lock().services.value(&keys::services())
    }

    pub fn cached_dates(&self, service_id: &str) -> Option<Vec<NaiveDate>> {
        self.caches.lock().dates.value(&keys::dates(service_id))
    }

    pub fn cached_time_slots(&self, service_id: &str, date: NaiveDate) -> Option<Vec<TimeSlot>> {
        self.caches
            .lock()
            .time_slots
            .value(&keys::time_slots(service_id, date))
    }

    /// Drop cached dates and slots for a service. Outstanding fetches for
    /// them are discarded when they settle.
    pub fn invalidate_service_availability(&self, service_id: &str) {
        let mut caches = self.caches.lock();
        let dates = usize::from(caches.dates.invalidate(&keys::dates(service_id)));
        let slots = caches
            .time_slots
            .invalidate_prefix(&keys::time_slots_prefix(service_id));
        debug!(
            service_id = service_id,
            dates,
            slots,
            "Invalidated cached availability"
        );
    }

    /// Drop cached slots for one service/date, e.g. after a booking conflict.
    pub fn invalidate_time_slots(&self, service_id: &str, date: NaiveDate) {
        let mut caches = self.caches.lock();
        caches.time_slots.invalidate(&keys::time_slots(service_id, date));
        caches.dates.invalidate(&keys::dates(service_id));
        debug!(service_id = service_id, %date, "Invalidated cached time slots");
    }

    /// Forget everything, including outstanding fetches.
    pub fn clear(&self) {
        self.caches.lock().clear();
    }

    async fn fetch<V, Call, Fut>(
        &self,
        kind: ResourceKind,
        key: String,
        force_refresh: bool,
        select: Select<V>,
        call: Call,
    ) -> Result<V, FetchError>
    where
        V: Clone + Send + Sync + 'static,
        Call: FnOnce(Arc<dyn BookingApi>) -> Fut,
        Fut: Future<Output = Result<V, ApiError>> + Send + 'static,
    {
        let pending = {
            let mut caches = self.caches.lock();
            let cache = select(&mut caches);
            if !force_refresh {
                if let Some(value) = cache.value(&key) {
                    debug!(resource = %kind, key = %key, "Cache hit");
                    return Ok(value);
                }
            }
            match cache.in_flight(&key).filter(|_| !force_refresh) {
                Some(handle) => {
                    debug!(resource = %kind, key = %key, "Joining in-flight request");
                    handle
                }
                None => self.issue(&mut caches, kind, key, select, call),
            }
        };
        pending.await
    }

    /// Start a fetch under a fresh generation and register it in the cache.
    /// Caller holds the cache lock; the state lock is taken inside it. The
    /// spawned task cannot settle before `begin` registers it, since settling
    /// needs the same cache lock.
    fn issue<V, Call, Fut>(
        &self,
        caches: &mut Caches,
        kind: ResourceKind,
        key: String,
        select: Select<V>,
        call: Call,
    ) -> SharedFetch<V>
    where
        V: Clone + Send + Sync + 'static,
        Call: FnOnce(Arc<dyn BookingApi>) -> Fut,
        Fut: Future<Output = Result<V, ApiError>> + Send + 'static,
    {
        caches.next_generation += 1;
        let generation = caches.next_generation;
        caches.latest_by_kind.insert(kind, generation);
        self.state.lock().begin_loading(kind);

        info!(resource = %kind, key = %key, generation, "Fetching resource");

        let request = call(Arc::clone(&self.api));
        let timeout = self.request_timeout;
        let shared_caches = Arc::clone(&self.caches);
        let shared_state = Arc::clone(&self.state);
        let task_key = key.clone();

        // The request runs as its own task so it settles, clearing the
        // loading flag and the in-flight handle, even when every caller has
        // stopped waiting for it.
        let task = tokio::spawn(async move {
            let outcome = match tokio::time::timeout(timeout, request).await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(e)) => Err(classify(&e)),
                Err(_) => Err(classify(&ApiError::Timeout(timeout))),
            };
            settle(
                &shared_caches,
                &shared_state,
                kind,
                &task_key,
                generation,
                select,
                outcome,
            )
        });

        let handle = async move {
            match task.await {
                Ok(result) => result,
                Err(e) => match e.try_into_panic() {
                    Ok(panic) => std::panic::resume_unwind(panic),
                    Err(e) => Err(FetchError::Failed(
                        ApiFailure::new(ErrorKind::Server).with_details(e.to_string()),
                    )),
                },
            }
        }
        .boxed()
        .shared();

        select(caches).begin(&key, generation, handle.clone());
        handle
    }
}

/// Apply a finished fetch. Runs exactly once per issued fetch, inside the
/// spawned request task, so joined callers never apply twice.
fn settle<V: Clone>(
    caches: &Mutex<Caches>,
    state: &Mutex<BookingState>,
    kind: ResourceKind,
    key: &str,
    generation: u64,
    select: Select<V>,
    outcome: Result<V, ApiFailure>,
) -> Result<V, FetchError> {
    let mut caches = caches.lock();
    let current = select(&mut caches).settle(key, generation, outcome.as_ref().ok().cloned());
    let owns_flags = caches.latest_by_kind.get(&kind) == Some(&generation);

    if owns_flags {
        let failure = if current {
            outcome.as_ref().err().cloned()
        } else {
            None
        };
        state.lock().finish_loading(kind, failure);
    }
    drop(caches);

    if !current {
        warn!(resource = %kind, key = key, generation, "Discarding superseded response");
        return Err(FetchError::Superseded {
            key: key.to_string(),
        });
    }

    match outcome {
        Ok(value) => {
            debug!(resource = %kind, key = key, generation, "Resource cached");
            Ok(value)
        }
        Err(failure) => {
            warn!(
                resource = %kind,
                key = key,
                kind = %failure.kind,
                status = ?failure.status,
                retryable = failure.kind.is_transient(),
                "Resource fetch failed"
            );
            Err(FetchError::Failed(failure))
        }
    }
}
