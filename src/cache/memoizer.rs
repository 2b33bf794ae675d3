//! Memoizer Module
//!
//! Wraps an async producer with a per-instance cache store and in-flight
//! registry, honouring the per-call `ignore_cache` / `update_cache` flags.

use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::{
    CacheKey, CacheStats, CacheStore, CallArgs, CallOptions, Clock, Flight, InFlightRegistry,
    PendingHandle, Publisher, SystemClock,
};
use crate::config::CacheConfig;
use crate::error::{CacheError, MemoError};

// == Produced ==
/// A producer's result together with its caching verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Produced<V> {
    /// Return the value and cache it
    Store(V),
    /// Return the value without caching it
    Skip(V),
}

impl<V> Produced<V> {
    /// Builds a result from a `cacheable` flag.
    pub fn new(cacheable: bool, value: V) -> Self {
        if cacheable {
            Produced::Store(value)
        } else {
            Produced::Skip(value)
        }
    }

    pub fn is_cacheable(&self) -> bool {
        matches!(self, Produced::Store(_))
    }

    pub fn value(&self) -> &V {
        match self {
            Produced::Store(value) | Produced::Skip(value) => value,
        }
    }

    pub fn into_value(self) -> V {
        match self {
            Produced::Store(value) | Produced::Skip(value) => value,
        }
    }
}

type ProducerFn<A, V, E> =
    dyn Fn(A) -> BoxFuture<'static, Result<Produced<V>, E>> + Send + Sync;

/// Store and registry guarded together so check-then-act stays atomic.
struct MemoState<V, E> {
    store: CacheStore<V>,
    inflight: InFlightRegistry<V, E>,
}

type SharedState<V, E> = Arc<Mutex<MemoState<V, E>>>;

// == Memoizer ==
/// Memoizing adapter around an async producer.
///
/// Clones share the same cache and in-flight state; independently built
/// memoizers share nothing.
pub struct Memoizer<A, V, E> {
    state: SharedState<V, E>,
    producer: Arc<ProducerFn<A, V, E>>,
}

impl<A, V, E> Clone for Memoizer<A, V, E> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            producer: Arc::clone(&self.producer),
        }
    }
}

/// What a call does after the bookkeeping under the lock.
enum Step<V, E> {
    Hit(V),
    Join(PendingHandle<V, E>),
    Run(Option<FlightGuard<V, E>>),
}

impl<A, V, E> Memoizer<A, V, E>
where
    A: Serialize + Send + 'static,
    V: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    // == Constructor ==
    /// Wraps `producer` with a cache using the system clock.
    ///
    /// Fails if `config` is invalid.
    pub fn new<F, Fut>(config: CacheConfig, producer: F) -> Result<Self, CacheError>
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Produced<V>, E>> + Send + 'static,
    {
        Self::with_clock(config, Arc::new(SystemClock), producer)
    }

    /// Wraps `producer` with a cache driven by `clock`.
    pub fn with_clock<F, Fut>(
        config: CacheConfig,
        clock: Arc<dyn Clock>,
        producer: F,
    ) -> Result<Self, CacheError>
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Produced<V>, E>> + Send + 'static,
    {
        let store = CacheStore::with_clock(&config, clock)?;
        let producer: Arc<ProducerFn<A, V, E>> = Arc::new(move |args| producer(args).boxed());

        Ok(Self {
            state: Arc::new(Mutex::new(MemoState {
                store,
                inflight: InFlightRegistry::new(),
            })),
            producer,
        })
    }

    /// Calls with default options.
    pub async fn get(&self, args: A) -> Result<V, MemoError<E>> {
        self.call(args, CallOptions::default()).await
    }

    // == Call ==
    /// Returns the cached value for `args`, or computes it.
    ///
    /// - Without `ignore_cache`, a fresh cached value is returned immediately,
    ///   and a computation already pending for the same key is joined.
    /// - With `ignore_cache`, the producer always runs and no other caller
    ///   can join it.
    /// - The result is written when `update_cache` is set, or when the
    ///   producer marked it cacheable and `ignore_cache` is not set.
    pub async fn call(&self, args: A, options: CallOptions) -> Result<V, MemoError<E>> {
        let key = CacheKey::from_args(&args)?;

        let step = {
            let mut state = self.state.lock();
            if options.ignore_cache {
                state.store.stats_mut().record_producer_call();
                Step::Run(None)
            } else if let Some(value) = state.store.get(&key) {
                Step::Hit(value)
            } else {
                match state.inflight.join_or_create(&key) {
                    Flight::Joiner(handle) => {
                        state.store.stats_mut().record_join();
                        Step::Join(handle)
                    }
                    Flight::Creator(publisher) => {
                        state.store.stats_mut().record_producer_call();
                        Step::Run(Some(FlightGuard {
                            state: Arc::clone(&self.state),
                            key: key.clone(),
                            publisher: Some(publisher),
                        }))
                    }
                }
            }
        };

        let mut guard = match step {
            Step::Hit(value) => {
                debug!(%key, "cache hit");
                return Ok(value);
            }
            Step::Join(handle) => {
                debug!(%key, "joining pending computation");
                return handle.wait().await;
            }
            Step::Run(guard) => guard,
        };

        debug!(%key, ignore_cache = options.ignore_cache, "invoking producer");
        let outcome = match (self.producer)(args).await {
            Ok(produced) => {
                let cacheable = produced.is_cacheable();
                let value = produced.into_value();
                let write = options.update_cache || (cacheable && !options.ignore_cache);

                let mut state = self.state.lock();
                if write {
                    state.store.put(key.clone(), value.clone());
                    debug!(%key, "cached producer result");
                }
                if let Some(guard) = guard.as_mut() {
                    guard.release(&mut state.inflight);
                }
                Ok(value)
            }
            Err(err) => {
                warn!(%key, "producer failed, result not cached");
                let mut state = self.state.lock();
                if let Some(guard) = guard.as_mut() {
                    guard.release(&mut state.inflight);
                }
                Err(Arc::new(err))
            }
        };

        if let Some(guard) = guard {
            guard.publish(outcome.clone());
        }
        outcome.map_err(MemoError::Producer)
    }

    /// Removes the cached value for `args`. Returns whether one existed.
    pub fn invalidate(&self, args: &A) -> Result<bool, CacheError> {
        let key = CacheKey::from_args(args)?;
        Ok(self.state.lock().store.remove(&key))
    }

    /// Checks for a fresh cached value without affecting recency.
    pub fn is_cached(&self, args: &A) -> Result<bool, CacheError> {
        let key = CacheKey::from_args(args)?;
        Ok(self.state.lock().store.contains(&key))
    }

    /// Drops every cached value. Pending computations are unaffected.
    pub fn clear(&self) {
        self.state.lock().store.clear();
    }

    pub fn stats(&self) -> CacheStats {
        self.state.lock().store.stats()
    }

    /// Number of cached values.
    pub fn len(&self) -> usize {
        self.state.lock().store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().store.is_empty()
    }

    /// Number of keys with a computation in flight.
    pub fn pending(&self) -> usize {
        self.state.lock().inflight.len()
    }
}

impl<V, E> Memoizer<CallArgs, V, E>
where
    V: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    // == Call Dynamic ==
    /// Strips the reserved control keywords from `args` and calls with them.
    pub async fn call_dynamic(&self, args: CallArgs) -> Result<V, MemoError<E>> {
        let (args, options) = args.split_control()?;
        self.call(args, options).await
    }
}

// == Flight Guard ==
/// Creator-side ownership of a registry entry.
///
/// Releases the entry on drop, so a creator that panics or is cancelled
/// never leaves it behind; its joiners then see `MemoError::Cancelled`.
struct FlightGuard<V, E> {
    state: SharedState<V, E>,
    key: CacheKey,
    publisher: Option<Publisher<V, E>>,
}

impl<V, E> FlightGuard<V, E> {
    /// Removes the registry entry using an already held lock.
    fn release(&mut self, inflight: &mut InFlightRegistry<V, E>) {
        if let Some(publisher) = self.publisher.as_ref() {
            inflight.release_flight(&self.key, publisher.id());
        }
    }

    fn publish(mut self, outcome: Result<V, Arc<E>>) {
        if let Some(publisher) = self.publisher.take() {
            publisher.publish(outcome);
        }
    }
}

impl<V, E> Drop for FlightGuard<V, E> {
    fn drop(&mut self) {
        if let Some(publisher) = self.publisher.take() {
            warn!(key = %self.key, "pending computation dropped before completion");
            self.state
                .lock()
                .inflight
                .release_flight(&self.key, publisher.id());
        }
    }
}
