//! In-Flight Registry Module
//!
//! Tracks at most one pending computation per key so that concurrent callers
//! await a single producer call instead of repeating it.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::watch;

use crate::cache::CacheKey;
use crate::error::MemoError;

/// Result shared with joiners; `None` until the creator settles.
type Outcome<V, E> = Option<Result<V, Arc<E>>>;

// == Flight ==
/// Role handed out by [`InFlightRegistry::join_or_create`].
#[derive(Debug)]
pub enum Flight<V, E> {
    /// First caller for the key; must run the producer and publish
    Creator(Publisher<V, E>),
    /// Later caller; awaits the creator's outcome
    Joiner(PendingHandle<V, E>),
}

// == Publisher ==
/// Sending half of a pending computation, owned by its creator.
///
/// Dropping it without publishing closes the channel, which joiners observe
/// as `MemoError::Cancelled`.
#[derive(Debug)]
pub struct Publisher<V, E> {
    id: u64,
    tx: watch::Sender<Outcome<V, E>>,
}

impl<V, E> Publisher<V, E> {
    /// Identifier of this flight within its registry.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Delivers the outcome to every current joiner.
    pub fn publish(self, outcome: Result<V, Arc<E>>) {
        self.tx.send_replace(Some(outcome));
    }
}

// == Pending Handle ==
/// Receiving half of a pending computation.
///
/// Dropping a handle detaches the joiner without affecting anyone else.
#[derive(Debug)]
pub struct PendingHandle<V, E> {
    rx: watch::Receiver<Outcome<V, E>>,
}

impl<V: Clone, E> PendingHandle<V, E> {
    // == Wait ==
    /// Waits for the creator to settle.
    pub async fn wait(mut self) -> Result<V, MemoError<E>> {
        match self.rx.wait_for(Option::is_some).await {
            Ok(outcome) => match outcome.as_ref() {
                Some(Ok(value)) => Ok(value.clone()),
                Some(Err(err)) => Err(MemoError::Producer(Arc::clone(err))),
                None => Err(MemoError::Cancelled),
            },
            Err(_) => Err(MemoError::Cancelled),
        }
    }
}

// == In-Flight Registry ==
/// Map of keys to their pending computation.
#[derive(Debug)]
pub struct InFlightRegistry<V, E> {
    pending: HashMap<CacheKey, (u64, watch::Receiver<Outcome<V, E>>)>,
    next_id: u64,
}

impl<V, E> Default for InFlightRegistry<V, E> {
    fn default() -> Self {
        Self {
            pending: HashMap::new(),
            next_id: 0,
        }
    }
}

impl<V, E> InFlightRegistry<V, E> {
    pub fn new() -> Self {
        Self::default()
    }

    // == Join Or Create ==
    /// Joins the computation pending for `key`, or registers a new one.
    ///
    /// Exactly one caller per key receives `Flight::Creator` until the key is
    /// released.
    pub fn join_or_create(&mut self, key: &CacheKey) -> Flight<V, E> {
        if let Some((_, rx)) = self.pending.get(key) {
            return Flight::Joiner(PendingHandle { rx: rx.clone() });
        }

        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);

        let (tx, rx) = watch::channel(None);
        self.pending.insert(key.clone(), (id, rx));
        Flight::Creator(Publisher { id, tx })
    }

    // == Release ==
    /// Removes whatever computation is pending for `key`.
    pub fn release(&mut self, key: &CacheKey) -> bool {
        self.pending.remove(key).is_some()
    }

    /// Removes the entry for `key` only if it still belongs to flight `id`.
    pub fn release_flight(&mut self, key: &CacheKey, id: u64) -> bool {
        match self.pending.get(key) {
            Some((current, _)) if *current == id => {
                self.pending.remove(key);
                true
            }
            _ => false,
        }
    }

    pub fn is_pending(&self, key: &CacheKey) -> bool {
        self.pending.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready, task};

    type Registry = InFlightRegistry<u32, String>;

    fn key(n: u32) -> CacheKey {
        CacheKey::from_args(&n).unwrap()
    }

    fn expect_creator(flight: Flight<u32, String>) -> Publisher<u32, String> {
        match flight {
            Flight::Creator(publisher) => publisher,
            Flight::Joiner(_) => panic!("expected creator"),
        }
    }

    fn expect_joiner(flight: Flight<u32, String>) -> PendingHandle<u32, String> {
        match flight {
            Flight::Joiner(handle) => handle,
            Flight::Creator(_) => panic!("expected joiner"),
        }
    }

    #[test]
    fn test_one_creator_per_key() {
        let mut registry = Registry::new();

        let _creator = expect_creator(registry.join_or_create(&key(1)));
        let _joiner = expect_joiner(registry.join_or_create(&key(1)));
        let _other = expect_creator(registry.join_or_create(&key(2)));

        assert_eq!(registry.len(), 2);
        assert!(registry.is_pending(&key(1)));
    }

    #[test]
    fn test_release_allows_new_creator() {
        let mut registry = Registry::new();

        let first = expect_creator(registry.join_or_create(&key(1)));
        assert!(registry.release(&key(1)));
        assert!(!registry.release(&key(1)));

        let second = expect_creator(registry.join_or_create(&key(1)));
        assert_ne!(first.id(), second.id());
        assert!(!registry.is_empty());
    }

    #[test]
    fn test_release_flight_ignores_stale_id() {
        let mut registry = Registry::new();

        let first = expect_creator(registry.join_or_create(&key(1)));
        registry.release(&key(1));
        let second = expect_creator(registry.join_or_create(&key(1)));

        assert!(!registry.release_flight(&key(1), first.id()));
        assert!(registry.is_pending(&key(1)));
        assert!(registry.release_flight(&key(1), second.id()));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_joiners_receive_published_value() {
        let mut registry = Registry::new();

        let creator = expect_creator(registry.join_or_create(&key(1)));
        let mut first = task::spawn(expect_joiner(registry.join_or_create(&key(1))).wait());
        let mut second = task::spawn(expect_joiner(registry.join_or_create(&key(1))).wait());

        assert_pending!(first.poll());
        assert_pending!(second.poll());

        registry.release(&key(1));
        creator.publish(Ok(7));

        assert!(first.is_woken());
        assert_eq!(assert_ready!(first.poll()).unwrap(), 7);
        assert_eq!(assert_ready!(second.poll()).unwrap(), 7);
    }

    #[test]
    fn test_joiners_share_producer_error() {
        let mut registry = Registry::new();

        let creator = expect_creator(registry.join_or_create(&key(1)));
        let mut joiner = task::spawn(expect_joiner(registry.join_or_create(&key(1))).wait());
        assert_pending!(joiner.poll());

        let err = Arc::new("upstream timeout".to_string());
        creator.publish(Err(Arc::clone(&err)));

        match assert_ready!(joiner.poll()) {
            Err(MemoError::Producer(shared)) => assert!(Arc::ptr_eq(&shared, &err)),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_dropped_creator_cancels_joiners() {
        let mut registry = Registry::new();

        let creator = expect_creator(registry.join_or_create(&key(1)));
        let mut joiner = task::spawn(expect_joiner(registry.join_or_create(&key(1))).wait());
        assert_pending!(joiner.poll());

        drop(creator);
        registry.release(&key(1));

        assert!(matches!(
            assert_ready!(joiner.poll()),
            Err(MemoError::Cancelled)
        ));
    }

    #[test]
    fn test_outcome_published_before_join_is_seen() {
        let mut registry = Registry::new();

        let creator = expect_creator(registry.join_or_create(&key(1)));
        let handle = expect_joiner(registry.join_or_create(&key(1)));
        creator.publish(Ok(3));

        let mut joiner = task::spawn(handle.wait());
        assert_eq!(assert_ready!(joiner.poll()).unwrap(), 3);
    }
}
