use std::hash::Hash;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use thiserror::Error;

use super::time::{Instant, Period};
use super::tree::{PeriodTree, TraversalOrder};

/// Errors returned by collection and calendar operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PeriodError {
  /// An insert used a key that is already present in the collection.
  #[error("key is already present in the collection")]
  DuplicateKey,

  /// A lookup referenced a key that is not in the collection.
  #[error("key not found in the collection")]
  UnknownKey,

  /// A calendar producer was configured with a window that can never
  /// yield a valid period.
  #[error("malformed period configuration")]
  InvalidPeriod,
}

enum ActionKind<K, P> {
  Update {
    key: K,
    period: Period,
    payload: P,
  },
  Delete {
    key: K,
  },
}

/// A deferred mutation, prepared by [`PeriodCollection::prepare_update`]
/// or [`PeriodCollection::prepare_delete`] and applied later by
/// [`PeriodCollection::execute`] inside a single write-lock critical
/// section. The action is opaque: callers can only hand it back to the
/// collection that produced it.
pub struct Action<K, P> {
  kind: ActionKind<K, P>,
}

/// A thread-safe collection of payloads keyed by identifier and indexed
/// by time period.
///
/// The collection wraps a [`PeriodTree`] behind a reader-writer lock:
/// queries take the shared side and see a consistent snapshot for their
/// whole duration, mutations take the exclusive side. Payloads are
/// returned as clones; the collection never touches them otherwise.
///
/// Multi-step changes that must be invisible in intermediate states go
/// through [`PeriodCollection::execute`], which applies a prepared batch
/// under one lock acquisition.
///
/// # Examples
///
/// ```rust,ignore
/// let collection: PeriodCollection<u32, &str> = PeriodCollection::new();
/// collection.insert(1, Period::bounded(open, close), "business hours")?;
/// assert!(collection.any_contains_time(noon));
///
/// let batch = [
///     collection.prepare_update(1, Period::bounded(open, late_close), "extended hours"),
///     collection.prepare_delete(2),
/// ];
/// collection.execute(batch);
/// ```
pub struct PeriodCollection<K, P> {
  inner: RwLock<PeriodTree<K, P>>,
}

impl<K: Eq + Hash + Clone, P: Clone> Default for PeriodCollection<K, P> {
  fn default() -> Self {
    Self::new()
  }
}

impl<K: Eq + Hash + Clone, P: Clone> PeriodCollection<K, P> {
  /// Create an empty collection.
  pub fn new() -> Self {
    PeriodCollection {
      inner: RwLock::new(PeriodTree::new()),
    }
  }

  fn read(&self) -> RwLockReadGuard<'_, PeriodTree<K, P>> {
    self.inner.read().expect("period tree lock poisoned")
  }

  fn write(&self) -> RwLockWriteGuard<'_, PeriodTree<K, P>> {
    self.inner.write().expect("period tree lock poisoned")
  }

  /// Number of entries in the collection.
  pub fn len(&self) -> usize {
    self.read().len()
  }

  pub fn is_empty(&self) -> bool {
    self.read().is_empty()
  }

  /// Insert a new entry under `key`.
  ///
  /// # Errors
  /// Returns `DuplicateKey` when the key is already present; the
  /// collection is left untouched in that case.
  pub fn insert(&self, key: K, period: Period, payload: P) -> Result<(), PeriodError> {
    self.write().insert(key, period, payload)
  }

  /// Insert or replace the entry stored under `key`.
  ///
  /// An absent key inserts. A present key with an unchanged period swaps
  /// the payload in place; a changed period relocates the entry.
  pub fn update(&self, key: K, period: Period, payload: P) {
    self.write().update(key, period, payload);
  }

  /// Remove the entry stored under `key`. Removing an absent key is a
  /// no-op.
  pub fn delete(&self, key: &K) {
    self.write().delete(key);
  }

  /// Remove every entry whose payload satisfies `predicate`, under a
  /// single write lock.
  ///
  /// The key set is snapshotted before any deletion, so the scan
  /// tolerates the mutations it performs. The order in which payloads
  /// are tested is unspecified.
  pub fn delete_on_condition<F>(&self, predicate: F)
  where
    F: Fn(&P) -> bool,
  {
    let mut tree = self.write();
    for key in tree.keys() {
      if tree.payload_of(&key).is_some_and(&predicate) {
        tree.delete(&key);
      }
    }
  }

  /// Returns true if `key` is present.
  pub fn contains_key(&self, key: &K) -> bool {
    self.read().contains_key(key)
  }

  /// Look up the payload stored under `key`.
  ///
  /// # Errors
  /// Returns `UnknownKey` when the key is not present.
  pub fn contents_of_key(&self, key: &K) -> Result<P, PeriodError> {
    self.read().contents_of_key(key).cloned()
  }

  /// Returns true if any stored period contains `t`.
  pub fn any_contains_time(&self, t: Instant) -> bool {
    self.read().any_contains_time(t)
  }

  /// All payloads whose period contains `t`, ordered by period start
  /// ascending.
  pub fn contains_time(&self, t: Instant) -> Vec<P> {
    self.read().contains_time(t)
  }

  /// All payloads whose period intersects `query`, ordered by period
  /// start ascending.
  pub fn intersecting(&self, query: &Period) -> Vec<P> {
    self.read().intersecting(query)
  }

  /// Returns true if any stored period intersects `query`.
  pub fn any_intersecting(&self, query: &Period) -> bool {
    self.read().any_intersecting(query)
  }

  /// All payloads in the requested depth-first order.
  pub fn depth_first_traverse(&self, order: TraversalOrder) -> Vec<P> {
    self.read().depth_first_traverse(order)
  }

  /// Prepare a deferred update for a later [`PeriodCollection::execute`]
  /// batch. Nothing is applied until the batch runs.
  pub fn prepare_update(&self, key: K, period: Period, payload: P) -> Action<K, P> {
    Action {
      kind: ActionKind::Update {
        key,
        period,
        payload,
      },
    }
  }

  /// Prepare a deferred deletion for a later
  /// [`PeriodCollection::execute`] batch.
  pub fn prepare_delete(&self, key: K) -> Action<K, P> {
    Action {
      kind: ActionKind::Delete { key },
    }
  }

  /// Apply a batch of prepared actions in order under one write-lock
  /// acquisition, so readers never observe a partially applied batch.
  pub fn execute<I>(&self, actions: I)
  where
    I: IntoIterator<Item = Action<K, P>>,
  {
    let mut tree = self.write();
    for action in actions {
      match action.kind {
        ActionKind::Update {
          key,
          period,
          payload,
        } => tree.update(key, period, payload),
        ActionKind::Delete { key } => {
          tree.delete(&key);
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::{DateTime, Duration, Utc};

  fn base() -> Instant {
    DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
      .unwrap()
      .with_timezone(&Utc)
  }

  fn secs(s: i64) -> Instant {
    base() + Duration::seconds(s)
  }

  fn p(s: i64, e: i64) -> Period {
    Period::bounded(secs(s), secs(e))
  }

  #[test]
  fn insert_query_delete_roundtrip() {
    let collection: PeriodCollection<u32, String> = PeriodCollection::new();
    assert!(collection.is_empty());

    collection.insert(1, p(0, 60), "meeting".into()).unwrap();
    collection.insert(2, p(30, 90), "standup".into()).unwrap();

    assert_eq!(collection.len(), 2);
    assert!(collection.contains_key(&1));
    assert_eq!(collection.contents_of_key(&2).unwrap(), "standup");

    assert!(collection.any_contains_time(secs(45)));
    assert_eq!(
      collection.contains_time(secs(45)),
      vec!["meeting".to_string(), "standup".to_string()]
    );

    collection.delete(&1);
    assert_eq!(collection.len(), 1);
    assert!(!collection.contains_key(&1));
    // Deleting again is a no-op
    collection.delete(&1);
    assert_eq!(collection.len(), 1);
  }

  #[test]
  fn contents_of_unknown_key_errors() {
    let collection: PeriodCollection<u32, u32> = PeriodCollection::new();
    assert_eq!(
      collection.contents_of_key(&42),
      Err(PeriodError::UnknownKey)
    );
  }

  #[test]
  fn duplicate_insert_surfaces_error() {
    let collection: PeriodCollection<u32, u32> = PeriodCollection::new();
    collection.insert(1, p(0, 10), 1).unwrap();
    assert_eq!(
      collection.insert(1, p(5, 15), 2),
      Err(PeriodError::DuplicateKey)
    );
    assert_eq!(collection.contents_of_key(&1).unwrap(), 1);
  }

  #[test]
  fn batch_execute_applies_in_order() {
    let collection: PeriodCollection<u32, &str> = PeriodCollection::new();

    let u1 = collection.prepare_update(1, p(0, 10), "one");
    let u2 = collection.prepare_update(2, p(10, 20), "two");
    let d1 = collection.prepare_delete(1);
    collection.execute([u1, u2, d1]);

    assert_eq!(collection.len(), 1);
    assert!(!collection.contains_key(&1));
    assert_eq!(collection.contents_of_key(&2).unwrap(), "two");
  }

  #[test]
  fn batch_execute_matches_sequential_application() {
    let batched: PeriodCollection<u32, u32> = PeriodCollection::new();
    let sequential: PeriodCollection<u32, u32> = PeriodCollection::new();

    for i in 0..8u32 {
      batched.insert(i, p(i as i64 * 10, i as i64 * 10 + 5), i).unwrap();
      sequential
        .insert(i, p(i as i64 * 10, i as i64 * 10 + 5), i)
        .unwrap();
    }

    let a = batched.prepare_update(3, p(100, 110), 33);
    let b = batched.prepare_delete(5);
    batched.execute([a, b]);

    sequential.update(3, p(100, 110), 33);
    sequential.delete(&5);

    assert_eq!(
      batched.depth_first_traverse(TraversalOrder::InOrder),
      sequential.depth_first_traverse(TraversalOrder::InOrder)
    );
  }

  #[test]
  fn delete_on_condition_removes_matching_payloads() {
    let collection: PeriodCollection<u32, u32> = PeriodCollection::new();
    for i in 0..20u32 {
      collection
        .insert(i, p(i as i64 * 10, i as i64 * 10 + 5), i)
        .unwrap();
    }

    collection.delete_on_condition(|payload| payload % 2 == 0);

    assert_eq!(collection.len(), 10);
    for i in 0..20u32 {
      assert_eq!(collection.contains_key(&i), i % 2 == 1);
    }
  }

  #[test]
  fn empty_batch_is_a_noop() {
    let collection: PeriodCollection<u32, u32> = PeriodCollection::new();
    collection.insert(1, p(0, 10), 1).unwrap();

    collection.execute([]);
    assert_eq!(collection.len(), 1);
  }

  #[test]
  fn batch_actions_on_one_key_apply_in_order() {
    let collection: PeriodCollection<u32, &str> = PeriodCollection::new();

    let a = collection.prepare_update(1, p(0, 10), "first");
    let b = collection.prepare_update(1, p(20, 30), "second");
    let c = collection.prepare_delete(1);
    let d = collection.prepare_update(1, p(40, 50), "third");
    collection.execute([a, b, c, d]);

    assert_eq!(collection.contents_of_key(&1).unwrap(), "third");
    assert_eq!(collection.contains_time(secs(45)), vec!["third"]);
    assert!(collection.contains_time(secs(5)).is_empty());
  }

  #[test]
  fn delete_on_condition_can_empty_the_collection() {
    let collection: PeriodCollection<u32, u32> = PeriodCollection::new();
    for i in 0..12u32 {
      collection.insert(i, p(i as i64, i as i64 + 1), i).unwrap();
    }

    collection.delete_on_condition(|_| true);
    assert!(collection.is_empty());

    // Running it again on an empty collection is fine
    collection.delete_on_condition(|_| true);
    assert!(collection.is_empty());
  }

  #[test]
  fn returned_payloads_are_clones() {
    let collection: PeriodCollection<u32, String> = PeriodCollection::new();
    collection.insert(1, p(0, 10), "stored".into()).unwrap();

    let mut fetched = collection.contents_of_key(&1).unwrap();
    fetched.push_str(" and modified");

    // Mutating the returned clone leaves the stored payload alone
    assert_eq!(collection.contents_of_key(&1).unwrap(), "stored");
  }

  #[test]
  fn concurrent_readers_and_writer() {
    let collection: PeriodCollection<u32, u32> = PeriodCollection::new();

    std::thread::scope(|scope| {
      scope.spawn(|| {
        for i in 0..200u32 {
          collection.update(i, p(i as i64, i as i64 + 100), i);
        }
      });
      for _ in 0..4 {
        scope.spawn(|| {
          for t in 0..200i64 {
            // Readers may observe any prefix of the writes, never a
            // torn structure
            let hits = collection.contains_time(secs(t));
            assert!(hits.len() <= 200);
            let _ = collection.any_intersecting(&p(t, t + 10));
          }
        });
      }
    });

    assert_eq!(collection.len(), 200);
    let all = collection.depth_first_traverse(TraversalOrder::InOrder);
    assert_eq!(all.len(), 200);
  }
}
