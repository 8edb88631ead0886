//! Temporary replacement of shared world state with guaranteed restoration.
//!
//! A [`TemporalRegistry`] owns at most one live [`TemporalEntry`] per key. Creating an
//! entry snapshots the current value through [`TemporalResource::read`] and writes the
//! replacement; reverting writes the snapshot back, forgets the key and then runs the
//! entry's follow-up steps, if any. Expiry is driven from outside via [`TemporalRegistry::sweep`].

use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::hash::Hash;
use std::time::Duration;

use tracing::debug;

use crate::clock::Timestamp;

/// Read/write access to the state a registry temporarily replaces.
pub trait TemporalResource {
    type Key: Clone + Eq + Hash + fmt::Debug;
    type Value: Clone;

    fn read(&self, key: &Self::Key) -> Self::Value;
    fn write(&mut self, key: &Self::Key, value: Self::Value);
}

#[derive(Debug, Clone, PartialEq)]
pub struct Replacement<V> {
    pub value: V,
    /// `None` holds the replacement until it is reverted explicitly.
    pub duration: Option<Duration>,
    pub bendable: bool,
}

impl<V> Replacement<V> {
    pub fn timed(value: V, duration: Duration) -> Self {
        Self {
            value,
            duration: Some(duration),
            bendable: false,
        }
    }

    pub fn held(value: V) -> Self {
        Self {
            value,
            duration: None,
            bendable: false,
        }
    }

    pub fn bendable(mut self) -> Self {
        self.bendable = true;
        self
    }
}

/// Identifies one specific entry. A handle outlives its entry; once the entry is
/// reverted the handle never matches again, even if the key is re-managed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TemporalHandle<K> {
    key: K,
    generation: u64,
}

impl<K> TemporalHandle<K> {
    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

pub struct TemporalEntry<R: TemporalResource> {
    handle: TemporalHandle<R::Key>,
    snapshot: R::Value,
    created_at: Timestamp,
    expires_at: Option<Timestamp>,
    bendable: bool,
    follow_up: VecDeque<Replacement<R::Value>>,
}

impl<R: TemporalResource> TemporalEntry<R> {
    pub fn handle(&self) -> &TemporalHandle<R::Key> {
        &self.handle
    }

    pub fn key(&self) -> &R::Key {
        &self.handle.key
    }

    pub fn snapshot(&self) -> &R::Value {
        &self.snapshot
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub fn expires_at(&self) -> Option<Timestamp> {
        self.expires_at
    }

    pub fn is_bendable(&self) -> bool {
        self.bendable
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at
            .is_some_and(|deadline| now.has_reached(deadline))
    }

    /// Queues a replacement that is applied to the same key right after this entry reverts.
    pub fn then(&mut self, next: Replacement<R::Value>) -> &mut Self {
        self.follow_up.push_back(next);
        self
    }

    pub fn clear_follow_up(&mut self) {
        self.follow_up.clear();
    }

    pub fn follow_up_len(&self) -> usize {
        self.follow_up.len()
    }
}

impl<R> fmt::Debug for TemporalEntry<R>
where
    R: TemporalResource,
    R::Value: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemporalEntry")
            .field("handle", &self.handle)
            .field("snapshot", &self.snapshot)
            .field("created_at", &self.created_at)
            .field("expires_at", &self.expires_at)
            .field("bendable", &self.bendable)
            .field("follow_up", &self.follow_up)
            .finish()
    }
}

pub struct TemporalRegistry<R: TemporalResource> {
    entries: HashMap<R::Key, TemporalEntry<R>>,
    next_generation: u64,
}

impl<R: TemporalResource> Default for TemporalRegistry<R> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            next_generation: 0,
        }
    }
}

impl<R: TemporalResource> TemporalRegistry<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `None` without touching anything when `key` is already managed.
    pub fn create(
        &mut self,
        key: R::Key,
        replacement: Replacement<R::Value>,
        resource: &mut R,
        now: Timestamp,
    ) -> Option<&mut TemporalEntry<R>> {
        let slot = match self.entries.entry(key) {
            Entry::Occupied(_) => return None,
            Entry::Vacant(slot) => slot,
        };
        let key = slot.key().clone();
        let snapshot = resource.read(&key);
        resource.write(&key, replacement.value);

        let generation = self.next_generation;
        self.next_generation = self.next_generation.saturating_add(1);
        Some(slot.insert(TemporalEntry {
            handle: TemporalHandle { key, generation },
            snapshot,
            created_at: now,
            expires_at: replacement.duration.map(|duration| now.saturating_add(duration)),
            bendable: replacement.bendable,
            follow_up: VecDeque::new(),
        }))
    }

    pub fn is_managed(&self, key: &R::Key) -> bool {
        self.entries.contains_key(key)
    }

    /// Unmanaged keys are always bendable.
    pub fn is_bendable(&self, key: &R::Key) -> bool {
        self.entries
            .get(key)
            .map_or(true, |entry| entry.bendable)
    }

    pub fn get(&self, key: &R::Key) -> Option<&TemporalEntry<R>> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &R::Key) -> Option<&mut TemporalEntry<R>> {
        self.entries.get_mut(key)
    }

    pub fn entries(&self) -> impl Iterator<Item = &TemporalEntry<R>> + '_ {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Restores the entry behind `handle`. Returns `false` if that entry is already gone.
    pub fn revert(
        &mut self,
        handle: &TemporalHandle<R::Key>,
        resource: &mut R,
        now: Timestamp,
    ) -> bool {
        let is_live = self
            .entries
            .get(&handle.key)
            .is_some_and(|entry| entry.handle.generation == handle.generation);
        if !is_live {
            return false;
        }
        let Some(entry) = self.entries.remove(&handle.key) else {
            return false;
        };

        let TemporalEntry {
            handle,
            snapshot,
            mut follow_up,
            ..
        } = entry;
        resource.write(&handle.key, snapshot);

        if let Some(next) = follow_up.pop_front() {
            if let Some(created) = self.create(handle.key, next, resource, now) {
                created.follow_up = follow_up;
            }
        }
        true
    }

    pub fn revert_key(&mut self, key: &R::Key, resource: &mut R, now: Timestamp) -> bool {
        let Some(handle) = self.entries.get(key).map(|entry| entry.handle.clone()) else {
            return false;
        };
        self.revert(&handle, resource, now)
    }

    /// Reverts every entry whose expiry is at or before `now`, oldest deadline first.
    /// Entries created by follow-ups during the sweep wait for a later sweep.
    pub fn sweep(&mut self, resource: &mut R, now: Timestamp) -> usize {
        let mut expired: Vec<(Timestamp, TemporalHandle<R::Key>)> = self
            .entries
            .values()
            .filter(|entry| entry.is_expired(now))
            .filter_map(|entry| {
                entry
                    .expires_at
                    .map(|deadline| (deadline, entry.handle.clone()))
            })
            .collect();
        if expired.is_empty() {
            return 0;
        }
        expired.sort_by_key(|(deadline, handle)| (*deadline, handle.generation));

        let mut reverted = 0;
        for (_, handle) in &expired {
            if self.revert(handle, resource, now) {
                reverted += 1;
            }
        }
        debug!(reverted, remaining = self.entries.len(), "temporal_sweep");
        reverted
    }

    /// Restores everything immediately, newest entry first. Follow-ups are dropped.
    pub fn revert_all(&mut self, resource: &mut R) -> usize {
        let mut drained: Vec<TemporalEntry<R>> =
            self.entries.drain().map(|(_, entry)| entry).collect();
        drained.sort_by_key(|entry| std::cmp::Reverse(entry.handle.generation));
        let count = drained.len();
        for entry in drained {
            resource.write(&entry.handle.key, entry.snapshot);
        }
        count
    }
}
