//! Cache Region Module
//!
//! A named store of entries with a self-rescheduling expiration sweep and
//! add/delete/load hooks.
//!
//! # Locking
//! The entry map, the sweep timer and the callback lists sit behind one
//! region-wide `RwLock`. User callbacks never run while that lock is held:
//! mutating operations copy the callback list, release the lock, run the
//! callbacks and re-acquire the lock only if the store still needs changing.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::{RwLock, RwLockWriteGuard};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace};

use crate::cache::entry::Entry;
use crate::cache::stats::{CacheStats, StatsCounters};
use crate::error::{CacheError, Result};
use crate::tasks::schedule_sweep;

/// Extra arguments forwarded to a region's loader on a miss.
pub type LoaderArg = serde_json::Value;

/// Synthesizes an entry for a key that is not in the region.
pub type Loader<K, V> = Arc<dyn Fn(&K, &[LoaderArg]) -> Option<Entry<K, V>> + Send + Sync>;

/// Callback invoked with an entry that was just added or is about to be deleted.
pub type EntryCallback<K, V> = Arc<dyn Fn(&Entry<K, V>) + Send + Sync>;

/// Bounds required of region keys.
pub trait CacheKey: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static {}

impl<T> CacheKey for T where T: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static {}

/// Shortest delay a sweep timer is armed for.
const MIN_SWEEP_DELAY: Duration = Duration::from_millis(1);

type StateGuard<'a, K, V> = RwLockWriteGuard<'a, RegionState<K, V>>;

// == Region ==
/// A named collection of entries with time-based expiry.
///
/// Regions are always handed out as `Arc<Region<K, V>>` so the sweep timer
/// can reach back into the region when it fires.
pub struct Region<K, V> {
    name: String,
    state: RwLock<RegionState<K, V>>,
    stats: StatsCounters,
    this: Weak<Region<K, V>>,
}

struct RegionState<K, V> {
    entries: HashMap<K, Arc<Entry<K, V>>>,
    /// Armed sweep timer, at most one at a time
    timer: Option<JoinHandle<()>>,
    /// Bumped on every cancel so in-flight timers can tell they were revoked
    timer_generation: u64,
    /// Wait the current timer was armed with, zero = no sweep scheduled
    sweep_interval: Duration,
    loader: Option<Loader<K, V>>,
    on_add: Vec<EntryCallback<K, V>>,
    on_delete: Vec<EntryCallback<K, V>>,
}

impl<K, V> RegionState<K, V> {
    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.timer_generation = self.timer_generation.wrapping_add(1);
    }
}

impl<K, V> Region<K, V>
where
    K: CacheKey,
    V: Send + Sync + 'static,
{
    // == Constructor ==
    /// Creates an empty region. Most callers go through the registry instead.
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        let name = name.into();
        info!(region = %name, "Region created");

        Arc::new_cyclic(|this| Self {
            name,
            state: RwLock::new(RegionState {
                entries: HashMap::new(),
                timer: None,
                timer_generation: 0,
                sweep_interval: Duration::ZERO,
                loader: None,
                on_add: Vec::new(),
                on_delete: Vec::new(),
            }),
            stats: StatsCounters::default(),
            this: this.clone(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    // == Add ==
    /// Inserts a new entry, replacing any entry under the same key.
    ///
    /// On-add callbacks run after the entry is visible to other callers. If
    /// the new ttl is shorter than the currently scheduled wait, a sweep runs
    /// right away to pull the timer in.
    pub fn add(&self, key: K, ttl: Duration, value: V) -> Arc<Entry<K, V>> {
        let entry = Arc::new(Entry::new(key, ttl, value));
        self.add_internal(self.state.write(), Arc::clone(&entry));
        entry
    }

    // == Not Found Add ==
    /// Inserts the entry only if the key is absent.
    ///
    /// Returns `false` without touching the store if the key already exists.
    pub fn not_found_add(&self, key: K, ttl: Duration, value: V) -> bool {
        let state = self.state.write();
        if state.entries.contains_key(&key) {
            return false;
        }
        self.add_internal(state, Arc::new(Entry::new(key, ttl, value)));
        true
    }

    fn add_internal(&self, mut state: StateGuard<'_, K, V>, entry: Arc<Entry<K, V>>) {
        debug!(
            region = %self.name,
            "Adding entry {:?} with ttl {:?}",
            entry.key(),
            entry.ttl()
        );
        state
            .entries
            .insert(entry.key().clone(), Arc::clone(&entry));
        self.stats.record_addition();

        let sweep_interval = state.sweep_interval;
        let on_add = state.on_add.clone();
        drop(state);

        for callback in &on_add {
            callback(&entry);
        }

        let ttl = entry.ttl();
        if !ttl.is_zero() && (sweep_interval.is_zero() || ttl < sweep_interval) {
            self.expiration_check(None);
        }
    }

    // == Delete ==
    /// Removes an entry, running on-delete and then on-expire callbacks first.
    ///
    /// # Errors
    /// Returns [`CacheError::KeyNotFound`] if the key is absent.
    pub fn delete(&self, key: &K) -> Result<Arc<Entry<K, V>>> {
        let mut state = self.state.write();
        let result = self.delete_internal(&mut state, key, None);
        drop(state);

        if result.is_ok() {
            self.stats.record_deletion();
        }
        result
    }

    /// Shared delete path for explicit deletes and the sweep.
    ///
    /// The write lock is released while callbacks run. An entry that another
    /// caller is already removing counts as absent. When `expected` is given,
    /// the key is only removed if it still maps to that exact entry.
    fn delete_internal(
        &self,
        state: &mut StateGuard<'_, K, V>,
        key: &K,
        expected: Option<&Arc<Entry<K, V>>>,
    ) -> Result<Arc<Entry<K, V>>> {
        let entry = match state.entries.get(key) {
            Some(current) if expected.map_or(true, |e| Arc::ptr_eq(e, current)) => {
                Arc::clone(current)
            }
            _ => return Err(CacheError::key_not_found(key)),
        };
        // Only one deleter may run the callbacks and remove the entry.
        if !entry.begin_removal() {
            return Err(CacheError::key_not_found(key));
        }
        let on_delete = state.on_delete.clone();

        RwLockWriteGuard::unlocked(state, || {
            for callback in &on_delete {
                callback(&entry);
            }
            for callback in entry.on_expire_callbacks() {
                callback(key);
            }
        });

        // A callback may have replaced the entry while the lock was released.
        if state
            .entries
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, &entry))
        {
            state.entries.remove(key);
        }

        debug!(
            region = %self.name,
            "Deleted entry {:?} created at {} after {} hit(s)",
            key,
            entry.created_at(),
            entry.access_count()
        );
        Ok(entry)
    }

    // == Value ==
    /// Fetches an entry, refreshing its access metadata.
    ///
    /// Equivalent to [`Region::value_with`] with no loader arguments.
    pub fn value(&self, key: &K) -> Result<Arc<Entry<K, V>>> {
        self.value_with(key, &[])
    }

    /// Fetches an entry, falling back to the region's loader on a miss.
    ///
    /// # Errors
    /// - [`CacheError::KeyNotFound`] on a miss with no loader configured
    /// - [`CacheError::KeyNotFoundOrNotLoadable`] if the loader returned nothing
    pub fn value_with(&self, key: &K, args: &[LoaderArg]) -> Result<Arc<Entry<K, V>>> {
        let (hit, loader) = {
            let state = self.state.read();
            (state.entries.get(key).cloned(), state.loader.clone())
        };

        if let Some(entry) = hit {
            entry.keep_alive();
            self.stats.record_hit();
            return Ok(entry);
        }
        self.stats.record_miss();

        let Some(loader) = loader else {
            return Err(CacheError::key_not_found(key));
        };

        match loader(key, args) {
            Some(entry) => {
                let entry = Arc::new(entry);
                self.stats.record_load();
                self.add_internal(self.state.write(), Arc::clone(&entry));
                Ok(entry)
            }
            None => Err(CacheError::not_loadable(key)),
        }
    }

    // == Lookups ==
    /// Checks membership without refreshing the entry.
    pub fn exists(&self, key: &K) -> bool {
        self.state.read().entries.contains_key(key)
    }

    /// Number of live entries.
    pub fn count(&self) -> usize {
        self.state.read().entries.len()
    }

    /// Wait the current sweep timer was armed with, zero if none is armed.
    pub fn sweep_interval(&self) -> Duration {
        self.state.read().sweep_interval
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot(self.count())
    }

    // == Flush ==
    /// Drops every entry and cancels the sweep timer.
    ///
    /// No on-delete or on-expire callbacks fire.
    pub fn flush(&self) {
        let mut state = self.state.write();
        info!(region = %self.name, "Flushing {} entries", state.entries.len());

        state.entries = HashMap::new();
        state.sweep_interval = Duration::ZERO;
        state.cancel_timer();
    }

    // == Foreach ==
    /// Calls `f` for every entry while holding the write lock throughout.
    ///
    /// This blocks every other operation on the region for the whole
    /// traversal; keep `f` short and avoid it on hot paths.
    pub fn foreach<F>(&self, mut f: F)
    where
        F: FnMut(&K, &Arc<Entry<K, V>>),
    {
        let state = self.state.write();
        for (key, entry) in state.entries.iter() {
            f(key, entry);
        }
    }

    // == Most Accessed ==
    /// Returns up to `count` entries ordered by descending access count.
    ///
    /// Counts are snapshotted first and the top keys resolved afterwards. A
    /// key deleted in between is skipped but still uses up a slot, so fewer
    /// than `count` entries may come back.
    pub fn most_accessed(&self, count: usize) -> Vec<Arc<Entry<K, V>>> {
        let mut ranked: Vec<(K, u64)> = {
            let state = self.state.read();
            state
                .entries
                .iter()
                .map(|(key, entry)| (key.clone(), entry.access_count()))
                .collect()
        };
        ranked.sort_unstable_by(|a, b| b.1.cmp(&a.1));

        let state = self.state.read();
        ranked
            .iter()
            .take(count)
            .filter_map(|(key, _)| state.entries.get(key).cloned())
            .collect()
    }

    // == Callback Mutators ==
    /// Sets the loader consulted by [`Region::value_with`] on a miss.
    pub fn set_data_loader<F>(&self, f: F)
    where
        F: Fn(&K, &[LoaderArg]) -> Option<Entry<K, V>> + Send + Sync + 'static,
    {
        self.state.write().loader = Some(Arc::new(f));
    }

    /// Replaces every on-add callback with `f`.
    pub fn set_on_add<F>(&self, f: F)
    where
        F: Fn(&Entry<K, V>) + Send + Sync + 'static,
    {
        let mut state = self.state.write();
        state.on_add.clear();
        state.on_add.push(Arc::new(f));
    }

    pub fn add_on_add<F>(&self, f: F)
    where
        F: Fn(&Entry<K, V>) + Send + Sync + 'static,
    {
        self.state.write().on_add.push(Arc::new(f));
    }

    pub fn clear_on_add(&self) {
        self.state.write().on_add.clear();
    }

    /// Replaces every on-delete callback with `f`.
    pub fn set_on_delete<F>(&self, f: F)
    where
        F: Fn(&Entry<K, V>) + Send + Sync + 'static,
    {
        let mut state = self.state.write();
        state.on_delete.clear();
        state.on_delete.push(Arc::new(f));
    }

    pub fn add_on_delete<F>(&self, f: F)
    where
        F: Fn(&Entry<K, V>) + Send + Sync + 'static,
    {
        self.state.write().on_delete.push(Arc::new(f));
    }

    pub fn clear_on_delete(&self) {
        self.state.write().on_delete.clear();
    }

    // == Expiration Sweep ==
    /// Removes expired entries and re-arms the timer for the next deadline.
    ///
    /// `fired` carries the generation of the timer that triggered this run;
    /// a run whose timer was cancelled in the meantime does nothing.
    fn expiration_check(&self, fired: Option<u64>) {
        let mut state = self.state.write();
        if let Some(generation) = fired {
            if generation != state.timer_generation {
                trace!(region = %self.name, "Ignoring revoked sweep timer");
                return;
            }
        }
        state.cancel_timer();

        if state.sweep_interval.is_zero() {
            debug!(region = %self.name, "Expiration check installed");
        } else {
            debug!(
                region = %self.name,
                "Expiration check triggered after {:?}",
                state.sweep_interval
            );
        }

        let now = Instant::now();
        let expired: Vec<(K, Arc<Entry<K, V>>)> = state
            .entries
            .iter()
            .filter(|(_, entry)| !entry.is_removing() && entry.is_expired_at(now))
            .map(|(key, entry)| (key.clone(), Arc::clone(entry)))
            .collect();

        for (key, entry) in &expired {
            if self.delete_internal(&mut state, key, Some(entry)).is_ok() {
                self.stats.record_expiration();
            }
        }

        // Callbacks ran unlocked, so the store and the timer may have moved on.
        let now = Instant::now();
        let next = state
            .entries
            .values()
            .filter(|entry| !entry.is_removing())
            .filter_map(|entry| entry.remaining_at(now))
            .min();
        state.cancel_timer();

        match next {
            Some(remaining) => {
                let delay = remaining.max(MIN_SWEEP_DELAY);
                let generation = state.timer_generation;
                let region = self.this.clone();

                let armed = schedule_sweep(delay, move || {
                    if let Some(region) = region.upgrade() {
                        region.expiration_check(Some(generation));
                    }
                });
                match armed {
                    Ok(timer) => {
                        state.sweep_interval = delay;
                        state.timer = Some(timer);
                        debug!(region = %self.name, "Next sweep scheduled in {:?}", delay);
                    }
                    Err(err) => {
                        // Left unscheduled; the next add with a ttl retries.
                        state.sweep_interval = Duration::ZERO;
                        error!(region = %self.name, "Sweep not scheduled: {}", err);
                    }
                }
            }
            None => state.sweep_interval = Duration::ZERO,
        }
    }
}

impl<K, V> Drop for Region<K, V> {
    fn drop(&mut self) {
        self.state.get_mut().cancel_timer();
    }
}

impl<K, V> fmt::Debug for Region<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("Region")
            .field("name", &self.name)
            .field("entries", &state.entries.len())
            .field("sweep_interval", &state.sweep_interval)
            .finish()
    }
}
