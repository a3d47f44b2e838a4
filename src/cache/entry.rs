//! Cache Entry Module
//!
//! Defines a single cached value with its expiry and access metadata.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

/// Callback invoked with the key right before an entry is removed.
pub type ExpireCallback<K> = Arc<dyn Fn(&K) + Send + Sync>;

// == Cache Entry ==
/// A single cached key/value pair.
///
/// The key, value and ttl are fixed at construction. Access metadata and the
/// about-to-expire callbacks live behind the entry's own lock, so reading or
/// refreshing an entry never touches the owning region's lock.
pub struct Entry<K, V> {
    key: K,
    value: V,
    /// Idle time after which the entry may be swept, zero = never
    ttl: Duration,
    created_on: Instant,
    created_at: DateTime<Utc>,
    /// Set once a deleter has claimed the entry
    removing: AtomicBool,
    state: RwLock<EntryState<K>>,
}

struct EntryState<K> {
    accessed_on: Instant,
    accessed_at: DateTime<Utc>,
    access_count: u64,
    on_expire: Vec<ExpireCallback<K>>,
}

impl<K, V> Entry<K, V> {
    // == Constructor ==
    /// Creates a new entry. A zero `ttl` means the entry never expires.
    pub fn new(key: K, ttl: Duration, value: V) -> Self {
        let now = Instant::now();
        let wall = Utc::now();
        Self {
            key,
            value,
            ttl,
            created_on: now,
            created_at: wall,
            removing: AtomicBool::new(false),
            state: RwLock::new(EntryState {
                accessed_on: now,
                accessed_at: wall,
                access_count: 0,
                on_expire: Vec::new(),
            }),
        }
    }

    // == Keep Alive ==
    /// Marks the entry as accessed now, restarting its expiry clock.
    pub fn keep_alive(&self) {
        let mut state = self.state.write();
        state.accessed_on = Instant::now();
        state.accessed_at = Utc::now();
        state.access_count += 1;
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Wall-clock time of the last access (creation time if never read).
    pub fn last_accessed(&self) -> DateTime<Utc> {
        self.state.read().accessed_at
    }

    /// Number of successful reads through the owning region.
    pub fn access_count(&self) -> u64 {
        self.state.read().access_count
    }

    // == Expiry ==
    /// Time since the last access, measured on the monotonic clock.
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.state.read().accessed_on)
    }

    /// Whether the entry has been idle longer than its ttl at `now`.
    pub fn is_expired_at(&self, now: Instant) -> bool {
        !self.ttl.is_zero() && self.idle_for(now) > self.ttl
    }

    /// Remaining lifetime at `now`; `None` for entries that never expire.
    pub fn remaining_at(&self, now: Instant) -> Option<Duration> {
        if self.ttl.is_zero() {
            return None;
        }
        Some(self.ttl.saturating_sub(self.idle_for(now)))
    }

    // == Removal ==
    /// Claims the entry for deletion; only the first caller gets `true`.
    pub(crate) fn begin_removal(&self) -> bool {
        !self.removing.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn is_removing(&self) -> bool {
        self.removing.load(Ordering::Acquire)
    }

    // == About-to-expire Callbacks ==
    /// Replaces every about-to-expire callback with `f`.
    pub fn set_on_expire<F>(&self, f: F)
    where
        F: Fn(&K) + Send + Sync + 'static,
    {
        let mut state = self.state.write();
        state.on_expire.clear();
        state.on_expire.push(Arc::new(f));
    }

    /// Appends an about-to-expire callback.
    pub fn add_on_expire<F>(&self, f: F)
    where
        F: Fn(&K) + Send + Sync + 'static,
    {
        self.state.write().on_expire.push(Arc::new(f));
    }

    /// Drops every about-to-expire callback.
    pub fn clear_on_expire(&self) {
        self.state.write().on_expire.clear();
    }

    /// Copies the current callback list out from under the read lock.
    pub(crate) fn on_expire_callbacks(&self) -> Vec<ExpireCallback<K>> {
        self.state.read().on_expire.clone()
    }

    // == Info ==
    /// Returns a serializable snapshot of the entry's metadata.
    pub fn info(&self) -> EntryInfo {
        let state = self.state.read();
        EntryInfo {
            ttl_ms: saturating_millis(self.ttl),
            created_at: self.created_at,
            last_accessed: state.accessed_at,
            access_count: state.access_count,
            age_ms: saturating_millis(state.accessed_on.duration_since(self.created_on)),
        }
    }
}

fn saturating_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl<K: fmt::Debug, V> fmt::Debug for Entry<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("Entry")
            .field("key", &self.key)
            .field("ttl", &self.ttl)
            .field("created_at", &self.created_at)
            .field("last_accessed", &state.accessed_at)
            .field("access_count", &state.access_count)
            .field("on_expire", &state.on_expire.len())
            .finish()
    }
}

// == Entry Info ==
/// Point-in-time view of an entry's metadata.
#[derive(Debug, Clone, Serialize)]
pub struct EntryInfo {
    /// Configured ttl in milliseconds, 0 = never expires
    pub ttl_ms: u64,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub access_count: u64,
    /// Time between creation and last access in milliseconds
    pub age_ms: u64,
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread::sleep;

    #[test]
    fn test_entry_creation() {
        let entry = Entry::new("k", Duration::from_secs(1), "v");

        assert_eq!(*entry.key(), "k");
        assert_eq!(*entry.value(), "v");
        assert_eq!(entry.ttl(), Duration::from_secs(1));
        assert_eq!(entry.access_count(), 0);
        assert_eq!(entry.created_at(), entry.last_accessed());
    }

    #[test]
    fn test_keep_alive_updates_metadata() {
        let entry = Entry::new("k", Duration::ZERO, 1);
        sleep(Duration::from_millis(5));

        entry.keep_alive();
        entry.keep_alive();

        assert_eq!(entry.access_count(), 2);
        assert!(entry.last_accessed() > entry.created_at());
    }

    #[test]
    fn test_zero_ttl_never_expires() {
        let entry = Entry::new("k", Duration::ZERO, ());
        let later = Instant::now() + Duration::from_secs(3600);

        assert!(!entry.is_expired_at(later));
        assert!(entry.remaining_at(later).is_none());
    }

    #[test]
    fn test_expiry_boundary() {
        let entry = Entry::new("k", Duration::from_millis(100), ());
        let created = Instant::now();

        // idle must strictly exceed ttl
        assert!(!entry.is_expired_at(created));
        assert!(entry.is_expired_at(created + Duration::from_millis(200)));
        assert_eq!(
            entry.remaining_at(created + Duration::from_millis(200)),
            Some(Duration::ZERO)
        );
    }

    #[test]
    fn test_keep_alive_resets_expiry_clock() {
        let entry = Entry::new("k", Duration::from_millis(50), ());
        sleep(Duration::from_millis(40));
        entry.keep_alive();

        let remaining = entry.remaining_at(Instant::now()).unwrap();
        assert!(remaining > Duration::from_millis(30));
    }

    #[test]
    fn test_on_expire_set_add_clear() {
        let entry = Entry::new("k", Duration::ZERO, ());
        let hits = Arc::new(AtomicUsize::new(0));

        let h = hits.clone();
        entry.add_on_expire(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        let h = hits.clone();
        entry.add_on_expire(move |_| {
            h.fetch_add(10, Ordering::SeqCst);
        });
        assert_eq!(entry.on_expire_callbacks().len(), 2);

        let h = hits.clone();
        entry.set_on_expire(move |_| {
            h.fetch_add(100, Ordering::SeqCst);
        });
        let callbacks = entry.on_expire_callbacks();
        assert_eq!(callbacks.len(), 1);
        for cb in &callbacks {
            cb(entry.key());
        }
        assert_eq!(hits.load(Ordering::SeqCst), 100);

        entry.clear_on_expire();
        assert!(entry.on_expire_callbacks().is_empty());
    }

    #[test]
    fn test_info_snapshot() {
        let entry = Entry::new("k", Duration::from_millis(1500), ());
        entry.keep_alive();

        let info = entry.info();
        assert_eq!(info.ttl_ms, 1500);
        assert_eq!(info.access_count, 1);
        assert!(info.last_accessed >= info.created_at);

        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["ttl_ms"], 1500);
    }

    #[test]
    fn test_info_saturates_huge_ttl() {
        let entry = Entry::new("k", Duration::MAX, ());
        assert_eq!(entry.info().ttl_ms, u64::MAX);
    }

    #[test]
    fn test_removal_claimed_once() {
        let entry = Entry::new("k", Duration::ZERO, ());
        assert!(!entry.is_removing());

        assert!(entry.begin_removal());
        assert!(!entry.begin_removal());
        assert!(entry.is_removing());
    }
}
