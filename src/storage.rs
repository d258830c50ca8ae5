/*!
 * In-Memory Keyspace with Per-Key Expiry
 *
 * This module provides the storage layer for emberkv: a single map from
 * key to entry guarded by one exclusive lock, with lazy expiry. An entry
 * whose deadline has passed is semantically absent even while physically
 * present; it is reclaimed on the next read that touches it, or by the
 * full sweep that key enumeration performs.
 */

use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::BuildHasherDefault;
use std::time::{SystemTime, UNIX_EPOCH};

// AHash over the default SipHash, as for any hot hash table here.
type AHash = BuildHasherDefault<ahash::AHasher>;

/// One stored value with an optional absolute deadline
///
/// The deadline is in milliseconds since the Unix epoch. None never
/// expires.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub value: String,
    pub expires_at: Option<u64>,
}

impl Entry {
    fn expired_at(&self, now_ms: u64) -> bool {
        matches!(self.expires_at, Some(deadline) if now_ms >= deadline)
    }
}

/// The keyspace: all keys live here, behind one lock
///
/// Every operation acquires the lock for its full duration, so operations
/// are linearizable with respect to each other. No reader/writer
/// distinction is made; all access is exclusive. That discipline already
/// covers a future multi-threaded reactor without redesign.
#[derive(Default)]
pub struct Keyspace {
    inner: Mutex<HashMap<String, Entry, AHash>>,
}

impl Keyspace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a key with no expiry, overwriting any existing entry
    pub fn set(&self, key: String, value: String) {
        let mut map = self.inner.lock();
        map.insert(key, Entry { value, expires_at: None });
    }

    /// Store a key that expires `ttl_ms` milliseconds from now
    ///
    /// No range validation happens here; the textual argument is vetted
    /// by the dispatcher. A non-positive ttl produces a deadline that has
    /// already passed, which later reads treat as absent.
    pub fn set_with_expiry(&self, key: String, value: String, ttl_ms: i64) {
        let deadline = now_ms().saturating_add_signed(ttl_ms);
        self.set_with_deadline(key, value, deadline);
    }

    /// Store a key with an absolute deadline in Unix milliseconds
    ///
    /// The snapshot loader installs decoded expiries through this. A
    /// deadline already in the past is still inserted; lazy expiry
    /// handles it from there.
    pub fn set_with_deadline(&self, key: String, value: String, deadline_ms: u64) {
        let mut map = self.inner.lock();
        map.insert(key, Entry { value, expires_at: Some(deadline_ms) });
    }

    /// Look up a key, reclaiming it if its deadline has passed
    ///
    /// An expired hit is removed from the map as part of this call and
    /// reported as absent.
    pub fn get(&self, key: &str) -> Option<String> {
        let mut map = self.inner.lock();
        match map.get(key) {
            Some(entry) if entry.expired_at(now_ms()) => {
                map.remove(key);
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    /// Enumerate all live keys, sweeping out every expired entry
    ///
    /// The sweep physically removes expired entries as it walks the map,
    /// so the result never contains an expired key and memory is
    /// reclaimed opportunistically.
    pub fn all_keys(&self) -> Vec<String> {
        let now = now_ms();
        let mut map = self.inner.lock();
        map.retain(|_, entry| !entry.expired_at(now));
        map.keys().cloned().collect()
    }
}

/// Milliseconds since the Unix epoch
#[inline]
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
