//! Thread-Safe Storage Engine with Expiry Support
//!
//! This module implements the key-value store behind `SET` and `GET`.
//!
//! ## Design Decisions
//!
//! 1. **Sharded Locks**: Keys are spread over 64 shards, each behind its own `RwLock`.
//! 2. **Absolute Expiry**: A TTL is turned into a wall-clock instant (ms since epoch)
//!    when the key is written and never re-derived afterwards.
//! 3. **Lazy Expiry**: A read treats a key as absent strictly after its expiry
//!    instant and removes it; the background sweeper reclaims keys nobody reads.
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StorageEngine                           │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐           │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │ Shard N │           │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ RwLock  │           │
//! │  │ HashMap │ │ HashMap │ │ HashMap │ │ HashMap │           │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every operation on a key goes through that key's shard lock, so writes to
//! one key are totally ordered and a reader never sees a partial value.

use crate::storage::clock::{Clock, SystemClock};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Number of shards for the storage engine.
const NUM_SHARDS: usize = 64;

/// A stored value with optional expiry time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// The actual value stored
    pub value: String,
    /// Absolute expiry in ms since the Unix epoch (None = never expires)
    pub expires_at: Option<i64>,
}

impl Entry {
    /// Creates a new entry without expiry.
    pub fn new(value: String) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    /// Creates a new entry that expires at `expires_at`.
    pub fn with_expiry(value: String, expires_at: i64) -> Self {
        Self {
            value,
            expires_at: Some(expires_at),
        }
    }

    /// Checks if this entry has expired at `now`.
    ///
    /// An entry is still live at exactly its expiry instant.
    #[inline]
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|exp| now > exp)
    }
}

/// A single shard containing a portion of the key-value pairs.
#[derive(Debug, Default)]
struct Shard {
    data: RwLock<HashMap<String, Entry>>,
}

impl Shard {
    // A panic while holding the lock leaves the map itself intact (every
    // mutation is a single insert/remove), so a poisoned lock is still usable.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Entry>> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Entry>> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The key-value store shared by every client connection.
///
/// Wrap it in an `Arc` and hand a clone to each connection task; all
/// operations take `&self`.
///
/// # Example
///
/// ```
/// use pxkv::storage::StorageEngine;
///
/// let engine = StorageEngine::new();
///
/// engine.set("color".to_string(), "teal".to_string(), None);
/// assert_eq!(engine.get("color"), Some("teal".to_string()));
///
/// // Expires 60 seconds from now
/// engine.set("session".to_string(), "abc123".to_string(), Some(60_000));
/// assert!(engine.get("session").is_some());
/// ```
pub struct StorageEngine {
    shards: Vec<Shard>,

    clock: Arc<dyn Clock>,

    /// Statistics: total GET operations
    get_count: AtomicU64,

    /// Statistics: total SET operations
    set_count: AtomicU64,

    /// Statistics: number of expired keys removed
    expired_count: AtomicU64,
}

impl std::fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEngine")
            .field("shards", &self.shards.len())
            .field("get_count", &self.get_count.load(Ordering::Relaxed))
            .field("set_count", &self.set_count.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for StorageEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageEngine {
    /// Creates a storage engine driven by the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates a storage engine that reads time from `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        let shards = (0..NUM_SHARDS).map(|_| Shard::default()).collect();

        Self {
            shards,
            clock,
            get_count: AtomicU64::new(0),
            set_count: AtomicU64::new(0),
            expired_count: AtomicU64::new(0),
        }
    }

    /// Determines which shard a key belongs to.
    #[inline]
    fn shard_index(&self, key: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % NUM_SHARDS
    }

    #[inline]
    fn get_shard(&self, key: &str) -> &Shard {
        &self.shards[self.shard_index(key)]
    }

    /// Stores `value` under `key`, replacing any previous value and expiry.
    ///
    /// With `ttl_ms`, the key expires at `now + ttl_ms` milliseconds since the
    /// epoch; a non-positive TTL yields a key that is already expired.
    pub fn set(&self, key: String, value: String, ttl_ms: Option<i64>) {
        self.set_count.fetch_add(1, Ordering::Relaxed);

        let entry = match ttl_ms {
            Some(ttl) => Entry::with_expiry(value, self.clock.now_millis().saturating_add(ttl)),
            None => Entry::new(value),
        };

        self.get_shard(&key).write().insert(key, entry);
    }

    /// Gets the value for a key.
    ///
    /// Returns `None` if the key doesn't exist or has expired. An expired key
    /// is removed on the way out.
    pub fn get(&self, key: &str) -> Option<String> {
        self.get_count.fetch_add(1, Ordering::Relaxed);

        let shard = self.get_shard(key);

        // Fast path under the read lock
        {
            let data = shard.read();
            match data.get(key) {
                Some(entry) if !entry.is_expired_at(self.clock.now_millis()) => {
                    return Some(entry.value.clone());
                }
                Some(_) => {}
                None => return None,
            }
        }

        // Expired: take the write lock and check again, a SET may have raced us
        let mut data = shard.write();
        let now = self.clock.now_millis();
        match data.get(key) {
            Some(entry) if !entry.is_expired_at(now) => return Some(entry.value.clone()),
            Some(_) => {}
            None => return None,
        }

        data.remove(key);
        self.expired_count.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Removes every expired key from all shards.
    ///
    /// # Returns
    ///
    /// Returns the number of keys that were removed.
    pub fn cleanup_expired(&self) -> u64 {
        let mut cleaned = 0u64;

        for shard in &self.shards {
            let now = self.clock.now_millis();
            let mut data = shard.write();
            let before = data.len();

            data.retain(|_, entry| !entry.is_expired_at(now));

            cleaned += (before - data.len()) as u64;
        }

        if cleaned > 0 {
            self.expired_count.fetch_add(cleaned, Ordering::Relaxed);
        }

        cleaned
    }

    /// Returns the number of resident keys, including expired keys that
    /// have not been removed yet.
    pub fn len(&self) -> u64 {
        self.shards.iter().map(|s| s.read().len() as u64).sum()
    }

    /// Returns true if no keys are resident.
    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|s| s.read().is_empty())
    }

    /// Returns database statistics.
    pub fn stats(&self) -> StorageStats {
        StorageStats {
            keys: self.len(),
            get_ops: self.get_count.load(Ordering::Relaxed),
            set_ops: self.set_count.load(Ordering::Relaxed),
            expired: self.expired_count.load(Ordering::Relaxed),
        }
    }
}

/// Database statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageStats {
    /// Number of keys currently resident
    pub keys: u64,
    /// Total GET operations
    pub get_ops: u64,
    /// Total SET operations
    pub set_ops: u64,
    /// Total expired keys removed
    pub expired: u64,
}
