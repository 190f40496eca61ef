//! Weakly-referenced interning pools
//!
//! A [`Pool`] canonicalizes values: interning equal inputs yields the same
//! `Arc`, so equality degenerates to pointer comparison for as long as the
//! values live. The pool itself holds only [`Weak`] entries and therefore
//! never keeps a value alive; once the last external owner drops, the entry
//! dies and is unlinked lazily by later writer-locked accesses.
//!
//! The table is a fixed-fanout chained hash table rather than a `HashMap`:
//! callers supply pre-computed 32-bit hashes (typically polynomial hashes
//! accumulated while parsing), lookups probe one bucket's chain, and the
//! same hash is reused across the candidate's whole construction path.
//!
//! Construction goes through an [`AccessUnit`]: a short-lived description of
//! the would-be value that can be hashed and compared against pooled values
//! *before* the value is ever allocated. Only when no live match exists does
//! the pool call [`AccessUnit::materialize`] under the writer lock.

mod scratch;

pub use scratch::{Scratch, ScratchGuard, ScratchQueue};

use std::sync::{Arc, Weak};

use parking_lot::{RwLock, RwLockWriteGuard};
use tracing::trace;

/// Initial bucket count. Prime, matching the chain fanout the table is
/// tuned for; growth keeps the count odd via `2n + 1`.
const INITIAL_BUCKETS: usize = 1031;

/// A candidate value that a [`Pool`] can look up and, on a miss, build.
///
/// `matches` must be consistent with `hash`: two units (or a unit and a
/// pooled value) that compare equal must report the same hash. The pool
/// only calls `materialize` after both the optimistic and the
/// double-checked lookup missed, and always under the writer lock.
pub trait AccessUnit<T: ?Sized> {
    type Error;

    /// Hash of the value this unit describes.
    fn hash(&self) -> u32;

    /// Whether `value` equals the value this unit describes.
    fn matches(&self, value: &T) -> bool;

    /// Build the canonical value. Called at most once per intern attempt.
    fn materialize(&mut self) -> Result<Arc<T>, Self::Error>;
}

struct Entry<T: ?Sized> {
    hash: u32,
    value: Weak<T>,
    next: Option<Box<Entry<T>>>,
}

struct Table<T: ?Sized> {
    buckets: Vec<Option<Box<Entry<T>>>>,
    /// Entry count, including entries whose value has died but has not
    /// been unlinked yet. Swept before any growth decision.
    len: usize,
}

impl<T: ?Sized> Table<T> {
    fn with_buckets(n: usize) -> Self {
        let mut buckets = Vec::new();
        buckets.resize_with(n, || None);
        Self { buckets, len: 0 }
    }

    #[inline]
    fn bucket_of(&self, hash: u32) -> usize { hash as usize % self.buckets.len() }

    /// Scan one chain for a live entry with `hash` matching `matches`,
    /// unlinking every dead entry in that chain along the way. The chain
    /// is rebuilt from its owned nodes; relative order is irrelevant.
    fn find_and_prune(&mut self, hash: u32, matches: impl Fn(&T) -> bool) -> Option<Arc<T>> {
        let index = self.bucket_of(hash);
        let mut chain = self.buckets[index].take();
        let mut kept: Option<Box<Entry<T>>> = None;
        let mut found = None;
        while let Some(mut entry) = chain {
            chain = entry.next.take();
            match entry.value.upgrade() {
                None => self.len -= 1,
                Some(value) => {
                    if found.is_none() && entry.hash == hash && matches(&value) {
                        found = Some(value);
                    }
                    entry.next = kept.take();
                    kept = Some(entry);
                }
            }
        }
        self.buckets[index] = kept;
        found
    }

    fn insert(&mut self, hash: u32, value: &Arc<T>) {
        if self.len + 1 > self.buckets.len() / 4 * 3 {
            self.sweep();
            if self.len + 1 > self.buckets.len() / 4 * 3 {
                self.grow();
            }
        }
        let index = self.bucket_of(hash);
        let head = self.buckets[index].take();
        self.buckets[index] =
            Some(Box::new(Entry { hash, value: Arc::downgrade(value), next: head }));
        self.len += 1;
    }

    /// Drop every dead entry in the table.
    fn sweep(&mut self) {
        let mut removed = 0usize;
        for bucket in &mut self.buckets {
            let mut chain = bucket.take();
            let mut kept: Option<Box<Entry<T>>> = None;
            while let Some(mut entry) = chain {
                chain = entry.next.take();
                if entry.value.strong_count() == 0 {
                    removed += 1;
                } else {
                    entry.next = kept.take();
                    kept = Some(entry);
                }
            }
            *bucket = kept;
        }
        self.len -= removed;
        if removed > 0 {
            trace!(removed, remaining = self.len, "pool sweep");
        }
    }

    fn grow(&mut self) {
        let new_len = self.buckets.len() * 2 + 1;
        trace!(from = self.buckets.len(), to = new_len, "pool grow");
        let mut old = std::mem::take(&mut self.buckets);
        self.buckets.resize_with(new_len, || None);
        for bucket in &mut old {
            let mut head = bucket.take();
            while let Some(mut entry) = head {
                head = entry.next.take();
                let index = self.bucket_of(entry.hash);
                entry.next = self.buckets[index].take();
                self.buckets[index] = Some(entry);
            }
        }
    }
}

/// A weakly-referenced interning pool.
///
/// Lookups take the shared lock; interning a missing value takes the writer
/// lock, re-checks the chain (another writer may have won the race), and
/// only then materializes and inserts. At most one canonical instance of a
/// value is therefore reachable at any time.
pub struct Pool<T: ?Sized> {
    table: RwLock<Table<T>>,
}

impl<T: ?Sized> Default for Pool<T> {
    fn default() -> Self { Self::new() }
}

impl<T: ?Sized> Pool<T> {
    #[must_use]
    pub fn new() -> Self { Self { table: RwLock::new(Table::with_buckets(INITIAL_BUCKETS)) } }

    /// Optimistic lookup under the shared lock. Dead entries are skipped,
    /// not unlinked; reads never mutate the table.
    #[must_use]
    pub fn find(&self, hash: u32, matches: impl Fn(&T) -> bool) -> Option<Arc<T>> {
        let table = self.table.read();
        let index = table.bucket_of(hash);
        let mut entry = table.buckets[index].as_deref();
        while let Some(e) = entry {
            if e.hash == hash {
                if let Some(value) = e.value.upgrade() {
                    if matches(&value) {
                        return Some(value);
                    }
                }
            }
            entry = e.next.as_deref();
        }
        None
    }

    /// Intern the value `unit` describes, reusing a pooled instance when
    /// one is live.
    pub fn intern<U: AccessUnit<T>>(&self, unit: &mut U) -> Result<Arc<T>, U::Error> {
        if let Some(existing) = self.find(unit.hash(), |v| unit.matches(v)) {
            return Ok(existing);
        }
        self.lock().intern(unit)
    }

    /// Take the writer lock for a batch of interning steps.
    ///
    /// While the guard is held no other thread can read or write this
    /// pool; nested interning from inside an access unit must target
    /// *other* pools only.
    #[must_use]
    pub fn lock(&self) -> PoolGuard<'_, T> { PoolGuard { table: self.table.write() } }

    /// Number of live values currently pooled. Counts dead-but-unlinked
    /// entries out; mainly useful in tests.
    #[must_use]
    pub fn live_len(&self) -> usize {
        let table = self.table.read();
        let mut n = 0;
        for bucket in &table.buckets {
            let mut entry = bucket.as_deref();
            while let Some(e) = entry {
                if e.value.upgrade().is_some() {
                    n += 1;
                }
                entry = e.next.as_deref();
            }
        }
        n
    }
}

/// Exclusive access to a [`Pool`] for the duration of one intern sequence.
pub struct PoolGuard<'a, T: ?Sized> {
    table: RwLockWriteGuard<'a, Table<T>>,
}

impl<T: ?Sized> PoolGuard<'_, T> {
    /// Double-checked intern against the already-held writer lock.
    pub fn intern<U: AccessUnit<T>>(&mut self, unit: &mut U) -> Result<Arc<T>, U::Error> {
        let hash = unit.hash();
        if let Some(existing) = self.table.find_and_prune(hash, |v| unit.matches(v)) {
            return Ok(existing);
        }
        let value = unit.materialize()?;
        self.table.insert(hash, &value);
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Base-31 polynomial hash, the kind the pools are used with.
    fn hash_str(s: &str) -> u32 {
        s.bytes().fold(0u32, |h, b| h.wrapping_mul(31).wrapping_add(b as u32))
    }

    struct StrUnit<'a>(&'a str);

    impl AccessUnit<str> for StrUnit<'_> {
        type Error = std::convert::Infallible;

        fn hash(&self) -> u32 { hash_str(self.0) }
        fn matches(&self, value: &str) -> bool { value == self.0 }
        fn materialize(&mut self) -> Result<Arc<str>, Self::Error> { Ok(Arc::from(self.0)) }
    }

    fn intern(pool: &Pool<str>, s: &str) -> Arc<str> {
        pool.intern(&mut StrUnit(s)).unwrap()
    }

    #[test]
    fn interning_is_idempotent() {
        let pool = Pool::<str>::new();
        let a = intern(&pool, "hello");
        let b = intern(&pool, "hello");
        let c = intern(&pool, "world");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(pool.live_len(), 2);
    }

    #[test]
    fn find_misses_on_dead_entries() {
        let pool = Pool::<str>::new();
        let a = intern(&pool, "transient");
        assert!(pool.find(hash_str("transient"), |v| v == "transient").is_some());
        drop(a);
        assert!(pool.find(hash_str("transient"), |v| v == "transient").is_none());
        assert_eq!(pool.live_len(), 0);
    }

    #[test]
    fn reintern_after_drop_yields_fresh_instance() {
        let pool = Pool::<str>::new();
        let first = intern(&pool, "once");
        let first_ptr = Arc::as_ptr(&first);
        drop(first);
        let second = intern(&pool, "once");
        // The old entry is dead, so a new allocation is made; the pointer
        // may or may not coincide, but the pool must hold exactly one
        // live entry either way.
        let _ = first_ptr;
        assert_eq!(&*second, "once");
        assert_eq!(pool.live_len(), 1);
    }

    #[test]
    fn grows_past_initial_capacity() {
        let pool = Pool::<str>::new();
        let strings: Vec<Arc<str>> =
            (0..2000).map(|i| intern(&pool, &format!("value-{i}"))).collect();
        assert_eq!(pool.live_len(), 2000);
        for (i, s) in strings.iter().enumerate() {
            let again = intern(&pool, &format!("value-{i}"));
            assert!(Arc::ptr_eq(s, &again));
        }
    }

    #[test]
    fn guard_intern_double_checks() {
        let pool = Pool::<str>::new();
        let a = intern(&pool, "guarded");
        let b = pool.lock().intern(&mut StrUnit("guarded")).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn concurrent_intern_yields_one_instance() {
        use std::thread;

        let pool = std::sync::Arc::new(Pool::<str>::new());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let pool = std::sync::Arc::clone(&pool);
                thread::spawn(move || intern(&pool, "contended"))
            })
            .collect();
        let values: Vec<Arc<str>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for v in &values[1..] {
            assert!(Arc::ptr_eq(&values[0], v));
        }
        assert_eq!(pool.live_len(), 1);
    }
}
