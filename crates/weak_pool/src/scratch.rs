//! Reusable scratch objects for parse-heavy intern paths.
//!
//! Parsing a value before interning it needs working buffers. Allocating
//! them per call would dominate the fast path, so scratch objects are kept
//! on a free list and checked out for the duration of one operation. The
//! guard returned by [`ScratchQueue::checkout`] resets the scratch and
//! returns it to the list on drop, on every exit path including unwinding.

use core::{
    mem::ManuallyDrop,
    ops::{Deref, DerefMut},
};

use parking_lot::Mutex;

/// A reusable scratch object.
///
/// `reset` must drop every reference the scratch accumulated during use
/// (interned values, borrowed data copied in) while keeping buffer
/// capacity, so a recycled scratch never prolongs the life of pooled
/// values.
pub trait Scratch: Default {
    fn reset(&mut self);
}

/// A grow-only free list of scratch objects.
///
/// Checkout pops a recycled scratch or allocates a fresh one; there is no
/// upper bound on the list, its size converges to the peak number of
/// concurrent checkouts.
pub struct ScratchQueue<S> {
    free: Mutex<Vec<S>>,
}

impl<S: Scratch> Default for ScratchQueue<S> {
    fn default() -> Self { Self::new() }
}

impl<S: Scratch> ScratchQueue<S> {
    #[must_use]
    pub const fn new() -> Self { Self { free: Mutex::new(Vec::new()) } }

    /// Check out a scratch object for one operation.
    #[must_use]
    pub fn checkout(&self) -> ScratchGuard<'_, S> {
        let scratch = self.free.lock().pop().unwrap_or_default();
        ScratchGuard { queue: self, scratch: ManuallyDrop::new(scratch) }
    }
}

/// Exclusive ownership of one scratch object until drop.
pub struct ScratchGuard<'a, S: Scratch> {
    queue: &'a ScratchQueue<S>,
    scratch: ManuallyDrop<S>,
}

impl<S: Scratch> Deref for ScratchGuard<'_, S> {
    type Target = S;

    #[inline]
    fn deref(&self) -> &S { &self.scratch }
}

impl<S: Scratch> DerefMut for ScratchGuard<'_, S> {
    #[inline]
    fn deref_mut(&mut self) -> &mut S { &mut self.scratch }
}

impl<S: Scratch> Drop for ScratchGuard<'_, S> {
    fn drop(&mut self) {
        // SAFETY: `scratch` is taken exactly once, here, and never touched
        // again before the guard's storage goes away.
        let mut scratch = unsafe { ManuallyDrop::take(&mut self.scratch) };
        scratch.reset();
        self.queue.free.lock().push(scratch);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Buf {
        bytes: Vec<u8>,
    }

    impl Scratch for Buf {
        fn reset(&mut self) { self.bytes.clear(); }
    }

    #[test]
    fn checkout_recycles_and_resets() {
        let queue = ScratchQueue::<Buf>::new();
        {
            let mut guard = queue.checkout();
            guard.bytes.extend_from_slice(b"abcdef");
            assert_eq!(guard.bytes.len(), 6);
        }
        // Recycled scratch comes back empty but with its capacity intact.
        let guard = queue.checkout();
        assert!(guard.bytes.is_empty());
        assert!(guard.bytes.capacity() >= 6);
    }

    #[test]
    fn concurrent_checkouts_get_distinct_objects() {
        let queue = ScratchQueue::<Buf>::new();
        let mut a = queue.checkout();
        let mut b = queue.checkout();
        a.bytes.push(1);
        b.bytes.push(2);
        assert_eq!(a.bytes, [1]);
        assert_eq!(b.bytes, [2]);
    }

    #[test]
    fn reset_runs_on_unwind() {
        let queue = ScratchQueue::<Buf>::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let mut guard = queue.checkout();
            guard.bytes.push(9);
            panic!("boom");
        }));
        assert!(result.is_err());
        let guard = queue.checkout();
        assert!(guard.bytes.is_empty());
    }
}
