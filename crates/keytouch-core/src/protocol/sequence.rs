//! Thread-safe generator for touch-sequence ids.
//!
//! # What is a touch-sequence id? (for beginners)
//!
//! The remote device sees a stream of touch packets.  Every virtual finger
//! goes through one lifecycle: a `Down`, any number of `Move`s, then an `Up`.
//! All packets of the same lifecycle carry the same id so the receiver can
//! tell two fingers apart when they are on the glass at the same time.
//!
//! # Why one shared instance?
//!
//! Ids are issued by the main event loop (gesture handlers) *and* by script
//! workers running on their own threads.  A single [`TouchSequence`] is
//! created by the session and handed to every producer as an
//! `Arc<TouchSequence>`, so the order of issuance is total across all of them.
//!
//! The value `0` is reserved to mean "no active touch" and is never returned.

use std::sync::atomic::{AtomicU32, Ordering};

/// A lock-free, monotonically increasing touch-sequence id generator.
///
/// The first call to [`next`](Self::next) returns `1`.  On wraparound the
/// reserved value `0` is skipped.
///
/// # Examples
///
/// ```rust
/// use keytouch_core::protocol::TouchSequence;
///
/// let seq = TouchSequence::new();
/// assert_eq!(seq.next(), 1);
/// assert_eq!(seq.next(), 2);
/// ```
#[derive(Debug)]
pub struct TouchSequence {
    inner: AtomicU32,
}

impl TouchSequence {
    /// Creates a generator whose first id is `1`.
    pub fn new() -> Self {
        Self {
            inner: AtomicU32::new(0),
        }
    }

    /// Returns the next id.
    ///
    /// `Ordering::Relaxed` is enough: the id only has to be unique, it does
    /// not publish any other memory to the thread that receives it.
    pub fn next(&self) -> u32 {
        loop {
            let id = self.inner.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
            if id != 0 {
                return id;
            }
        }
    }

    /// Returns the most recently issued id without advancing.
    pub fn current(&self) -> u32 {
        self.inner.load(Ordering::Relaxed)
    }

    /// Rewinds the generator so the next id is `1`.
    ///
    /// Only meant for test isolation; never call this while touches are live.
    pub fn reset(&self) {
        self.inner.store(0, Ordering::Relaxed);
    }
}

impl Default for TouchSequence {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_touch_sequence_starts_at_one() {
        // Arrange
        let seq = TouchSequence::new();

        // Act
        let first = seq.next();

        // Assert
        assert_eq!(first, 1);
    }

    #[test]
    fn test_touch_sequence_increases_strictly() {
        // Arrange
        let seq = TouchSequence::new();

        // Act
        let values: Vec<u32> = (0..100).map(|_| seq.next()).collect();

        // Assert
        for window in values.windows(2) {
            assert!(window[1] > window[0], "ids must be strictly increasing");
        }
    }

    #[test]
    fn test_touch_sequence_skips_zero_on_wraparound() {
        // Arrange – one step before overflow
        let seq = TouchSequence {
            inner: AtomicU32::new(u32::MAX - 1),
        };

        // Act
        let last = seq.next();
        let wrapped = seq.next();

        // Assert
        assert_eq!(last, u32::MAX);
        assert_eq!(wrapped, 1, "0 is reserved for 'no touch'");
    }

    #[test]
    fn test_touch_sequence_is_unique_across_threads() {
        // Arrange
        let seq = Arc::new(TouchSequence::new());
        let thread_count = 8;
        let ids_per_thread = 1000;

        // Act
        let handles: Vec<_> = (0..thread_count)
            .map(|_| {
                let s = Arc::clone(&seq);
                thread::spawn(move || (0..ids_per_thread).map(|_| s.next()).collect::<Vec<_>>())
            })
            .collect();

        let mut all: Vec<u32> = handles
            .into_iter()
            .flat_map(|h| h.join().expect("thread panicked"))
            .collect();

        // Assert
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), thread_count * ids_per_thread);
    }

    #[test]
    fn test_reset_rewinds_to_one() {
        // Arrange
        let seq = TouchSequence::new();
        seq.next();
        seq.next();

        // Act
        seq.reset();

        // Assert
        assert_eq!(seq.current(), 0);
        assert_eq!(seq.next(), 1);
    }
}
