//! Request id allocation for the reference transport.
//!
//! Replies are matched to requests by id, so ids must be unique for the
//! lifetime of a connection.  The counter starts at 1 so that a zero id on the
//! wire is always a peer bug.

use std::sync::atomic::{AtomicU64, Ordering};

/// A thread-safe, monotonically increasing request id source.
///
/// # Examples
///
/// ```rust
/// use castctl_core::protocol::SequenceCounter;
///
/// let ids = SequenceCounter::new();
/// assert_eq!(ids.next(), 1);
/// assert_eq!(ids.next(), 2);
/// ```
#[derive(Debug)]
pub struct SequenceCounter {
    inner: AtomicU64,
}

impl SequenceCounter {
    pub fn new() -> Self {
        Self {
            inner: AtomicU64::new(1),
        }
    }

    /// Returns the next id.  Wraps from `u64::MAX` back to 1, skipping 0.
    pub fn next(&self) -> u64 {
        loop {
            let id = self.inner.fetch_add(1, Ordering::Relaxed);
            if id != 0 {
                return id;
            }
        }
    }

    /// The id the next call to [`next`](Self::next) will return, for logging.
    pub fn peek(&self) -> u64 {
        self.inner.load(Ordering::Relaxed).max(1)
    }
}

impl Default for SequenceCounter {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_first_id_is_one() {
        assert_eq!(SequenceCounter::new().next(), 1);
    }

    #[test]
    fn test_peek_does_not_advance() {
        let ids = SequenceCounter::new();
        assert_eq!(ids.peek(), 1);
        assert_eq!(ids.peek(), 1);
        assert_eq!(ids.next(), 1);
        assert_eq!(ids.peek(), 2);
    }

    #[test]
    fn test_wraparound_skips_zero() {
        // Arrange
        let ids = SequenceCounter {
            inner: AtomicU64::new(u64::MAX),
        };

        // Act / Assert
        assert_eq!(ids.next(), u64::MAX);
        assert_eq!(ids.next(), 1);
    }

    #[test]
    fn test_concurrent_ids_are_unique() {
        // Arrange
        let ids = Arc::new(SequenceCounter::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let ids = Arc::clone(&ids);
                std::thread::spawn(move || (0..250).map(|_| ids.next()).collect::<Vec<_>>())
            })
            .collect();

        // Act
        let mut all: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();

        // Assert
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 1000);
    }
}
