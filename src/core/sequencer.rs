//! Correlation identifier sequencing

use std::sync::atomic::{AtomicU64, Ordering};

/// Issues strictly increasing correlation identifiers for one socket
///
/// The counter starts at zero and the first identifier handed out is 1.
/// Exhausting the `u64` range wraps around to zero; this is not guarded.
#[derive(Debug, Default)]
pub struct CorrelationSequencer {
    counter: AtomicU64,
}

impl CorrelationSequencer {
    /// Create a sequencer starting at zero
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    fn starting_at(value: u64) -> Self {
        Self {
            counter: AtomicU64::new(value),
        }
    }

    /// Next identifier
    pub fn next(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::AcqRel).wrapping_add(1)
    }

    /// Last identifier handed out (0 if none yet)
    #[must_use]
    pub fn current(&self) -> u64 {
        self.counter.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_sequential_ids_increase() {
        let seq = CorrelationSequencer::new();
        assert_eq!(seq.current(), 0);
        assert_eq!(seq.next(), 1);
        assert_eq!(seq.next(), 2);
        assert_eq!(seq.next(), 3);
        assert_eq!(seq.current(), 3);
    }

    #[test]
    fn test_concurrent_ids_unique() {
        let seq = Arc::new(CorrelationSequencer::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let seq = Arc::clone(&seq);
                std::thread::spawn(move || (0..1000).map(|_| seq.next()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            let ids = handle.join().unwrap();
            // Each thread observes its own ids in increasing order
            assert!(ids.windows(2).all(|w| w[0] < w[1]));
            for id in ids {
                assert!(seen.insert(id), "duplicate id {}", id);
            }
        }
        assert_eq!(seen.len(), 8000);
        assert_eq!(seq.current(), 8000);
    }

    #[test]
    fn test_wraparound() {
        let seq = CorrelationSequencer::starting_at(u64::MAX - 1);
        assert_eq!(seq.next(), u64::MAX);
        assert_eq!(seq.next(), 0);
        assert_eq!(seq.next(), 1);
    }
}
