//! Time-ordered unique token ids
//!
//! Layout of a 64-bit id, most significant bits first:
//!
//! ```text
//! | 1 bit unused | 41 bits millis since EPOCH | 10 bits worker | 12 bits sequence |
//! ```
//!
//! The generator is lock-free: a CAS loop on the last issued id guarantees
//! strictly increasing ids even when the clock stalls or runs backwards.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;

/// 2024-01-01T00:00:00Z in unix milliseconds
pub const EPOCH_MILLIS: i64 = 1_704_067_200_000;

const WORKER_BITS: u32 = 10;
const SEQUENCE_BITS: u32 = 12;
const TIMESTAMP_SHIFT: u32 = WORKER_BITS + SEQUENCE_BITS;
const MAX_WORKER: u16 = (1 << WORKER_BITS) - 1;
const TIMESTAMP_MASK: u64 = (1 << 41) - 1;

/// Snowflake id generator
#[derive(Debug)]
pub struct Snowflake {
    worker: u64,
    last: AtomicU64,
}

impl Default for Snowflake {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Snowflake {
    /// Create a generator; `worker` is truncated to 10 bits
    pub fn new(worker: u16) -> Self {
        Self {
            worker: u64::from(worker & MAX_WORKER),
            last: AtomicU64::new(0),
        }
    }

    /// Next id based on the current wall clock
    pub fn generate(&self) -> u64 {
        self.generate_at(Utc::now().timestamp_millis())
    }

    pub(crate) fn generate_at(&self, now_millis: i64) -> u64 {
        let elapsed = u64::try_from(now_millis.saturating_sub(EPOCH_MILLIS)).unwrap_or(0);
        let base = ((elapsed & TIMESTAMP_MASK) << TIMESTAMP_SHIFT) | (self.worker << SEQUENCE_BITS);

        let mut last = self.last.load(Ordering::Acquire);
        loop {
            let next = if base > last { base } else { last + 1 };
            match self
                .last
                .compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return next,
                Err(actual) => last = actual,
            }
        }
    }

    /// Milliseconds since the unix epoch encoded in `id`
    pub fn timestamp_of(id: u64) -> i64 {
        // 41 bits always fit in i64
        ((id >> TIMESTAMP_SHIFT) & TIMESTAMP_MASK) as i64 + EPOCH_MILLIS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    // Test 1: Ids embed the generation time
    #[test]
    fn test_timestamp_round_trip() {
        let generator = Snowflake::new(3);
        let now = EPOCH_MILLIS + 123_456;

        let id = generator.generate_at(now);
        assert_eq!(Snowflake::timestamp_of(id), now);
    }

    // Test 2: Ids strictly increase within the same millisecond
    #[test]
    fn test_monotonic_same_millisecond() {
        let generator = Snowflake::default();
        let now = EPOCH_MILLIS + 1_000;

        let a = generator.generate_at(now);
        let b = generator.generate_at(now);
        let c = generator.generate_at(now);
        assert!(a < b && b < c);
    }

    // Test 3: A clock going backwards never repeats an id
    #[test]
    fn test_monotonic_clock_regression() {
        let generator = Snowflake::default();

        let a = generator.generate_at(EPOCH_MILLIS + 5_000);
        let b = generator.generate_at(EPOCH_MILLIS + 1_000);
        assert!(b > a);
    }

    // Test 4: Worker bits are encoded
    #[test]
    fn test_worker_bits() {
        let generator = Snowflake::new(5);
        let id = generator.generate_at(EPOCH_MILLIS + 10);
        assert_eq!((id >> SEQUENCE_BITS) & u64::from(MAX_WORKER), 5);
    }

    // Test 5: Concurrent generation yields unique ids
    #[test]
    fn test_concurrent_unique() {
        let generator = Arc::new(Snowflake::default());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let generator = Arc::clone(&generator);
                std::thread::spawn(move || (0..1_000).map(|_| generator.generate()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id), "duplicate id {id}");
            }
        }
        assert_eq!(seen.len(), 8_000);
    }
}
