use std::fmt;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Hybrid logical timestamp carried by every event-stream entry.
///
/// Ordering is `physical_ms` then `logical`. Two sources can produce equal
/// timestamps; callers that need a total order break ties on the source.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp {
    /// Wall-clock milliseconds since the UNIX epoch.
    pub physical_ms: u64,
    /// Counter for entries within the same physical millisecond.
    pub logical: u32,
}

impl Timestamp {
    pub fn new(physical_ms: u64, logical: u32) -> Self {
        Self {
            physical_ms,
            logical,
        }
    }

    /// The zero timestamp, before every real entry.
    pub const fn zero() -> Self {
        Self {
            physical_ms: 0,
            logical: 0,
        }
    }

    pub(crate) fn to_le_bytes(self) -> [u8; 12] {
        let mut out = [0u8; 12];
        out[..8].copy_from_slice(&self.physical_ms.to_le_bytes());
        out[8..].copy_from_slice(&self.logical.to_le_bytes());
        out
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({}ms.{})", self.physical_ms, self.logical)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.physical_ms, self.logical)
    }
}

/// Hybrid Logical Clock stamping local entries.
///
/// - **Local entry**: `physical = max(wall_clock, last.physical)`; the
///   logical counter resets when physical advances and increments otherwise.
/// - **Witness**: when a remote entry is observed, the clock moves past its
///   timestamp so the next local entry sorts after everything already seen.
pub struct HybridLogicalClock {
    last: Mutex<Timestamp>,
}

impl HybridLogicalClock {
    pub fn new() -> Self {
        Self {
            last: Mutex::new(Timestamp::zero()),
        }
    }

    /// Start the clock after `last`, e.g. the head of a recovered log.
    pub fn starting_after(last: Timestamp) -> Self {
        Self {
            last: Mutex::new(last),
        }
    }

    /// Produce a timestamp strictly greater than every earlier one.
    pub fn now(&self) -> Timestamp {
        let wall = Self::wall_clock_ms();
        let mut last = self.last.lock().expect("HLC mutex poisoned");

        let next = if wall > last.physical_ms {
            Timestamp::new(wall, 0)
        } else {
            Timestamp::new(last.physical_ms, last.logical + 1)
        };

        *last = next;
        next
    }

    /// Advance past a timestamp observed on a remote entry.
    pub fn witness(&self, received: &Timestamp) {
        let mut last = self.last.lock().expect("HLC mutex poisoned");
        if *received > *last {
            *last = *received;
        }
    }

    /// The most recent timestamp issued or witnessed.
    pub fn last(&self) -> Timestamp {
        *self.last.lock().expect("HLC mutex poisoned")
    }

    fn wall_clock_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

impl Default for HybridLogicalClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_physical_then_logical() {
        assert!(Timestamp::new(100, 9) < Timestamp::new(200, 0));
        assert!(Timestamp::new(100, 1) < Timestamp::new(100, 2));
        assert!(Timestamp::zero() < Timestamp::new(0, 1));
    }

    #[test]
    fn now_is_strictly_monotonic() {
        let clock = HybridLogicalClock::new();
        let mut prev = clock.now();
        for _ in 0..1000 {
            let next = clock.now();
            assert!(next > prev);
            prev = next;
        }
    }

    #[test]
    fn witness_moves_past_remote_time() {
        let clock = HybridLogicalClock::new();
        let far_future = Timestamp::new(u64::MAX / 2, 7);
        clock.witness(&far_future);
        let next = clock.now();
        assert_eq!(next, Timestamp::new(u64::MAX / 2, 8));
    }

    #[test]
    fn witness_never_moves_backwards() {
        let clock = HybridLogicalClock::starting_after(Timestamp::new(500, 3));
        clock.witness(&Timestamp::new(100, 0));
        assert_eq!(clock.last(), Timestamp::new(500, 3));
    }

    #[test]
    fn display_format() {
        assert_eq!(format!("{}", Timestamp::new(1000, 5)), "1000.5");
    }
}
