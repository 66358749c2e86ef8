//! Microsecond-precision wall-clock arithmetic. A `WallClock` is always
//! normalised: `0 <= usec < 1_000_000`.

use std::time::Instant;

/// A `(seconds, microseconds)` pair, always normalised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WallClock {
    sec: u64,
    usec: u32,
}

impl WallClock {
    pub const ZERO: WallClock = WallClock { sec: 0, usec: 0 };

    /// Build a `WallClock` from already-normalised components. Panics in
    /// debug builds if `usec >= 1_000_000` — callers construct values only
    /// through this or the arithmetic below, both of which normalise.
    pub fn new(sec: u64, usec: u32) -> Self {
        debug_assert!(usec < 1_000_000, "unnormalised usec: {usec}");
        WallClock { sec, usec }
    }

    pub fn from_ms(ms: u64) -> Self {
        WallClock {
            sec: ms / 1000,
            usec: ((ms % 1000) * 1000) as u32,
        }
    }

    pub fn sec(&self) -> u64 {
        self.sec
    }

    pub fn usec(&self) -> u32 {
        self.usec
    }

    pub fn as_micros(&self) -> u128 {
        self.sec as u128 * 1_000_000 + self.usec as u128
    }

    pub fn to_duration(&self) -> std::time::Duration {
        std::time::Duration::new(self.sec, self.usec * 1000)
    }

    /// `self + other`, carry-normalised.
    pub fn add(&self, other: &WallClock) -> WallClock {
        let usec_sum = self.usec + other.usec;
        if usec_sum >= 1_000_000 {
            WallClock {
                sec: self.sec + other.sec + 1,
                usec: usec_sum - 1_000_000,
            }
        } else {
            WallClock {
                sec: self.sec + other.sec,
                usec: usec_sum,
            }
        }
    }

    /// `self - other`. Returns `None` if `self < other` (the original's
    /// underflow signal: callers treat it as "deadline already passed").
    pub fn sub(&self, other: &WallClock) -> Option<WallClock> {
        if *self < *other {
            return None;
        }
        if self.usec < other.usec {
            Some(WallClock {
                sec: self.sec - other.sec - 1,
                usec: (1_000_000 + self.usec) - other.usec,
            })
        } else {
            Some(WallClock {
                sec: self.sec - other.sec,
                usec: self.usec - other.usec,
            })
        }
    }
}

/// A source of `WallClock` readings. Abstracted so the engine and run loop
/// can be driven by a deterministic clock in tests instead of real time.
pub trait Clock {
    fn now(&self) -> WallClock;
}

/// Real clock, backed by a monotonic `Instant` captured at construction.
/// Using `Instant` rather than `SystemTime` keeps deadline arithmetic
/// immune to wall-clock adjustments (NTP steps, DST) during a transfer.
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        SystemClock {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> WallClock {
        let elapsed = self.start.elapsed();
        WallClock {
            sec: elapsed.as_secs(),
            usec: elapsed.subsec_micros(),
        }
    }
}

/// Manually-advanced clock for deterministic engine tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: std::cell::Cell<WallClock>,
}

impl ManualClock {
    pub fn new(start: WallClock) -> Self {
        ManualClock {
            now: std::cell::Cell::new(start),
        }
    }

    pub fn advance(&self, by: WallClock) {
        self.now.set(self.now.get().add(&by));
    }

    pub fn set(&self, to: WallClock) {
        self.now.set(to);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> WallClock {
        self.now.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_ms_normalises() {
        let t = WallClock::from_ms(1500);
        assert_eq!(t.sec(), 1);
        assert_eq!(t.usec(), 500_000);
    }

    #[test]
    fn add_carries() {
        let a = WallClock::new(1, 700_000);
        let b = WallClock::new(2, 500_000);
        let sum = a.add(&b);
        assert_eq!(sum, WallClock::new(4, 200_000));
    }

    #[test]
    fn sub_borrows() {
        let a = WallClock::new(4, 200_000);
        let b = WallClock::new(2, 500_000);
        let diff = a.sub(&b).unwrap();
        assert_eq!(diff, WallClock::new(1, 700_000));
    }

    #[test]
    fn sub_underflow_signals_none() {
        let a = WallClock::new(1, 0);
        let b = WallClock::new(2, 0);
        assert_eq!(a.sub(&b), None);

        let a = WallClock::new(2, 100);
        let b = WallClock::new(2, 200);
        assert_eq!(a.sub(&b), None);
    }

    #[test]
    fn cmp_is_total_order() {
        assert!(WallClock::new(1, 0) < WallClock::new(1, 1));
        assert!(WallClock::new(1, 999_999) < WallClock::new(2, 0));
        assert_eq!(WallClock::new(3, 4), WallClock::new(3, 4));
    }

    #[test]
    fn sub_add_roundtrip() {
        let a = WallClock::new(10, 250_000);
        let b = WallClock::new(3, 900_000);
        let diff = a.sub(&b).unwrap();
        assert_eq!(diff.add(&b), a);
    }

    #[test]
    fn underflow_iff_cmp_less() {
        let pairs = [
            (WallClock::new(5, 0), WallClock::new(3, 0)),
            (WallClock::new(3, 0), WallClock::new(5, 0)),
            (WallClock::new(3, 0), WallClock::new(3, 0)),
        ];
        for (a, b) in pairs {
            assert_eq!(a.sub(&b).is_none(), a < b);
        }
    }

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(WallClock::ZERO);
        clock.advance(WallClock::from_ms(20));
        assert_eq!(clock.now(), WallClock::from_ms(20));
    }
}
