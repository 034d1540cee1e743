// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Component A: the per-queue Lamport-style clock (spec §4.1).
//!
//! Both [`Clock::tick`] and [`Clock::sync`] require the caller to already
//! hold the owning queue's lock; the counter is stored in an `AtomicU64`
//! not because it is meant to be raced against, but so a snapshot of it
//! can be taken for diagnostics without a lock.

use crate::error::{Error, Result};
use crate::timestamp::{Timestamp, MAX_RAW};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Clock {
    value: AtomicU64,
}

impl Clock {
    pub const fn new() -> Self {
        Clock {
            value: AtomicU64::new(0),
        }
    }

    /// A non-authoritative snapshot; only meaningful as a diagnostic, since
    /// a concurrent tick/sync under the lock can change it immediately
    /// after this returns.
    pub fn snapshot(&self) -> Timestamp {
        Timestamp::from_raw(self.value.load(Ordering::Acquire))
    }

    /// Advance the clock by 2 and return the new, even value.
    ///
    /// # Preconditions
    /// Caller holds the owning queue's lock.
    pub fn tick(&self) -> Result<Timestamp> {
        let current = self.value.load(Ordering::Relaxed);
        if current > MAX_RAW.saturating_sub(2) {
            return Err(Error::ClockOverflow);
        }
        let next = current + 2;
        self.value.store(next, Ordering::Release);
        Ok(Timestamp::from_raw(next))
    }

    /// Raise the clock to at least `at_least`, rounded up to an even value,
    /// and return the resulting clock value. Idempotent: syncing to a value
    /// not greater than the current clock is a no-op that just returns the
    /// current clock.
    ///
    /// # Preconditions
    /// Caller holds the owning queue's lock.
    pub fn sync(&self, at_least: Timestamp) -> Result<Timestamp> {
        let rounded = (at_least.raw() + 1) & !1;
        if rounded > MAX_RAW {
            return Err(Error::ClockOverflow);
        }
        let current = self.value.load(Ordering::Relaxed);
        let new_value = current.max(rounded);
        self.value.store(new_value, Ordering::Release);
        Ok(Timestamp::from_raw(new_value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_is_even_and_monotonic() {
        let clock = Clock::new();
        let a = clock.tick().unwrap();
        let b = clock.tick().unwrap();
        assert_eq!(a.raw() % 2, 0);
        assert!(b > a);
        assert_eq!(b.raw() - a.raw(), 2);
    }

    #[test]
    fn sync_is_idempotent_and_rounds_up() {
        let clock = Clock::new();
        clock.tick().unwrap();
        let t = clock.snapshot();
        assert_eq!(clock.sync(t).unwrap(), t);
        // Syncing to an odd (staged) value rounds up to the next even value.
        let odd = Timestamp::from_raw(t.raw() + 1);
        assert_eq!(clock.sync(odd).unwrap().raw(), t.raw() + 2);
        // Syncing backwards is a no-op.
        assert_eq!(clock.sync(Timestamp::from_raw(0)).unwrap(), clock.snapshot());
    }

    #[test]
    fn tick_refuses_to_overflow_past_the_63_bit_budget() {
        let clock = Clock::new();
        clock.value.store(MAX_RAW, Ordering::Relaxed);
        assert!(matches!(clock.tick(), Err(Error::ClockOverflow)));
    }

    #[test]
    fn sync_at_current_clock_returns_current_clock() {
        let clock = Clock::new();
        clock.tick().unwrap();
        let before = clock.snapshot();
        assert_eq!(clock.sync(before).unwrap(), before);
    }
}
