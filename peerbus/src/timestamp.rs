// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The timestamp and sender identity data model (spec §3).
//!
//! A [`Timestamp`] packs a 62-bit tick counter and the stage flag into a
//! single `u64` whose least significant bit is the flag: clear means
//! committed, set means staged. The counter occupies bits 1..=62, leaving
//! bit 63 permanently zero so the whole value stays inside a 63-bit budget
//! (see [`Clock`](crate::clock::Clock) for why).

use core::fmt;

/// The top of the usable range: one past this and the counter would need
/// bit 63, which this encoding never sets.
pub(crate) const MAX_RAW: u64 = (1u64 << 63) - 2;

/// A 63-bit Lamport-style timestamp with an embedded stage flag.
///
/// `0` is the distinguished "unstamped" value used by unlinked nodes.
/// Ordering on `Timestamp` is plain numeric ordering on the packed value,
/// which already places a staged entry at raw value `V` strictly between
/// committed entries at `V - 1` and `V + 1`, since committed values are
/// always even and staged values are the odd successor of the even value
/// they were synced to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const UNSTAMPED: Timestamp = Timestamp(0);

    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        Timestamp(raw)
    }

    #[inline]
    pub const fn raw(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn is_unstamped(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_staged(self) -> bool {
        self.0 & 1 != 0
    }

    #[inline]
    pub const fn is_committed(self) -> bool {
        !self.is_unstamped() && !self.is_staged()
    }

    /// The even value this staged timestamp was synced to, i.e. `self - 1`.
    ///
    /// # Panics
    /// Panics if `self` is not staged (debug builds only).
    #[inline]
    pub const fn synced_value(self) -> Timestamp {
        debug_assert!(self.is_staged());
        Timestamp(self.0 - 1)
    }

    /// The odd stage-bit-set successor of an even committed/synced value.
    #[inline]
    pub const fn staged_successor(self) -> Timestamp {
        debug_assert!(self.0 & 1 == 0);
        Timestamp(self.0 | 1)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_staged() {
            write!(f, "{}(staged)", self.0)
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Opaque identity of a message's producing peer, used purely for
/// tie-breaking within the ordering (spec §3 "Sender identity").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SenderId(pub u64);

/// The queue's sort key: `(timestamp, sender)` ascending, per spec §3
/// "Ordering", plus a queue-local insertion ordinal that exists purely to
/// break ties between distinct nodes that legitimately share a
/// `(timestamp, sender)` pair — e.g. two parts of the same multicast
/// transaction delivered to the same destination (see
/// [`Queue::peek`](crate::queue::Queue::peek)'s `continuation` flag). The
/// ordinal never affects which node *compares* first among non-tied keys
/// and is ignored by [`SortKey::same_transaction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SortKey {
    pub timestamp: Timestamp,
    pub sender: SenderId,
    pub(crate) tiebreak: u64,
}

impl SortKey {
    pub fn new(timestamp: Timestamp, sender: SenderId, tiebreak: u64) -> Self {
        SortKey {
            timestamp,
            sender,
            tiebreak,
        }
    }

    /// True iff `self` and `other` belong to the same transaction's delivery
    /// to the same peer, i.e. they share `(timestamp, sender)` and differ
    /// only in insertion ordinal.
    pub fn same_transaction(&self, other: &SortKey) -> bool {
        self.timestamp == other.timestamp && self.sender == other.sender
    }
}
