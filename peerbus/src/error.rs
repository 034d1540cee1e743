// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Error kinds and their disposition, per the error handling design: each
//! variant here corresponds to one row of that table.

/// Errors produced by the queue, peer, and transaction driver.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// `recv`/`peek` observed an empty or only-staged queue. Not logged; this
    /// is the expected steady-state result of polling.
    #[error("would block")]
    WouldBlock,

    /// An operation was attempted on a peer still in the `new` state.
    #[error("peer is not connected")]
    NotConnected,

    /// `connect` raced with a prior successful `connect` on the same peer.
    #[error("peer is already connected")]
    AlreadyConnected,

    /// An operation was attempted on a peer that has disconnected, or a
    /// commit raced a disconnect and silently became a no-op.
    #[error("peer is shut down")]
    Shutdown,

    /// A bad flag combination, a misaligned pool size, or an oversized
    /// vector/FD count.
    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: &'static str },

    /// Allocation failed while pre-allocating or writing file descriptors.
    /// The message this was for is dropped, never re-queued.
    #[error("out of memory")]
    OutOfMemory,

    /// A user-space pointer copy failed. Partial state is preserved only
    /// when it was already committed.
    #[error("fault copying to/from user space")]
    Fault,

    /// A structural invariant was violated. The operation that observed it
    /// is aborted and the data structure is left consistent; this is never
    /// silently swallowed.
    #[error("internal invariant violated: {assertion}")]
    Internal { assertion: &'static str },

    /// The queue's clock reached the top of its usable 63-bit range and a
    /// further tick would collide with the stage-bit encoding.
    #[error("clock overflow")]
    ClockOverflow,
}

pub type Result<T> = core::result::Result<T, Error>;

/// Raises `Error::Internal` after logging at error level, matching the
/// disposition table's "logged; operation aborted; structure left
/// consistent" policy for `WARN`-level assertions.
macro_rules! invariant {
    ($cond:expr, $msg:literal) => {
        if !$cond {
            tracing::error!(assertion = $msg, "internal invariant violated");
            return Err($crate::error::Error::Internal { assertion: $msg });
        }
    };
}

pub(crate) use invariant;
