// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Component F: the pool collaborator (spec §6 "To the pool").
//!
//! The queue core never touches pool memory directly; a [`Peer`](crate::peer::Peer)
//! holds one `Box<dyn Pool>` and serialises every call through its own lock.
//! [`MemPool`] is a plain in-process mock sized for tests and the demo shell,
//! not a real shared-memory region.

use crate::error::{Error, Result};

/// A peer's backing store for message payloads.
///
/// Every method takes `&mut self`; callers (the peer) are responsible for
/// serialising access, matching spec §6's "pool operations are serialised
/// by the peer's lock".
pub trait Pool: std::fmt::Debug + Send {
    /// Copy `data` into the pool and return `(offset, size)`.
    fn publish(&mut self, data: &[u8]) -> Result<(u64, u32)>;

    /// Return the slice at `offset` back to the pool for reuse.
    fn release(&mut self, offset: u64);

    /// Overwrite part of an already-published slice (used for trailing
    /// handle/FD payload appended after the caller's vectors).
    fn write_kvec(&mut self, offset: u64, iov: &[u8]) -> Result<()>;

    /// Deallocate a slice without returning it for reuse (peer reset/shutdown).
    fn deallocate(&mut self, offset: u64);

    /// Drop every outstanding allocation, resetting to empty.
    fn flush(&mut self);

    /// Total capacity, as supplied at `connect` time.
    fn capacity(&self) -> u64;
}

/// A simple bump-allocating, in-process mock pool.
///
/// Allocates by bumping `cursor` and never reclaims space on `release`
/// except when every outstanding allocation has been released (matching
/// the "fresh slices starting at offset 0" behaviour spec §8 scenario S6
/// requires after `reset`). This is adequate for tests and the demo CLI;
/// a production pool would back this with real shared memory and a real
/// allocator.
#[derive(Debug)]
pub struct MemPool {
    capacity: u64,
    cursor: u64,
    live: u64,
    storage: Vec<u8>,
}

impl MemPool {
    pub fn new(capacity: u64) -> Self {
        MemPool {
            capacity,
            cursor: 0,
            live: 0,
            storage: vec![0u8; capacity as usize],
        }
    }
}

impl Pool for MemPool {
    fn publish(&mut self, data: &[u8]) -> Result<(u64, u32)> {
        let size = u32::try_from(data.len()).map_err(|_| Error::InvalidArgument {
            reason: "message too large to fit a u32 size",
        })?;
        let offset = self.cursor;
        let end = offset
            .checked_add(u64::from(size))
            .filter(|&end| end <= self.capacity)
            .ok_or(Error::OutOfMemory)?;
        self.storage[offset as usize..end as usize].copy_from_slice(data);
        self.cursor = end;
        self.live += 1;
        Ok((offset, size))
    }

    fn release(&mut self, _offset: u64) {
        self.live = self.live.saturating_sub(1);
        if self.live == 0 {
            self.cursor = 0;
        }
    }

    fn write_kvec(&mut self, offset: u64, iov: &[u8]) -> Result<()> {
        let end = (offset as usize)
            .checked_add(iov.len())
            .filter(|&end| end <= self.storage.len())
            .ok_or(Error::OutOfMemory)?;
        self.storage[offset as usize..end].copy_from_slice(iov);
        Ok(())
    }

    fn deallocate(&mut self, offset: u64) {
        self.release(offset);
    }

    fn flush(&mut self) {
        self.cursor = 0;
        self.live = 0;
    }

    fn capacity(&self) -> u64 {
        self.capacity
    }
}
