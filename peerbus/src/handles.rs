// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Component G: the receiver's FD/handle table and the per-peer quota
//! (spec §6 "To file-descriptor transfer").

use crate::error::{Error, Result};

/// A receiver's installed file descriptor table.
///
/// Indices are stable for the lifetime of the peer (until `reset`); a real
/// implementation would back this with `dup`-ed OS file descriptors, but
/// the queue core only ever needs install/release/count, which is all this
/// mock tracks.
#[derive(Debug, Default)]
pub struct HandleTable {
    slots: Vec<Option<RawHandle>>,
}

/// An opaque, already-duplicated descriptor, ready for installation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawHandle(pub i32);

impl HandleTable {
    pub fn new() -> Self {
        HandleTable::default()
    }

    /// Install `fds`, returning their table indices. Rolls back everything
    /// it installed if any individual install fails, since a partially
    /// installed batch would violate "never re-queued" semantics at a
    /// position the caller cannot recover from (spec §6).
    pub fn install(&mut self, fds: &[RawHandle]) -> Result<Vec<u32>> {
        let mut installed = Vec::with_capacity(fds.len());
        for &fd in fds {
            let idx = self.slots.len();
            let idx = u32::try_from(idx).map_err(|_| Error::OutOfMemory)?;
            self.slots.push(Some(fd));
            installed.push(idx);
        }
        Ok(installed)
    }

    pub fn release(&mut self, idx: u32) {
        if let Some(slot) = self.slots.get_mut(idx as usize) {
            *slot = None;
        }
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every installed handle (peer reset/shutdown).
    pub fn clear(&mut self) {
        self.slots.clear();
    }
}

/// A per-peer resource quota covering in-flight FDs (spec §6 `FD_MAX` and
/// the per-send limit checks in the request surface).
#[derive(Debug)]
pub struct Quota {
    fd_max: u32,
    fds_in_flight: u32,
}

impl Quota {
    pub fn new(fd_max: u32) -> Self {
        Quota {
            fd_max,
            fds_in_flight: 0,
        }
    }

    pub fn try_reserve(&mut self, n: u32) -> Result<()> {
        let total = self
            .fds_in_flight
            .checked_add(n)
            .ok_or(Error::InvalidArgument {
                reason: "fd count overflow",
            })?;
        if total > self.fd_max {
            return Err(Error::InvalidArgument {
                reason: "fd quota exceeded",
            });
        }
        self.fds_in_flight = total;
        Ok(())
    }

    pub fn release(&mut self, n: u32) {
        self.fds_in_flight = self.fds_in_flight.saturating_sub(n);
    }

    pub fn reset(&mut self) {
        self.fds_in_flight = 0;
    }
}
