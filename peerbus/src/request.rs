// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Component I: the caller-facing request surface (spec §6), opaque to the
//! queue core — dispatch functions over [`Peer`]/[`Transaction`] that an
//! end-to-end test (or the demo shell) drives directly.

use crate::config::{ConnectConfig, FD_MAX, VEC_MAX};
use crate::error::{Error, Result};
use crate::fd::{self, Received};
use crate::handles::RawHandle;
use crate::node::MessageMeta;
use crate::peer::Peer;
use crate::timestamp::SenderId;
use crate::transaction::{Delivery, Transaction};
use bitflags::bitflags;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

bitflags! {
    /// `connect` is a single choice of exactly one of these (spec §6).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ConnectFlags: u32 {
        const CLIENT = 1 << 0;
        const RESET  = 1 << 1;
        const QUERY  = 1 << 2;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SendFlags: u32 {
        const CONTINUE = 1 << 0;
        const SILENT   = 1 << 1;
        const RELEASE  = 1 << 2;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RecvFlags: u32 {
        const PEEK = 1 << 0;
    }
}

#[derive(Debug)]
pub enum ConnectOutcome {
    Connected,
    Reset,
    PoolSize(u64),
}

/// `connect(flags, pool_size)`.
pub fn request_connect(peer: &Peer, flags: ConnectFlags, pool_size: u64) -> Result<ConnectOutcome> {
    let chosen = [ConnectFlags::CLIENT, ConnectFlags::RESET, ConnectFlags::QUERY]
        .into_iter()
        .filter(|f| flags.contains(*f))
        .count();
    if chosen != 1 {
        return Err(Error::InvalidArgument {
            reason: "connect flags must choose exactly one of client/reset/query",
        });
    }
    if flags.contains(ConnectFlags::CLIENT) {
        if pool_size == 0 {
            return Err(Error::InvalidArgument {
                reason: "pool_size must be nonzero for a client connect",
            });
        }
        peer.connect(ConnectConfig {
            pool_size,
            fd_max: FD_MAX,
        })?;
        Ok(ConnectOutcome::Connected)
    } else if flags.contains(ConnectFlags::RESET) {
        if pool_size != 0 {
            return Err(Error::InvalidArgument {
                reason: "pool_size must be zero for a reset connect",
            });
        }
        peer.reset()?;
        Ok(ConnectOutcome::Reset)
    } else {
        if pool_size != 0 {
            return Err(Error::InvalidArgument {
                reason: "pool_size must be zero for a query connect",
            });
        }
        Ok(ConnectOutcome::PoolSize(peer.query()?))
    }
}

/// `recv(flags)`: returns `(offset, size, n_handles, n_fds)` or
/// *would-block*.
#[derive(Debug)]
pub struct RecvResult {
    pub offset: u64,
    pub size: u32,
    pub n_handles: u32,
    pub n_fds: u32,
    pub fd_indices: Vec<u32>,
    /// Whether another part of the same multicast delivery (same
    /// `(timestamp, sender)`, spec §5) immediately follows this one.
    pub continuation: bool,
}

/// `recv(flags)`.
pub fn request_recv(peer: &Peer, flags: RecvFlags) -> Result<RecvResult> {
    let _guard = peer.enter()?;
    let queue = peer.queue().ok_or(Error::NotConnected)?;

    if flags.contains(RecvFlags::PEEK) {
        let (meta, continuation) = fd::peek_meta(&queue)?;
        return Ok(RecvResult {
            offset: meta.pool_offset,
            size: meta.pool_size,
            n_handles: meta.n_handles,
            n_fds: meta.n_fds,
            fd_indices: Vec::new(),
            continuation,
        });
    }

    // Mocks the syscall of duplicating `n` descriptors into the receiver's
    // process ahead of knowing the exact message (spec §6 "pre-allocates an
    // FD array ... via a lock-free peek").
    let allocate = |n: u32| -> Result<Vec<RawHandle>> {
        Ok((0..n).map(|i| RawHandle(1000 + i as i32)).collect())
    };
    let release = |_fds: Vec<RawHandle>| {};

    let Received {
        node,
        fd_indices,
        continuation,
    } = fd::dequeue_with_fds(&queue, peer.handles(), allocate, release)?;
    let meta = node.meta();
    Ok(RecvResult {
        offset: meta.pool_offset,
        size: meta.pool_size,
        n_handles: meta.n_handles,
        n_fds: meta.n_fds,
        fd_indices,
        continuation,
    })
}

/// `slice_release(offset)`.
pub fn request_slice_release(peer: &Peer, offset: u64) -> Result<()> {
    let _guard = peer.enter()?;
    peer.pool()
        .lock()
        .unwrap()
        .as_mut()
        .ok_or(Error::NotConnected)?
        .release(offset);
    Ok(())
}

/// `send(flags, destinations[], vecs[], handles[], fds[])`.
///
/// Validates `flags`, the `VEC_MAX`/`FD_MAX` limits, publishes the payload
/// into each destination's own pool, and drives a [`Transaction`] across
/// however many destinations were named (a single destination with no
/// [`SendFlags::CONTINUE`] takes the unicast fast path).
///
/// - [`SendFlags::CONTINUE`]: rather than flattening `vecs` into one
///   message, publishes every vec as its own message to every destination,
///   all staged and committed under one shared transaction timestamp. Two
///   consecutive parts delivered to the same destination then share the
///   same `(timestamp, sender)` key, which is exactly what a receiver's
///   `peek`/`recv` continuation flag (spec §5) detects. The returned
///   `Vec<Delivery>` has one entry per `(destination, part)` pair, in
///   destination-major order (every part for a destination is contiguous).
///   Requires at least two vecs — a continuation with nothing to continue
///   into is rejected as an invalid argument.
/// - [`SendFlags::SILENT`]: a send with no destinations is a valid no-op
///   (`Ok(Vec::new())`) instead of an invalid-argument error; a sender that
///   does not need per-destination confirmation is also not required to
///   name anyone to confirm it to.
/// - [`SendFlags::RELEASE`]: the sender's FD quota reservation for this
///   send's `fds` is released immediately after dispatch rather than left
///   held. Incompatible with `CONTINUE`: a continuation's parts are not
///   fully dispatched until every part commits, so releasing the quota at
///   the same instant as dispatch would undercount FDs still in flight for
///   the parts not yet committed.
#[allow(clippy::too_many_arguments)]
pub fn request_send(
    sender: &Peer,
    flags: SendFlags,
    destinations: &[Arc<Peer>],
    vecs: &[&[u8]],
    n_handles: u32,
    fds: &[RawHandle],
) -> Result<Vec<Delivery>> {
    let _guard = sender.enter()?;
    if flags.contains(SendFlags::CONTINUE) && flags.contains(SendFlags::RELEASE) {
        return Err(Error::InvalidArgument {
            reason: "send cannot combine continue and release",
        });
    }
    if vecs.len() > VEC_MAX {
        return Err(Error::InvalidArgument {
            reason: "too many vectors",
        });
    }
    if flags.contains(SendFlags::CONTINUE) && vecs.len() < 2 {
        return Err(Error::InvalidArgument {
            reason: "continue requires at least two message parts",
        });
    }
    let fd_count = u32::try_from(fds.len()).map_err(|_| Error::InvalidArgument {
        reason: "too many file descriptors",
    })?;
    if fd_count > FD_MAX {
        return Err(Error::InvalidArgument {
            reason: "too many file descriptors",
        });
    }
    if destinations.is_empty() {
        if flags.contains(SendFlags::SILENT) {
            return Ok(Vec::new());
        }
        return Err(Error::InvalidArgument {
            reason: "send requires at least one destination",
        });
    }

    if fd_count > 0 {
        sender
            .quota()
            .lock()
            .unwrap()
            .as_mut()
            .ok_or(Error::NotConnected)?
            .try_reserve(fd_count)?;
    }

    let payloads: Vec<Vec<u8>> = if flags.contains(SendFlags::CONTINUE) {
        vecs.iter().map(|v| v.to_vec()).collect()
    } else {
        vec![vecs.iter().flat_map(|v| v.iter().copied()).collect()]
    };

    let mut per_destination = Vec::with_capacity(destinations.len() * payloads.len());
    for dest in destinations {
        for payload in &payloads {
            let mut pool_guard = dest.pool().lock().unwrap();
            let pool = pool_guard.as_mut().ok_or(Error::NotConnected)?;
            let (offset, size) = pool.publish(payload)?;
            drop(pool_guard);
            per_destination.push((
                dest.clone(),
                MessageMeta {
                    pool_offset: offset,
                    pool_size: size,
                    n_handles,
                    n_fds: fd_count,
                },
            ));
        }
    }

    let txn = Transaction::new(sender.id());
    let result = if per_destination.len() == 1 {
        let (dest, meta) = &per_destination[0];
        match txn.send_unicast(dest, *meta) {
            Ok(()) => Ok(vec![Delivery::Committed]),
            Err(e) => Ok(vec![Delivery::Failed(e)]),
        }
    } else {
        txn.send_multicast(&per_destination)
    };

    if flags.contains(SendFlags::RELEASE) && fd_count > 0 {
        if let Some(quota) = sender.quota().lock().unwrap().as_mut() {
            quota.release(fd_count);
        }
    }

    if flags.contains(SendFlags::SILENT) {
        result.map(|_| Vec::new())
    } else {
        result
    }
}

/// A minimal peer registry tying `SenderId`s to [`Peer`]s, used by tests and
/// the demo shell to dispatch requests by name.
#[derive(Debug, Default)]
pub struct Bus {
    peers: RwLock<HashMap<SenderId, Arc<Peer>>>,
    next_id: AtomicU64,
}

impl Bus {
    pub fn new() -> Self {
        Bus::default()
    }

    /// Registers a fresh peer in the `new` state and returns its id.
    pub fn create_peer(&self) -> SenderId {
        let id = SenderId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.peers.write().unwrap().insert(id, Peer::new(id));
        id
    }

    pub fn peer(&self, id: SenderId) -> Option<Arc<Peer>> {
        self.peers.read().unwrap().get(&id).cloned()
    }
}
