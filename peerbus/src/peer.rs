// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Component D: the peer wrapper (spec §4.3) — lifecycle on top of the
//! queue, pool, quota and handle table collaborators.
//!
//! The queue is published through `queue_ptr`, an `AtomicPtr<Queue>`
//! carrying one logical `Arc<Queue>` strong reference (the same
//! `Arc::into_raw`/`from_raw` idiom [`Node`](crate::node::Node) uses for its
//! own tree linkage), so [`Peer::queue`] never needs the lifecycle lock:
//! that is the "RCU-safe pointer" spec §4.3 asks for, letting a reader reach
//! `Queue::peek_rcu` without contending connect/disconnect/reset.

use crate::config::ConnectConfig;
use crate::error::{Error, Result};
use crate::handles::{HandleTable, Quota};
use crate::pool::{MemPool, Pool};
use crate::queue::Queue;
use crate::timestamp::SenderId;
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};
use std::sync::{Arc, Condvar, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PeerState {
    New,
    Connected,
    ShuttingDown,
    Shutdown,
}

#[derive(Debug)]
struct Lifecycle {
    state: PeerState,
    /// In-flight request-surface operations (send/recv/query/reset); a
    /// `disconnect` waits for this to reach zero before tearing down.
    active: u64,
}

/// An endpoint owning one queue, one pool, and one handle table (spec
/// glossary "Peer").
#[derive(Debug)]
pub struct Peer {
    id: SenderId,
    lifecycle: Mutex<Lifecycle>,
    lifecycle_changed: Condvar,
    queue_ptr: AtomicPtr<Queue>,
    pool: Mutex<Option<Box<dyn Pool>>>,
    quota: Mutex<Option<Quota>>,
    handles: Mutex<HandleTable>,
}

impl Peer {
    pub fn new(id: SenderId) -> Arc<Peer> {
        Arc::new(Peer {
            id,
            lifecycle: Mutex::new(Lifecycle {
                state: PeerState::New,
                active: 0,
            }),
            lifecycle_changed: Condvar::new(),
            queue_ptr: AtomicPtr::new(ptr::null_mut()),
            pool: Mutex::new(None),
            quota: Mutex::new(None),
            handles: Mutex::new(HandleTable::new()),
        })
    }

    pub fn id(&self) -> SenderId {
        self.id
    }

    /// The published queue, or `None` if never connected / already shut
    /// down. Lock-free: this is the read side of the RCU publication.
    pub fn queue(&self) -> Option<Arc<Queue>> {
        let raw = self.queue_ptr.load(Ordering::Acquire);
        if raw.is_null() {
            return None;
        }
        // SAFETY: `raw` was published by `connect` via `Arc::into_raw` and
        // is only ever nulled out, never deallocated, while a reader might
        // observe it; incrementing the strong count here mirrors the same
        // "read without disturbing the tree's ownership" idiom as
        // `Queue::peek`.
        Some(unsafe {
            Arc::increment_strong_count(raw);
            Arc::from_raw(raw)
        })
    }

    /// `new` → `connected`. Fails if another thread raced a prior connect
    /// or a shutdown.
    pub fn connect(&self, cfg: ConnectConfig) -> Result<()> {
        cfg.validate_client()
            .map_err(|reason| Error::InvalidArgument { reason })?;
        let mut lifecycle = self.lifecycle.lock().unwrap();
        match lifecycle.state {
            PeerState::Connected => return Err(Error::AlreadyConnected),
            PeerState::ShuttingDown | PeerState::Shutdown => return Err(Error::Shutdown),
            PeerState::New => {}
        }

        let queue = Arc::new(Queue::new());
        let pool: Box<dyn Pool> = Box::new(MemPool::new(cfg.pool_size));
        *self.pool.lock().unwrap() = Some(pool);
        *self.quota.lock().unwrap() = Some(Quota::new(cfg.fd_max));
        self.handles.lock().unwrap().clear();

        let raw = Arc::into_raw(queue).cast_mut();
        self.queue_ptr.store(raw, Ordering::Release);
        lifecycle.state = PeerState::Connected;
        Ok(())
    }

    /// Drains the queue and pool and zeros handle tables without disturbing
    /// connection identity; does not tick the clock backwards (it never
    /// touches the clock at all).
    pub fn reset(&self) -> Result<()> {
        let _guard = self.enter()?;
        let queue = self.queue().ok_or(Error::NotConnected)?;
        let mut drained = Vec::new();
        queue.flush(&mut drained);
        if let Some(pool) = self.pool.lock().unwrap().as_mut() {
            // Deallocate each committed node's slice individually, per spec
            // §4.3's "deallocates committed slices", before the pool-wide
            // flush below resets the allocator entirely.
            for node in &drained {
                pool.deallocate(node.meta().pool_offset);
            }
            pool.flush();
        }
        self.handles.lock().unwrap().clear();
        if let Some(quota) = self.quota.lock().unwrap().as_mut() {
            quota.reset();
        }
        Ok(())
    }

    /// The pool size supplied at `connect`.
    pub fn query(&self) -> Result<u64> {
        let _guard = self.enter()?;
        self.pool
            .lock()
            .unwrap()
            .as_ref()
            .map(Pool::capacity)
            .ok_or(Error::NotConnected)
    }

    /// Number of staged-or-committed nodes currently linked into this
    /// peer's queue (spec §11 supplement, delegating to `Queue::len`).
    pub fn pending_len(&self) -> Result<u64> {
        let _guard = self.enter()?;
        Ok(self.queue().ok_or(Error::NotConnected)?.len())
    }

    /// Atomically deactivates the peer, drains every in-flight operation,
    /// then tears down queue, pool, and handle tables. Idempotent: a
    /// concurrent second caller blocks until the first finishes, then
    /// observes [`Error::Shutdown`].
    pub fn disconnect(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().unwrap();
        loop {
            match lifecycle.state {
                PeerState::New => return Err(Error::NotConnected),
                PeerState::Shutdown => return Err(Error::Shutdown),
                PeerState::ShuttingDown => {
                    lifecycle = self.lifecycle_changed.wait(lifecycle).unwrap();
                }
                PeerState::Connected => break,
            }
        }
        lifecycle.state = PeerState::ShuttingDown;
        while lifecycle.active > 0 {
            lifecycle = self.lifecycle_changed.wait(lifecycle).unwrap();
        }

        let raw = self.queue_ptr.swap(ptr::null_mut(), Ordering::AcqRel);
        if !raw.is_null() {
            // SAFETY: reconstructs the strong reference published by
            // `connect`'s `Arc::into_raw`; `queue_ptr` is the sole owner of
            // that reference and we just took exclusive ownership of it via
            // the swap above.
            let queue = unsafe { Arc::from_raw(raw) };
            queue.wake_all();
            // Committed nodes drained here are simply dropped: the pool
            // they were allocated from is torn down in full immediately
            // below, so there is no per-slice deallocation to perform.
            let mut drained = Vec::new();
            queue.flush(&mut drained);
        }
        *self.pool.lock().unwrap() = None;
        *self.quota.lock().unwrap() = None;
        self.handles.lock().unwrap().clear();

        lifecycle.state = PeerState::Shutdown;
        self.lifecycle_changed.notify_all();
        Ok(())
    }

    pub(crate) fn handles(&self) -> &Mutex<HandleTable> {
        &self.handles
    }

    pub(crate) fn pool(&self) -> &Mutex<Option<Box<dyn Pool>>> {
        &self.pool
    }

    pub(crate) fn quota(&self) -> &Mutex<Option<Quota>> {
        &self.quota
    }

    /// Registers one in-flight request-surface operation; `disconnect`
    /// waits for every such guard to drop before tearing the peer down.
    pub(crate) fn enter(&self) -> Result<ActiveGuard<'_>> {
        let mut lifecycle = self.lifecycle.lock().unwrap();
        match lifecycle.state {
            PeerState::New => Err(Error::NotConnected),
            PeerState::ShuttingDown | PeerState::Shutdown => Err(Error::Shutdown),
            PeerState::Connected => {
                lifecycle.active += 1;
                Ok(ActiveGuard { peer: self })
            }
        }
    }
}

pub(crate) struct ActiveGuard<'a> {
    peer: &'a Peer,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        let mut lifecycle = self.peer.lifecycle.lock().unwrap();
        lifecycle.active -= 1;
        if lifecycle.active == 0 {
            self.peer.lifecycle_changed.notify_all();
        }
    }
}
