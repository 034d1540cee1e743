// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Component B: the queue entry (spec §3 "Queue node").
//!
//! A [`Node`] participates in exactly one queue's intrusive WAVL tree
//! (`[wavltree]`) at a time, identified by `Arc<Node>` handles. The
//! "queue-ref and transaction-ref" cyclic ownership spec §9 describes is
//! realized directly as `Arc`'s strong count: staging a node clones the
//! `Arc` so both the queue (via the tree, holding one clone converted to a
//! raw pointer) and the transaction driver hold a strong reference; the
//! node is only ever deallocated once both have dropped theirs.

use crate::timestamp::{SenderId, SortKey, Timestamp};
use std::cell::UnsafeCell;
use std::ptr::NonNull;
use std::sync::Arc;

/// Message metadata a [`Node`] carries once staged: everything a receiver
/// needs to size the pool slice and FD array before dequeuing (spec §6).
/// Set once by the transaction before staging and never mutated again, so
/// unlike the timestamp/key it needs no interior mutability: both the
/// queue and the transaction only ever read it concurrently.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageMeta {
    pub pool_offset: u64,
    pub pool_size: u32,
    pub n_handles: u32,
    pub n_fds: u32,
}

/// A queue entry.
///
/// The `key` field is the only mutable queue-owned state, written once at
/// `stage`/`commit_unstaged` time and again at `commit_staged` ("re-stamp")
/// time. Every write and every read through [`Node::key`]/[`Node::set_key`]
/// happens while the owning [`Queue`](crate::queue::Queue)'s lock is held,
/// which is what makes sharing it behind a plain `Arc` (rather than a
/// `Mutex<Node>`) sound.
pub struct Node {
    links: wavltree::Links<Node>,
    key: UnsafeCell<SortKey>,
    sender: SenderId,
    meta: MessageMeta,
}

// SAFETY: `key` is only ever written or read while the owning queue's lock
// is held (see `Queue::stage`, `Queue::commit_staged`, `Node::get_key`);
// `links` is wavltree's own intrusive link storage, subject to the same
// discipline by construction (all tree operations require `&mut WAVLTree`,
// which the queue only reaches through its lock). `sender` and `meta` are
// written once at construction and never mutated again.
unsafe impl Sync for Node {}

// SAFETY: `links`'s raw `NonNull` parent/child pointers make `Node` opt out
// of the auto-trait, but nothing about moving a `Node` to another thread is
// unsound: every read or write of `links` happens through `&mut WAVLTree`,
// reachable only while the owning queue's lock is held, regardless of which
// thread calls in.
unsafe impl Send for Node {}

impl Node {
    pub fn new(sender: SenderId, meta: MessageMeta) -> Arc<Node> {
        Arc::new(Node {
            links: wavltree::Links::new(),
            key: UnsafeCell::new(SortKey::default()),
            sender,
            meta,
        })
    }

    pub fn sender(&self) -> SenderId {
        self.sender
    }

    pub fn meta(&self) -> MessageMeta {
        self.meta
    }

    pub fn timestamp(&self) -> Timestamp {
        self.key().timestamp
    }

    pub fn is_staged(&self) -> bool {
        self.timestamp().is_staged()
    }

    pub fn is_linked(&self) -> bool {
        !self.timestamp().is_unstamped()
    }

    /// Current sort key.
    ///
    /// # Preconditions
    /// Caller holds the owning queue's lock.
    pub(crate) fn key(&self) -> SortKey {
        // SAFETY: see the `unsafe impl Sync` justification above.
        unsafe { *self.key.get() }
    }

    /// Overwrite the sort key (used when staging, re-stamping on commit, and
    /// clearing back to unstamped on unlink).
    ///
    /// # Preconditions
    /// Caller holds the owning queue's lock, and the node is not currently
    /// linked into the tree (callers must remove before re-keying and
    /// re-insert after, per spec §4.2's front-recomputation table).
    pub(crate) fn set_key(&self, key: SortKey) {
        // SAFETY: see the `unsafe impl Sync` justification above.
        unsafe {
            *self.key.get() = key;
        }
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("key", &self.key())
            .field("sender", &self.sender)
            .field("meta", &self.meta)
            .finish()
    }
}

// SAFETY: `into_ptr`/`from_ptr` round-trip through `Arc::into_raw`/
// `Arc::from_raw`, which is exactly the scheme `Arc` is designed to
// support for handing a strong reference to intrusive/FFI-style
// collections without going through `Clone`+`drop`. `links` returns a
// pointer to the `links` field computed via `offset_of!`, never
// constructing an intermediate `&mut` reference to `Self` (see the
// `Linked::links` documentation on the byte-offset approach).
unsafe impl wavltree::Linked for Node {
    type Handle = Arc<Node>;
    type Key = SortKey;

    fn into_ptr(handle: Self::Handle) -> NonNull<Self> {
        unsafe { NonNull::new_unchecked(Arc::into_raw(handle).cast_mut()) }
    }

    unsafe fn from_ptr(ptr: NonNull<Self>) -> Self::Handle {
        unsafe { Arc::from_raw(ptr.as_ptr()) }
    }

    unsafe fn links(ptr: NonNull<Self>) -> NonNull<wavltree::Links<Self>> {
        ptr.map_addr(|addr| {
            let offset = core::mem::offset_of!(Self, links);
            addr.checked_add(offset).unwrap()
        })
        .cast()
    }

    fn get_key(&self) -> &Self::Key {
        // SAFETY: see the `unsafe impl Sync` justification above; wavltree
        // only calls `get_key` while the queue's `WAVLTree` is under
        // `&mut`, i.e. while the queue's lock is held.
        unsafe { &*self.key.get() }
    }
}
