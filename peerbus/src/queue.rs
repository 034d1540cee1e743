// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Component C: the per-peer ordered queue (spec §4.2) — the staging/commit
//! protocol layered on top of the [`Clock`] and the intrusive tree.
//!
//! `front` is published as an [`AtomicPtr`] alongside the lock, not inside
//! it: every mutating operation recomputes and stores it before releasing
//! the lock, and [`Queue::is_readable`]/[`Queue::peek_rcu`]'s null check
//! reads it without ever taking the lock. Dereferencing it is a different
//! matter — every path that needs the node behind it re-validates under the
//! lock via `tree.front()` rather than trusting the raw pointer, which costs
//! the "pure" wait-freedom the spec sketches but keeps the whole thing
//! sound without a reclamation scheme (see `DESIGN.md`).

use crate::clock::Clock;
use crate::error::Result;
use crate::node::{MessageMeta, Node};
use crate::timestamp::{SenderId, SortKey, Timestamp};
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use wavltree::WAVLTree;

/// Outcome of [`Queue::dequeue_if_fd_count`].
#[derive(Debug)]
pub enum DequeueOutcome {
    /// No committed message is currently readable.
    Empty,
    /// The front message exists but its FD count didn't match; carries the
    /// real metadata so the caller can re-allocate and retry.
    Mismatch(MessageMeta),
    Dequeued(Arc<Node>),
}

/// A single peer's ordered, staged/committed message queue.
pub struct Queue {
    clock: Clock,
    tree: Mutex<WAVLTree<Node>>,
    /// Mirrors `tree.front()` whenever that front is committed, else null.
    /// Never dereferenced without re-validating under `tree`'s lock.
    front: AtomicPtr<Node>,
    len: AtomicU64,
    next_ordinal: AtomicU64,
    /// Signaled whenever `front` transitions from null to non-null.
    readable: Condvar,
}

impl std::fmt::Debug for Queue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queue")
            .field("len", &self.len())
            .field("readable", &self.is_readable())
            .finish_non_exhaustive()
    }
}

impl Default for Queue {
    fn default() -> Self {
        Self::new()
    }
}

impl Queue {
    pub fn new() -> Self {
        Queue {
            clock: Clock::new(),
            tree: Mutex::new(WAVLTree::new()),
            front: AtomicPtr::new(ptr::null_mut()),
            len: AtomicU64::new(0),
            next_ordinal: AtomicU64::new(0),
            readable: Condvar::new(),
        }
    }

    /// Lock-free readability check: `true` iff `peek`/`dequeue` would
    /// currently return `Some`. May race a concurrent mutation; spurious
    /// `false` followed immediately by `true` is expected and harmless.
    pub fn is_readable(&self) -> bool {
        !self.front.load(Ordering::Acquire).is_null()
    }

    /// Number of linked entries, staged or committed (spec §11 supplement).
    pub fn len(&self) -> u64 {
        self.len.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A cheap, possibly-stale size hint for the front message, used by FD
    /// pre-allocation (spec §6, scenario S5) before the real, lock-held
    /// `peek`. The null case is genuinely lock-free; the non-null case
    /// falls back to a short-lived lock rather than trusting a raw read
    /// through `front` (see module docs).
    ///
    /// The trailing `bool` is the same continuation hint `peek` reports:
    /// whether the next entry continues the same multicast delivery.
    pub fn peek_rcu(&self) -> Option<(Timestamp, SenderId, MessageMeta, bool)> {
        if self.front.load(Ordering::Acquire).is_null() {
            return None;
        }
        let (node, continuation) = self.peek()?;
        Some((node.timestamp(), node.sender(), node.meta(), continuation))
    }

    /// Stage `node` for eventual commit, syncing the clock to at least
    /// `min_ts` first. The caller retains its own strong reference; this
    /// consumes one strong reference into the tree.
    ///
    /// # Preconditions
    /// `node` is not currently linked into any queue.
    pub fn stage(&self, node: Arc<Node>, min_ts: Timestamp) -> Result<Timestamp> {
        debug_assert!(!node.is_linked(), "staging an already-linked node");
        let mut tree = self.tree.lock().unwrap();
        let synced = self.clock.sync(min_ts)?;
        let stage_ts = synced.staged_successor();
        let key = SortKey::new(stage_ts, node.sender(), self.next_ordinal());
        node.set_key(key);

        // A freshly staged key is always >= every existing committed key:
        // `sync` never lowers the clock, so `synced` is already >= the
        // timestamp of everything already in the tree. A staged insert
        // therefore never becomes, or precedes, the front.
        debug_assert!(
            tree.front().get().map_or(true, |front| key > front.key()),
            "staged insert ordered before an existing entry"
        );

        tree.insert(node);
        self.len.fetch_add(1, Ordering::Relaxed);
        // Staging never changes which node is the committed front.
        drop(tree);
        tracing::trace!(sender = key.sender.0, timestamp = %stage_ts, "stage");
        Ok(stage_ts)
    }

    /// Re-stamp a previously staged node with its final commit timestamp
    /// `ts` (already synced across every destination by the transaction
    /// driver) and make it visible to readers.
    ///
    /// Returns `false` if `node` was concurrently removed (flush/shutdown)
    /// before the commit could land; the driver treats that as a silent
    /// no-op, matching spec §5's "late" case.
    pub fn commit_staged(&self, node: &Arc<Node>, ts: Timestamp) -> Result<bool> {
        debug_assert!(ts.is_committed());
        let mut tree = self.tree.lock().unwrap();
        if !node.is_linked() {
            return Ok(false);
        }
        // Ordering guarantee 1 ("sync-before-commit"): the driver must have
        // already raised this queue's clock to >= ts via `Queue::sync`.
        crate::error::invariant!(
            self.clock.snapshot().raw() >= ts.raw(),
            "commit_staged observed clock below the commit timestamp"
        );
        let old_key = node.key();
        let Some(handle) = tree.remove(&old_key) else {
            return Ok(false);
        };
        let new_key = SortKey::new(ts, handle.sender(), old_key.tiebreak);
        handle.set_key(new_key);
        let sender = handle.sender();
        tree.insert(handle);
        self.publish_front(&tree);
        tracing::trace!(sender = sender.0, timestamp = %ts, "commit_staged");
        Ok(true)
    }

    /// Raise this queue's clock to at least `at_least` (rounded up to an
    /// even value) without touching the tree. Used by the transaction
    /// driver between computing the final commit timestamp and calling
    /// [`Queue::commit_staged`] on each destination (spec §4.4 step 3).
    pub fn sync(&self, at_least: Timestamp) -> Result<Timestamp> {
        let _tree = self.tree.lock().unwrap();
        self.clock.sync(at_least)
    }

    /// Commit a unicast message directly, without a staging round-trip:
    /// ticks the clock and inserts already-committed.
    pub fn commit_unstaged(&self, node: Arc<Node>) -> Result<Timestamp> {
        debug_assert!(!node.is_linked(), "committing an already-linked node");
        let mut tree = self.tree.lock().unwrap();
        let ts = self.clock.tick()?;
        let key = SortKey::new(ts, node.sender(), self.next_ordinal());
        node.set_key(key);
        tree.insert(node);
        self.len.fetch_add(1, Ordering::Relaxed);
        self.publish_front(&tree);
        tracing::trace!(sender = key.sender.0, timestamp = %ts, "commit_unstaged");
        Ok(ts)
    }

    /// Erase `node` from the queue, dropping the queue's strong reference.
    /// Used to unwind a partially staged transaction and by peer reset.
    /// Returns `false` if `node` was already unlinked.
    pub fn remove(&self, node: &Arc<Node>) -> bool {
        let mut tree = self.tree.lock().unwrap();
        if !node.is_linked() {
            return false;
        }
        let key = node.key();
        let Some(handle) = tree.remove(&key) else {
            return false;
        };
        handle.set_key(SortKey::default());
        self.len.fetch_sub(1, Ordering::Relaxed);
        self.publish_front(&tree);
        tracing::trace!(sender = key.sender.0, timestamp = %key.timestamp, "remove");
        drop(handle);
        true
    }

    /// Return the front message (cloned, +1 ref) without dequeuing it, and
    /// whether the *next* entry continues the same multicast delivery
    /// (same `(timestamp, sender)`, spec §5 "continuation").
    ///
    /// `None` if the queue is empty or the minimum entry is still staged.
    pub fn peek(&self) -> Option<(Arc<Node>, bool)> {
        let tree = self.tree.lock().unwrap();
        let cursor = tree.front();
        let front = cursor.get()?;
        if !front.timestamp().is_committed() {
            return None;
        }
        let front_key = front.key();
        // SAFETY: `front` is the node the cursor above just validated as
        // linked and committed; incrementing its strong count here mirrors
        // the tree's own ownership without disturbing it.
        let node = unsafe {
            let raw = front as *const Node;
            Arc::increment_strong_count(raw);
            Arc::from_raw(raw)
        };
        let continuation = cursor
            .peek_next()
            .is_some_and(|next| next.key().same_transaction(&front_key));
        Some((node, continuation))
    }

    /// Remove and return the front message, or `None` if empty/staged-only.
    pub fn dequeue(&self) -> Option<Arc<Node>> {
        let mut tree = self.tree.lock().unwrap();
        let key = {
            let front = tree.front().get().filter(|n| n.timestamp().is_committed())?;
            front.key()
        };
        let node = tree.remove(&key)?;
        node.set_key(SortKey::default());
        self.len.fetch_sub(1, Ordering::Relaxed);
        self.publish_front(&tree);
        tracing::trace!(sender = key.sender.0, timestamp = %key.timestamp, "dequeue");
        Some(node)
    }

    /// Dequeue the front message only if it has exactly `expected_fds` file
    /// descriptors, atomically in one lock acquisition. Used by the FD
    /// transfer re-peek/retry loop (spec §6, scenario S5) to avoid ever
    /// dequeuing a message whose FD array doesn't match what the caller
    /// pre-allocated.
    pub fn dequeue_if_fd_count(&self, expected_fds: u32) -> DequeueOutcome {
        let mut tree = self.tree.lock().unwrap();
        let Some(front) = tree.front().get().filter(|n| n.timestamp().is_committed()) else {
            return DequeueOutcome::Empty;
        };
        let meta = front.meta();
        if meta.n_fds != expected_fds {
            return DequeueOutcome::Mismatch(meta);
        }
        let key = front.key();
        let node = tree
            .remove(&key)
            .expect("front's key must still identify the front node under the lock");
        node.set_key(SortKey::default());
        self.len.fetch_sub(1, Ordering::Relaxed);
        self.publish_front(&tree);
        tracing::trace!(sender = key.sender.0, timestamp = %key.timestamp, "dequeue_if_fd_count");
        DequeueOutcome::Dequeued(node)
    }

    /// Drain every entry, staged or committed (spec §4.2 `flush(out_list)`).
    ///
    /// A staged node just has its linkage cleared and the queue's reference
    /// dropped: the transaction still holds its own reference, so a later
    /// `commit_staged` observes "not linked" and returns `false` rather than
    /// delivering to a destroyed peer. A committed node's reference is
    /// instead transferred into `out`, appended in ascending key order, for
    /// the caller to dispose of (property 5, spec §8: "every committed node
    /// appears exactly once in `out_list`").
    pub fn flush(&self, out: &mut Vec<Arc<Node>>) {
        let mut tree = self.tree.lock().unwrap();
        while let Some(handle) = tree.front_mut().remove() {
            let committed = handle.timestamp().is_committed();
            handle.set_key(SortKey::default());
            tracing::trace!(sender = handle.sender().0, committed, "flush");
            if committed {
                out.push(handle);
            }
        }
        self.len.store(0, Ordering::Relaxed);
        self.publish_front(&tree);
    }

    /// Block until `is_readable()` would return `true`, or the predicate
    /// passed by the caller says to stop waiting (used by peer shutdown to
    /// wake blocked receivers).
    pub fn wait_until_readable(&self, mut should_stop: impl FnMut() -> bool) {
        let mut tree = self.tree.lock().unwrap();
        while self.front.load(Ordering::Relaxed).is_null() && !should_stop() {
            tree = self.readable.wait(tree).unwrap();
        }
    }

    /// Wake everything blocked in [`Queue::wait_until_readable`] without
    /// changing readability, e.g. on peer shutdown.
    pub fn wake_all(&self) {
        let _tree = self.tree.lock().unwrap();
        self.readable.notify_all();
    }

    fn next_ordinal(&self) -> u64 {
        self.next_ordinal.fetch_add(1, Ordering::Relaxed)
    }

    /// Recompute and publish `front` from the tree's actual minimum, waking
    /// waiters on a null-to-non-null transition. Called with `tree` already
    /// locked, at the end of every mutating operation.
    fn publish_front(&self, tree: &MutexGuard<'_, WAVLTree<Node>>) {
        let new_front = match tree.front().get() {
            Some(node) if node.timestamp().is_committed() => node as *const Node as *mut Node,
            _ => ptr::null_mut(),
        };
        let old_front = self.front.swap(new_front, Ordering::Release);
        if old_front.is_null() && !new_front.is_null() {
            self.readable.notify_all();
        }
    }
}
