// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Component E: the transaction driver (spec §4.4) — assigns one commit
//! timestamp to a batch of per-destination nodes across multiple peers'
//! queues.
//!
//! Each destination gets its own [`Node`]: a node is intrusive to exactly
//! one queue's tree, so a multicast send threads one node per destination,
//! all carrying the same payload metadata, through the stage/sync/commit
//! protocol together.

use crate::error::{invariant, Result};
use crate::node::{MessageMeta, Node};
use crate::peer::Peer;
use crate::timestamp::SenderId;
use std::sync::Arc;

/// Per-destination outcome of a [`Transaction::send`].
#[derive(Debug)]
pub enum Delivery {
    Committed,
    /// `stage`/`commit_staged` failed for this destination only; the
    /// transaction still committed on every other destination (spec §4.4:
    /// "never rolls back a successful commit on another destination").
    Failed(crate::error::Error),
}

/// Drives one send across one or more destination peers.
pub struct Transaction {
    sender: SenderId,
}

impl Transaction {
    pub fn new(sender: SenderId) -> Self {
        Transaction { sender }
    }

    /// Unicast fast path: commit directly, no staging round-trip.
    pub fn send_unicast(&self, destination: &Peer, meta: MessageMeta) -> Result<()> {
        let queue = destination.queue().ok_or(crate::error::Error::NotConnected)?;
        let node = Node::new(self.sender, meta);
        queue.commit_unstaged(node)?;
        Ok(())
    }

    /// Multicast stage-all / sync-to-max / commit-all protocol.
    ///
    /// Returns one [`Delivery`] per destination, in the same order as
    /// `destinations`. A destination whose queue vanished mid-flight (peer
    /// disconnected) or whose `stage` failed reports [`Delivery::Failed`];
    /// destinations that already staged successfully are still committed.
    pub fn send_multicast(
        &self,
        destinations: &[(Arc<Peer>, MessageMeta)],
    ) -> Result<Vec<Delivery>> {
        // Phase 1: stage a fresh node on every reachable destination.
        let mut staged = Vec::with_capacity(destinations.len());
        for (peer, meta) in destinations {
            let outcome = match peer.queue() {
                Some(queue) => {
                    let node = Node::new(self.sender, *meta);
                    match queue.stage(node.clone(), crate::timestamp::Timestamp::UNSTAMPED) {
                        Ok(stage_ts) => Ok((queue, node, stage_ts)),
                        Err(e) => Err(e),
                    }
                }
                None => Err(crate::error::Error::NotConnected),
            };
            staged.push(outcome);
        }

        // Phase 2: T = max(stage timestamps), rounded up to an even value.
        let max_raw = staged
            .iter()
            .filter_map(|s| s.as_ref().ok())
            .map(|(_, _, ts)| ts.raw())
            .max()
            .unwrap_or(0);
        let rounded = (max_raw + 1) & !1;
        let commit_ts = crate::timestamp::Timestamp::from_raw(rounded);

        // Phase 3: sync every destination's clock to >= T, then commit.
        let mut results = Vec::with_capacity(destinations.len());
        for outcome in staged {
            let delivery = match outcome {
                Ok((queue, node, _stage_ts)) => {
                    let synced = queue.sync(commit_ts);
                    match synced.and_then(|t| {
                        invariant!(
                            t >= commit_ts,
                            "queue sync returned below the transaction's commit timestamp"
                        );
                        queue.commit_staged(&node, commit_ts)
                    }) {
                        Ok(true) => Delivery::Committed,
                        Ok(false) => {
                            Delivery::Failed(crate::error::Error::Shutdown)
                        }
                        Err(e) => Delivery::Failed(e),
                    }
                }
                Err(e) => Delivery::Failed(e),
            };
            results.push(delivery);
        }
        Ok(results)
    }

    /// Cancel a staged-but-not-yet-committed node: if still linked, remove
    /// it; if the queue already flushed it, just drop our reference (spec
    /// §5 "Cancellation").
    pub fn cancel(&self, queue: &crate::queue::Queue, node: &Arc<Node>) {
        if node.is_linked() {
            queue.remove(node);
        }
    }
}
