// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Property tests for the quantified invariants and round-trip properties
//! (spec §8).

use peerbus::node::{MessageMeta, Node};
use peerbus::queue::Queue;
use peerbus::timestamp::{SenderId, Timestamp};
use proptest::prelude::*;

#[derive(Debug, Clone, Copy)]
enum Op {
    CommitUnstaged,
    StageThenCommit,
    StageThenRemove,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::CommitUnstaged),
        Just(Op::StageThenCommit),
        Just(Op::StageThenRemove),
    ]
}

proptest! {
    /// Invariant 2: `front(Q) != null <=> min(messages(Q))` is committed.
    /// Checked after every operation in a random sequence.
    #[test]
    fn front_reflects_committed_minimum(ops in prop::collection::vec(op_strategy(), 0..200)) {
        let queue = Queue::new();
        for (i, op) in ops.into_iter().enumerate() {
            let sender = SenderId(i as u64);
            match op {
                Op::CommitUnstaged => {
                    let node = Node::new(sender, MessageMeta::default());
                    queue.commit_unstaged(node).unwrap();
                }
                Op::StageThenCommit => {
                    let node = Node::new(sender, MessageMeta::default());
                    let ts = queue.stage(node.clone(), Timestamp::UNSTAMPED).unwrap();
                    let synced = queue.sync(ts).unwrap();
                    queue.commit_staged(&node, synced).unwrap();
                }
                Op::StageThenRemove => {
                    let node = Node::new(sender, MessageMeta::default());
                    queue.stage(node.clone(), Timestamp::UNSTAMPED).unwrap();
                    queue.remove(&node);
                }
            }
            // `is_readable` (the lock-free front != null check) must agree
            // with a locked `peek`.
            prop_assert_eq!(queue.is_readable(), queue.peek().is_some());
        }
    }

    /// Invariant 3 / round-trip: dequeuing everything yields non-decreasing
    /// timestamps, and every staged-then-removed node ends up unlinked.
    #[test]
    fn dequeue_order_is_nondecreasing(n in 0usize..100) {
        let queue = Queue::new();
        for i in 0..n {
            let node = Node::new(SenderId(i as u64), MessageMeta::default());
            queue.commit_unstaged(node).unwrap();
        }
        let mut last = None;
        while let Some(node) = queue.dequeue() {
            if let Some(prev) = last {
                prop_assert!(node.timestamp() >= prev);
            }
            last = Some(node.timestamp());
        }
        prop_assert!(queue.is_empty());
    }
}

#[test]
fn stage_then_remove_leaves_queue_empty_and_node_unlinked() {
    let queue = Queue::new();
    let node = Node::new(SenderId(1), MessageMeta::default());
    queue.stage(node.clone(), Timestamp::UNSTAMPED).unwrap();
    assert!(node.is_linked());

    assert!(queue.remove(&node));
    assert!(!node.is_linked());
    assert!(queue.is_empty());
    assert!(!queue.is_readable());
}

#[test]
fn flush_unlinks_every_staged_and_committed_node() {
    let queue = Queue::new();
    let committed = Node::new(SenderId(1), MessageMeta::default());
    queue.commit_unstaged(committed.clone()).unwrap();

    let staged = Node::new(SenderId(2), MessageMeta::default());
    queue.stage(staged.clone(), Timestamp::UNSTAMPED).unwrap();

    let mut out = Vec::new();
    queue.flush(&mut out);

    assert!(queue.is_empty());
    assert!(!queue.is_readable());
    assert!(!committed.is_linked());
    assert!(!staged.is_linked());

    // Property 5 (spec §8): every committed node appears exactly once in
    // the out_list; the staged node was never committed and must not
    // appear at all.
    let committed_hits = out
        .iter()
        .filter(|node| std::sync::Arc::ptr_eq(node, &committed))
        .count();
    assert_eq!(committed_hits, 1);
    assert!(out.iter().all(|node| !std::sync::Arc::ptr_eq(node, &staged)));
    assert_eq!(out.len(), 1);
}

#[test]
fn staged_node_never_becomes_front() {
    let queue = Queue::new();
    let staged = Node::new(SenderId(1), MessageMeta::default());
    queue.stage(staged, Timestamp::UNSTAMPED).unwrap();
    assert!(!queue.is_readable());
    assert!(queue.peek().is_none());
}

#[test]
fn commit_staged_asserts_clock_already_synced() {
    let queue = Queue::new();
    let node = Node::new(SenderId(1), MessageMeta::default());
    let ts = queue.stage(node.clone(), Timestamp::UNSTAMPED).unwrap();
    let commit_ts = Timestamp::from_raw(ts.raw() + 1);
    // Never called `queue.sync(commit_ts)`: the clock is still below
    // `commit_ts`, so the driver's "sync-before-commit" obligation (spec §5
    // ordering guarantee 1) is violated and this must be reported, not
    // silently accepted.
    let result = queue.commit_staged(&node, commit_ts);
    assert!(result.is_err());
}
