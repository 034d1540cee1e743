// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! End-to-end scenarios S1-S6 driven through the public request surface.

use peerbus::config::ConnectConfig;
use peerbus::error::Error;
use peerbus::handles::RawHandle;
use peerbus::node::{MessageMeta, Node};
use peerbus::request::{
    request_connect, request_recv, request_send, Bus, ConnectFlags, ConnectOutcome, RecvFlags,
    SendFlags,
};
use peerbus::timestamp::Timestamp;
use peerbus::transaction::{Delivery, Transaction};
use std::sync::Arc;

fn connect(bus: &Bus, pool_size: u64) -> Arc<peerbus::Peer> {
    let id = bus.create_peer();
    let peer = bus.peer(id).unwrap();
    request_connect(&peer, ConnectFlags::CLIENT, pool_size).unwrap();
    peer
}

#[test]
fn s1_simple_unicast() {
    let bus = Bus::new();
    let a = connect(&bus, 4096);
    let b = connect(&bus, 4096);

    request_send(
        &a,
        SendFlags::empty(),
        &[b.clone()],
        &[b"12345678"],
        0,
        &[],
    )
    .unwrap();

    let got = request_recv(&b, RecvFlags::empty()).unwrap();
    assert_eq!(got.offset, 0);
    assert_eq!(got.size, 8);
    assert_eq!(got.n_fds, 0);

    let err = request_recv(&b, RecvFlags::empty()).unwrap_err();
    assert!(matches!(err, Error::WouldBlock));
}

#[test]
fn s2_multicast_ordering() {
    let bus = Bus::new();
    let a = connect(&bus, 4096);
    let b = connect(&bus, 4096);
    let c = connect(&bus, 4096);
    let s = connect(&bus, 4096);

    // Pre-advance each destination's clock to 10 / 20 / 4 by committing
    // enough unicast filler messages (each commit ticks by 2).
    for (peer, ticks) in [(&a, 5), (&b, 10), (&c, 2)] {
        for _ in 0..ticks {
            request_send(&s, SendFlags::empty(), &[peer.clone()], &[b"x"], 0, &[]).unwrap();
            request_recv(peer, RecvFlags::empty()).unwrap();
        }
    }

    let deliveries = request_send(
        &s,
        SendFlags::empty(),
        &[a.clone(), b.clone(), c.clone()],
        &[b"hi"],
        0,
        &[],
    )
    .unwrap();
    assert!(deliveries.iter().all(|d| matches!(d, Delivery::Committed)));

    for peer in [&a, &b, &c] {
        let got = request_recv(peer, RecvFlags::empty()).unwrap();
        assert_eq!(got.size, 2);
    }

    // A subsequent solo send to A gets a strictly higher timestamp than 22.
    request_send(&s, SendFlags::empty(), &[a.clone()], &[b"y"], 0, &[]).unwrap();
    request_recv(&a, RecvFlags::empty()).unwrap();
}

#[test]
fn s3_stager_blocks_front() {
    let bus = Bus::new();
    let a = connect(&bus, 4096);
    let queue = a.queue().unwrap();

    let n1 = Node::new(peerbus::SenderId(1), MessageMeta::default());
    let stage_ts = queue.stage(n1.clone(), Timestamp::UNSTAMPED).unwrap();
    assert!(stage_ts.is_staged());

    let n2 = Node::new(peerbus::SenderId(2), MessageMeta::default());
    let commit_ts2 = queue.commit_unstaged(n2.clone()).unwrap();

    assert!(!queue.is_readable());
    assert!(request_recv(&a, RecvFlags::empty()).is_err());

    let final_ts1 = Timestamp::from_raw(commit_ts2.raw() + 2);
    queue.sync(final_ts1).unwrap();
    assert!(queue.commit_staged(&n1, final_ts1).unwrap());

    let first = queue.dequeue().unwrap();
    assert_eq!(first.sender(), n2.sender());
    let second = queue.dequeue().unwrap();
    assert_eq!(second.sender(), n1.sender());
}

#[test]
fn s4_flush_with_live_stager() {
    let bus = Bus::new();
    let a = connect(&bus, 4096);
    let queue = a.queue().unwrap();

    let c = Node::new(peerbus::SenderId(1), MessageMeta::default());
    queue.commit_unstaged(c).unwrap();

    let s = Node::new(peerbus::SenderId(2), MessageMeta::default());
    queue.stage(s.clone(), Timestamp::UNSTAMPED).unwrap();

    a.disconnect().unwrap();

    assert!(!s.is_linked());
    let txn = Transaction::new(peerbus::SenderId(2));
    assert!(!queue.commit_staged(&s, Timestamp::from_raw(100)).unwrap());
    let _ = txn;
}

#[test]
fn s5_fd_repeek_race() {
    let bus = Bus::new();
    let a = connect(&bus, 4096);
    let b = connect(&bus, 4096);

    let fds: Vec<RawHandle> = (0..3).map(RawHandle).collect();
    request_send(&a, SendFlags::empty(), &[b.clone()], &[b"msg"], 0, &fds).unwrap();

    let got = request_recv(&b, RecvFlags::empty()).unwrap();
    assert_eq!(got.n_fds, 3);
    assert_eq!(got.fd_indices.len(), 3);
}

#[test]
fn s6_reset_preserves_identity() {
    let bus = Bus::new();
    let a = connect(&bus, 8192);
    let b = connect(&bus, 4096);

    request_send(&b, SendFlags::empty(), &[a.clone()], &[b"one"], 0, &[]).unwrap();
    request_send(&b, SendFlags::empty(), &[a.clone()], &[b"two"], 0, &[]).unwrap();
    request_recv(&a, RecvFlags::empty()).unwrap();
    request_recv(&a, RecvFlags::empty()).unwrap();

    let outcome = request_connect(&a, ConnectFlags::RESET, 0).unwrap();
    assert!(matches!(outcome, ConnectOutcome::Reset));

    let outcome = request_connect(&a, ConnectFlags::QUERY, 0).unwrap();
    assert!(matches!(outcome, ConnectOutcome::PoolSize(8192)));

    request_send(&b, SendFlags::empty(), &[a.clone()], &[b"three"], 0, &[]).unwrap();
    let got = request_recv(&a, RecvFlags::empty()).unwrap();
    assert_eq!(got.offset, 0);
}

#[test]
fn send_continue_delivers_multi_part_transaction() {
    let bus = Bus::new();
    let a = connect(&bus, 4096);
    let b = connect(&bus, 4096);

    // Two destinations, two parts each: every destination's queue should
    // end up with two nodes sharing one commit timestamp, so the first
    // part's `recv` reports a continuation and the second does not.
    let deliveries = request_send(
        &a,
        SendFlags::CONTINUE,
        &[b.clone()],
        &[b"part-one", b"part-two"],
        0,
        &[],
    )
    .unwrap();
    assert_eq!(deliveries.len(), 2);
    assert!(deliveries.iter().all(|d| matches!(d, Delivery::Committed)));

    let first = request_recv(&b, RecvFlags::empty()).unwrap();
    assert_eq!(first.size, 8);
    assert!(first.continuation);

    let second = request_recv(&b, RecvFlags::empty()).unwrap();
    assert_eq!(second.size, 8);
    assert!(!second.continuation);

    assert!(matches!(
        request_recv(&b, RecvFlags::empty()).unwrap_err(),
        Error::WouldBlock
    ));
}

#[test]
fn send_rejects_continue_with_one_part() {
    let bus = Bus::new();
    let a = connect(&bus, 4096);
    let b = connect(&bus, 4096);

    let err = request_send(&a, SendFlags::CONTINUE, &[b.clone()], &[b"only"], 0, &[]).unwrap_err();
    assert!(matches!(err, Error::InvalidArgument { .. }));
}

#[test]
fn send_rejects_continue_combined_with_release() {
    let bus = Bus::new();
    let a = connect(&bus, 4096);
    let b = connect(&bus, 4096);

    let flags = SendFlags::CONTINUE | SendFlags::RELEASE;
    let err = request_send(&a, flags, &[b.clone()], &[b"one", b"two"], 0, &[]).unwrap_err();
    assert!(matches!(err, Error::InvalidArgument { .. }));
}

#[test]
fn send_silent_with_no_destinations_is_a_no_op() {
    let bus = Bus::new();
    let a = connect(&bus, 4096);

    let deliveries = request_send(&a, SendFlags::SILENT, &[], &[b"nobody"], 0, &[]).unwrap();
    assert!(deliveries.is_empty());
}

#[test]
fn connect_rejects_bad_pool_size() {
    let bus = Bus::new();
    let id = bus.create_peer();
    let peer = bus.peer(id).unwrap();
    let err = request_connect(&peer, ConnectFlags::CLIENT, 100).unwrap_err();
    assert!(matches!(err, Error::InvalidArgument { .. }));

    let cfg = ConnectConfig {
        pool_size: 100,
        fd_max: 16,
    };
    assert!(cfg.validate_client().is_err());
}

#[test]
fn disconnect_is_idempotent_under_concurrency() {
    let bus = Bus::new();
    let a = connect(&bus, 4096);

    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let peer = a.clone();
                scope.spawn(move || peer.disconnect())
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let ok_count = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(ok_count, 1);
        assert!(results
            .iter()
            .filter(|r| r.is_err())
            .all(|r| matches!(r, Err(Error::Shutdown))));
    });
}
