// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Interactive shell over the `peerbus` request surface. Each line is one
//! command against a shared [`Bus`]; peers are referred to by a name you
//! pick at `peer` time rather than their raw `SenderId`.

use anyhow::Context;
use clap::Parser;
use peerbus::request::{
    request_connect, request_recv, request_send, Bus, ConnectFlags, ConnectOutcome, RecvFlags,
    SendFlags,
};
use peerbus::SenderId;
use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "", no_binary_name = true)]
enum Command {
    /// Register a new peer under `name`, in the `new` state.
    Peer { name: String },
    /// `connect(CLIENT, pool_size)` for an already-registered peer.
    Connect { name: String, pool_size: u64 },
    /// `connect(RESET, 0)`.
    Reset { name: String },
    /// `connect(QUERY, 0)`, prints the pool size.
    Query { name: String },
    /// Prints the peer's queued-message count.
    Status { name: String },
    /// `send` a UTF-8 message from `from` to one or more destinations.
    Send {
        from: String,
        #[arg(long = "to", required = true)]
        to: Vec<String>,
        message: String,
    },
    /// `recv`, optionally with the `PEEK` flag.
    Recv {
        name: String,
        #[arg(long)]
        peek: bool,
    },
    Disconnect { name: String },
    Quit,
}

fn main() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .try_init();

    let bus = Bus::new();
    let mut names: HashMap<String, SenderId> = HashMap::new();

    let stdin = io::stdin();
    print!("peerbus> ");
    io::stdout().flush().context("writing prompt to stdout")?;
    for line in stdin.lock().lines() {
        let line = line.context("reading a line from stdin")?;
        let tokens = shell_words(&line);
        if tokens.is_empty() {
            print!("peerbus> ");
            io::stdout().flush().context("writing prompt to stdout")?;
            continue;
        }
        match Command::try_parse_from(tokens) {
            Ok(Command::Quit) => break,
            Ok(cmd) => run(&bus, &mut names, cmd),
            Err(e) => println!("{e}"),
        }
        print!("peerbus> ");
        io::stdout().flush().context("writing prompt to stdout")?;
    }
    Ok(())
}

/// Splits on whitespace; no quoting support, adequate for this demo's
/// single-word message arguments.
fn shell_words(line: &str) -> Vec<String> {
    line.split_whitespace().map(str::to_owned).collect()
}

fn run(bus: &Bus, names: &mut HashMap<String, SenderId>, cmd: Command) {
    match cmd {
        Command::Peer { name } => {
            let id = bus.create_peer();
            names.insert(name.clone(), id);
            println!("registered {name}");
        }
        Command::Connect { name, pool_size } => {
            with_peer(bus, names, &name, |peer| {
                request_connect(peer, ConnectFlags::CLIENT, pool_size).map(|_| ())
            });
        }
        Command::Reset { name } => {
            with_peer(bus, names, &name, |peer| {
                request_connect(peer, ConnectFlags::RESET, 0).map(|_| ())
            });
        }
        Command::Query { name } => {
            with_peer(bus, names, &name, |peer| {
                match request_connect(peer, ConnectFlags::QUERY, 0)? {
                    ConnectOutcome::PoolSize(size) => {
                        println!("{name} pool_size = {size}");
                        Ok(())
                    }
                    _ => unreachable!(),
                }
            });
        }
        Command::Status { name } => {
            with_peer(bus, names, &name, |peer| {
                let pending = peer.pending_len()?;
                println!("{name} pending = {pending}");
                Ok(())
            });
        }
        Command::Send { from, to, message } => {
            let Some(&from_id) = names.get(&from) else {
                println!("unknown peer {from}");
                return;
            };
            let Some(from_peer) = bus.peer(from_id) else {
                println!("unknown peer {from}");
                return;
            };
            let mut destinations = Vec::with_capacity(to.len());
            for name in &to {
                match names.get(name).and_then(|id| bus.peer(*id)) {
                    Some(peer) => destinations.push(peer),
                    None => {
                        println!("unknown peer {name}");
                        return;
                    }
                }
            }
            match request_send(
                &from_peer,
                SendFlags::empty(),
                &destinations,
                &[message.as_bytes()],
                0,
                &[],
            ) {
                Ok(deliveries) => println!("{deliveries:?}"),
                Err(e) => println!("send failed: {e}"),
            }
        }
        Command::Recv { name, peek } => {
            with_peer(bus, names, &name, |peer| {
                let flags = if peek {
                    RecvFlags::PEEK
                } else {
                    RecvFlags::empty()
                };
                let got = request_recv(peer, flags)?;
                println!(
                    "offset={} size={} n_handles={} n_fds={} continuation={}",
                    got.offset, got.size, got.n_handles, got.n_fds, got.continuation
                );
                Ok(())
            });
        }
        Command::Disconnect { name } => {
            with_peer(bus, names, &name, |peer| peer.disconnect());
        }
        Command::Quit => unreachable!("handled by the caller"),
    }
}

fn with_peer(
    bus: &Bus,
    names: &HashMap<String, SenderId>,
    name: &str,
    f: impl FnOnce(&peerbus::Peer) -> peerbus::Result<()>,
) {
    let Some(&id) = names.get(name) else {
        println!("unknown peer {name}");
        return;
    };
    let Some(peer) = bus.peer(id) else {
        println!("unknown peer {name}");
        return;
    };
    if let Err(e) = f(&peer) {
        println!("{name}: {e}");
    }
}
