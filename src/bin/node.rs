//! `driftnet-node`: a standalone DHT node binary wiring `driftnet::dht::server::Server`
//! to a real UDP socket and a tokio reactor. Everything interesting - routing,
//! NAT punching, rendezvous - lives in the library; this binary only owns the
//! socket, the tick timer, and the state file (§5: the core itself spawns no
//! threads and owns no socket).

extern crate driftnet;
extern crate env_logger;
extern crate futures;
extern crate hex;
#[macro_use]
extern crate log;
extern crate structopt;
extern crate tokio;
extern crate tokio_timer;

use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process;
use std::time::{Duration, Instant};

use futures::prelude::*;
use futures::sync::mpsc;
use structopt::StructOpt;
use tokio::net::UdpSocket;
use tokio_timer::Interval;

use driftnet::config::Config;
use driftnet::crypto_core::{crypto_init, gen_keypair, PublicKey};
use driftnet::dht::packet::DhtPacket;
use driftnet::dht::server::Server;
use driftnet::net::DhtCodec;
use driftnet::persistence;

/// How often `Server::tick` runs - one second is comfortably finer than the
/// shortest periodic interval named in §3 (`PING_TIMEOUT`, 5s).
const TICK_INTERVAL: Duration = Duration::from_millis(1000);
/// Re-save the state file this many ticks apart, so a crash loses at most
/// this much close-list/friend-list churn (no stronger guarantee is made;
/// session persistence across crashes is a stated Non-goal).
const SAVE_EVERY_TICKS: u32 = 60;

#[derive(StructOpt)]
#[structopt(name = "driftnet-node", about = "A standalone node in a driftnet DHT")]
struct Opt {
    /// Address to bind the UDP socket to.
    #[structopt(long = "bind", default_value = "0.0.0.0")]
    bind: String,

    /// UDP port to listen on.
    #[structopt(long = "port", default_value = "33445")]
    port: u16,

    /// `host port hex-public-key` triple to bootstrap from, e.g.
    /// `--bootstrap "1.2.3.4 33445 1234...cdef"`. May be repeated.
    #[structopt(long = "bootstrap")]
    bootstrap: Vec<String>,

    /// Path to a persisted state file (§4.9): loaded at startup if present,
    /// and periodically re-saved. If omitted the node starts empty and
    /// saves nothing.
    #[structopt(long = "state-file", parse(from_os_str))]
    state_file: Option<PathBuf>,
}

/// Parse one `--bootstrap` value: whitespace-separated `host port hexkey`,
/// matching the triple named in §6's CLI/configuration notes.
fn parse_bootstrap(spec: &str) -> Option<(SocketAddr, PublicKey)> {
    let mut parts = spec.split_whitespace();
    let host = parts.next()?;
    let port: u16 = parts.next()?.parse().ok()?;
    let pk_hex = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    let addr: SocketAddr = format!("{}:{}", host, port).parse().ok()?;
    let bytes = hex::decode(pk_hex).ok()?;
    let pk = PublicKey::from_slice(&bytes)?;
    Some((addr, pk))
}

fn load_state_file(path: &PathBuf) -> Option<persistence::LoadedState> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("could not read state file {:?}: {}", path, e);
            return None;
        }
    };
    match persistence::load(&bytes) {
        Ok(state) => Some(state),
        Err(e) => {
            warn!("could not parse state file {:?}: {}", path, e);
            None
        }
    }
}

fn main() {
    env_logger::init();
    crypto_init();

    let opt = Opt::from_args();
    let bind_addr: SocketAddr = match format!("{}:{}", opt.bind, opt.port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            eprintln!("invalid bind address {}:{}: {}", opt.bind, opt.port, e);
            process::exit(1);
        }
    };

    let (pk, sk) = gen_keypair();
    info!("node public key: {}", hex::encode(pk.0));

    let server = Server::new(pk, sk, Config::default());

    if let Some(ref path) = opt.state_file {
        if let Some(state) = load_state_file(path) {
            info!(
                "restored {} friend(s) and {} close-list node(s) from {:?}",
                state.friends.len(),
                state.close_nodes.len(),
                path
            );
            server.load_state(state);
        }
    }

    let bootstrap_targets: Vec<(SocketAddr, PublicKey)> = opt.bootstrap.iter()
        .filter_map(|spec| {
            let parsed = parse_bootstrap(spec);
            if parsed.is_none() {
                warn!("ignoring malformed --bootstrap value: {}", spec);
            }
            parsed
        })
        .collect();

    let socket = match UdpSocket::bind(&bind_addr) {
        Ok(socket) => socket,
        Err(e) => {
            eprintln!("could not bind UDP socket on {}: {}", bind_addr, e);
            process::exit(1);
        }
    };
    info!("listening on {}", bind_addr);

    let (sink, stream) = socket.framed(DhtCodec).split();
    let (tx, rx) = mpsc::unbounded::<(SocketAddr, DhtPacket)>();

    for (addr, bootstrap_pk) in bootstrap_targets {
        let events = server.bootstrap(bootstrap_pk, addr);
        for send in events.sends {
            let _ = tx.unbounded_send(send);
        }
    }

    // `Server` is shared (read-mostly, internally `RwLock`-guarded, §5) across
    // the three driving futures below: the writer only touches the channel,
    // the reader mutates state per inbound datagram, the ticker mutates state
    // once a second.
    let server = ::std::sync::Arc::new(server);

    let writer = rx
        .map(|(addr, packet)| (packet, addr))
        .forward(sink.sink_map_err(|e| { error!("udp send error: {}", e); }))
        .map(|_| ())
        .map_err(|()| ());

    let server_for_reader = server.clone();
    let tx_for_reader = tx.clone();
    let reader = stream
        .map_err(|e| error!("udp recv error: {}", e))
        .for_each(move |(packet, addr)| {
            let events = server_for_reader.handle_packet(addr, packet);
            for (found_pk, extra) in events.rendezvous_found {
                info!("rendezvous match: {} extra={:?}", hex::encode(found_pk.0), extra);
            }
            for send in events.sends {
                let _ = tx_for_reader.unbounded_send(send);
            }
            Ok(())
        });

    let server_for_ticker = server.clone();
    let ticks = Interval::new(Instant::now() + TICK_INTERVAL, TICK_INTERVAL);
    let tx_for_ticker = tx.clone();
    let state_path = opt.state_file.clone();
    let mut tick_count: u32 = 0;
    let ticker = ticks
        .map_err(|e| error!("tick timer error: {}", e))
        .for_each(move |_| {
            let events = server_for_ticker.tick();
            for send in events.sends {
                let _ = tx_for_ticker.unbounded_send(send);
            }

            tick_count = tick_count.wrapping_add(1);
            if tick_count % SAVE_EVERY_TICKS == 0 {
                if let Some(ref path) = state_path {
                    let bytes = server_for_ticker.save_state();
                    if let Err(e) = fs::write(path, &bytes) {
                        warn!("could not save state file {:?}: {}", path, e);
                    }
                }
            }
            Ok(())
        });

    tokio::run(futures::lazy(move || {
        tokio::spawn(writer);
        tokio::spawn(reader);
        tokio::spawn(ticker);
        Ok(())
    }));
}
