//! `driftnet`: the routing core of a serverless peer-to-peer messaging
//! network - a Kademlia-style DHT over UDP, end-to-end encrypted friend
//! discovery, NAT hole punching, and passphrase rendezvous.
//!
//! This crate is the engine, not the application: it owns the close list,
//! friend lists, NAT state and rendezvous store, and exposes a single
//! tickable [`dht::server::Server`](dht/server/struct.Server.html). A
//! surrounding binary (see `src/bin/node.rs`) wires it to a real UDP socket
//! and an event loop; nothing in this crate spawns threads or owns the
//! socket itself (§5).

#![cfg_attr(feature = "cargo-clippy", allow(clippy::too_many_arguments))]

#[macro_use]
extern crate cookie_factory;
#[macro_use]
extern crate failure_derive;
#[macro_use]
extern crate log;
#[macro_use]
extern crate nom;

extern crate byteorder;
extern crate bytes;
extern crate failure;
extern crate futures;
extern crate get_if_addrs;
extern crate hex;
extern crate parking_lot;
extern crate sodiumoxide;
extern crate tokio;
extern crate tokio_codec;
extern crate tokio_timer;

#[cfg(test)]
extern crate quickcheck;
#[cfg(test)]
extern crate rand;
#[cfg(test)]
extern crate tokio_executor;

pub mod binary_io;
pub mod config;
pub mod crypto_core;
pub mod dht;
pub mod error;
pub mod ip_port;
pub mod lan;
pub mod net;
pub mod persistence;
pub mod rendezvous;

pub use config::Config;
pub use crypto_core::{crypto_init, gen_keypair, PublicKey, SecretKey};
pub use dht::server::Server;
pub use error::{CoreError, CoreResult};
