// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Distributed, peer-to-peer, read-through caching for embedded use.
//!
//! A process embedding this crate joins a pool of identical peers that share a
//! keyspace by consistent hashing. Each peer answers authoritative loads for
//! the shard it owns and keeps a small "hot" cache of popular values owned by
//! other peers. Reads go through [`Group::get`], which hides where the value
//! came from: a local cache tier, the owning peer, or the backend getter.
//! Concurrent reads of the same missing key — in one process and across the
//! pool — collapse into a single backend load.
//!
//! # Example
//!
//! ```
//! use async_trait::async_trait;
//! use peerlon::{Getter, Result, Sink, StringSink, new_group};
//!
//! struct DbGetter;
//!
//! #[async_trait]
//! impl Getter for DbGetter {
//!     async fn get(&self, key: &str, dest: &mut dyn Sink) -> Result<()> {
//!         // Consult the authoritative store here.
//!         dest.set_string(&format!("value-for-{key}"))
//!     }
//! }
//!
//! # futures::executor::block_on(async {
//! let group = new_group("example", 64 << 20, DbGetter);
//!
//! let mut out = String::new();
//! group.get("color", &mut StringSink::new(&mut out)).await?;
//! assert_eq!(out, "value-for-color");
//! # Ok::<(), peerlon::Error>(())
//! # });
//! ```
//!
//! Without a registered transport every key is owned locally. To take part in
//! a pool, a transport crate implements [`PeerPicker`] and [`ProtoGetter`] and
//! installs itself with [`register_peer_picker`].

mod cache;
mod error;
mod group;
pub mod lru;
mod peers;
mod sink;
mod stats;
mod view;
mod wire;

pub use cache::CacheStats;
pub use error::{Error, Result, SharedCause};
pub use group::{CacheKind, Getter, Group, get_group, new_group};
pub use peers::{NoPeers, PeerPicker, ProtoGetter, register_peer_picker, register_per_group_peer_picker};
pub use sink::{AllocatingByteSliceSink, ByteViewSink, ProtoSink, Sink, SinkExt, StringSink, TruncatingByteSliceSink};
pub use stats::{Counter, Stats};
pub use view::ByteView;
pub use wire::{GetRequest, GetResponse};
