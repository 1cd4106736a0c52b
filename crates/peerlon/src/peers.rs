// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! How a process finds and talks to its peers.
//!
//! The engine never speaks a wire protocol itself. A transport layer
//! implements [`PeerPicker`] (who owns a key) and [`ProtoGetter`] (fetch from
//! that owner) and installs itself process-wide through
//! [`register_peer_picker`] or [`register_per_group_peer_picker`]. Until one
//! is installed, every group behaves as if it owned the whole keyspace.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;

use crate::error::Result;
use crate::wire::{GetRequest, GetResponse};

/// Fetches a value from a remote peer. Implemented by transport layers.
#[async_trait]
pub trait ProtoGetter: Send + Sync {
    /// Performs the fetch described by `request`, filling in `response`.
    async fn get(&self, request: &GetRequest, response: &mut GetResponse) -> Result<()>;
}

/// Locates the peer that owns a key.
pub trait PeerPicker: Send + Sync {
    /// Returns the owning remote peer, or `None` when the local process owns
    /// `key`.
    fn pick_peer(&self, key: &str) -> Option<Arc<dyn ProtoGetter>>;
}

/// A picker that never nominates a remote peer.
///
/// This is what groups see when no transport has registered itself: every key
/// is owned locally.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoPeers;

impl PeerPicker for NoPeers {
    fn pick_peer(&self, _key: &str) -> Option<Arc<dyn ProtoGetter>> {
        None
    }
}

type PickerFactory = Box<dyn Fn(&str) -> Arc<dyn PeerPicker> + Send + Sync>;

/// Write-once slot holding the process-wide picker factory.
static PICKER_FACTORY: OnceLock<PickerFactory> = OnceLock::new();

/// Registers the function producing the process-wide peer picker.
///
/// Exactly one of [`register_peer_picker`] and
/// [`register_per_group_peer_picker`] may be called, once, for the life of the
/// process.
///
/// # Panics
///
/// Panics if a peer picker registration already happened.
pub fn register_peer_picker(factory: impl Fn() -> Arc<dyn PeerPicker> + Send + Sync + 'static) {
    install(Box::new(move |_| factory()));
}

/// Registers a picker factory that may return a different picker per group,
/// keyed by group name.
///
/// Exactly one of [`register_peer_picker`] and
/// [`register_per_group_peer_picker`] may be called, once, for the life of the
/// process.
///
/// # Panics
///
/// Panics if a peer picker registration already happened.
pub fn register_per_group_peer_picker(factory: impl Fn(&str) -> Arc<dyn PeerPicker> + Send + Sync + 'static) {
    install(Box::new(factory));
}

fn install(factory: PickerFactory) {
    assert!(
        PICKER_FACTORY.set(factory).is_ok(),
        "a peer picker is already registered for this process"
    );
}

/// Resolves the picker for a group.
///
/// Called on every load rather than once per group, so membership changes made
/// by the transport are honored immediately.
pub(crate) fn picker_for(group_name: &str) -> Arc<dyn PeerPicker> {
    match PICKER_FACTORY.get() {
        Some(factory) => factory(group_name),
        None => Arc::new(NoPeers),
    }
}
