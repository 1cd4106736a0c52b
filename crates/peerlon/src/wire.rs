// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Messages exchanged between peers.
//!
//! The field numbers are part of the wire contract shared by every transport
//! implementation and must not change; the engine itself only ever reads
//! [`GetResponse::value`].

use bytes::Bytes;

/// Asks the peer that owns `key` within `group` for its value.
#[derive(Clone, PartialEq, prost::Message)]
pub struct GetRequest {
    /// Name of the group the key belongs to.
    #[prost(string, tag = "1")]
    pub group: String,
    /// The key being read.
    #[prost(string, tag = "2")]
    pub key: String,
}

/// Carries the owning peer's value back to the asking peer.
#[derive(Clone, PartialEq, prost::Message)]
pub struct GetResponse {
    /// The value bytes.
    #[prost(bytes = "bytes", tag = "1")]
    pub value: Bytes,
    /// Queries per minute the owner observes for this key, when it tracks
    /// that; advisory only.
    #[prost(double, optional, tag = "2")]
    pub minute_qps: Option<f64>,
}
