// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! HTTP transport connecting peerlon peers.
//!
//! An [`HttpPool`] makes a process a member of a peer pool: it owns the
//! consistent-hash ring mapping keys to peer base URLs, serves its own shard
//! over HTTP (via [`HttpPool::router`]), and fetches remotely owned keys from
//! the responsible peer. Creating the pool registers it as the process-wide
//! peer picker.
//!
//! # Example
//!
//! ```no_run
//! use peerlon_http::HttpPool;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = HttpPool::new("http://10.0.0.1:8000");
//! pool.set_peers([
//!     "http://10.0.0.1:8000".to_string(),
//!     "http://10.0.0.2:8000".to_string(),
//!     "http://10.0.0.3:8000".to_string(),
//! ]);
//!
//! let listener = tokio::net::TcpListener::bind("10.0.0.1:8000").await?;
//! axum::serve(listener, pool.router()).await?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use axum::Router;
use axum::extract::Path;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use parking_lot::Mutex;
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use prost::Message;
use ringhash::Ring;

use peerlon::{ByteView, ByteViewSink, Error, GetRequest, GetResponse, PeerPicker, ProtoGetter, Result};

/// Path prefix under which peers serve each other's reads.
pub const DEFAULT_BASE_PATH: &str = "/_peerlon/";

const DEFAULT_REPLICAS: usize = 50;

/// Configuration for an [`HttpPool`].
pub struct HttpPoolOptions {
    /// The HTTP path prefix serving pool requests. Must start and end with a
    /// slash. Defaults to [`DEFAULT_BASE_PATH`].
    pub base_path: String,
    /// Virtual points per peer on the consistent-hash ring. Defaults to 50.
    pub replicas: usize,
    /// Ring hash function override; the default is a stable 32-bit checksum.
    pub hash: Option<Arc<dyn Fn(&[u8]) -> u32 + Send + Sync>>,
}

impl Default for HttpPoolOptions {
    fn default() -> Self {
        Self {
            base_path: DEFAULT_BASE_PATH.to_string(),
            replicas: DEFAULT_REPLICAS,
            hash: None,
        }
    }
}

impl fmt::Debug for HttpPoolOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpPoolOptions")
            .field("base_path", &self.base_path)
            .field("replicas", &self.replicas)
            .finish_non_exhaustive()
    }
}

/// Membership and routing state, rebuilt wholesale on every peer update.
struct PoolState {
    ring: Ring,
    getters: HashMap<String, Arc<HttpGetter>>,
}

/// A pool of HTTP peers; the [`PeerPicker`] for this process.
pub struct HttpPool {
    self_url: String,
    opts: HttpPoolOptions,
    client: reqwest::Client,
    state: Mutex<PoolState>,
}

/// Guards against a second pool hijacking the picker registration.
static POOL_MADE: AtomicBool = AtomicBool::new(false);

impl HttpPool {
    /// Creates a pool with default options and registers it as the
    /// process-wide peer picker.
    ///
    /// `self_url` is this process's own base URL as the other peers see it,
    /// e.g. `http://example.net:8000`.
    ///
    /// # Panics
    ///
    /// Panics if a pool was already created in this process, or if a peer
    /// picker is already registered.
    pub fn new(self_url: impl Into<String>) -> Arc<Self> {
        Self::with_options(self_url, HttpPoolOptions::default())
    }

    /// Creates a pool with the given options and registers it as the
    /// process-wide peer picker.
    ///
    /// # Panics
    ///
    /// Panics under the same conditions as [`new`](Self::new), and if
    /// `base_path` is not slash-delimited.
    pub fn with_options(self_url: impl Into<String>, opts: HttpPoolOptions) -> Arc<Self> {
        assert!(
            !POOL_MADE.swap(true, Ordering::SeqCst),
            "only one HTTP pool may exist per process"
        );
        assert!(
            opts.base_path.starts_with('/') && opts.base_path.ends_with('/'),
            "base_path must start and end with '/'"
        );

        let pool = Arc::new(Self {
            self_url: self_url.into(),
            state: Mutex::new(PoolState {
                ring: build_ring(&opts),
                getters: HashMap::new(),
            }),
            opts,
            client: reqwest::Client::new(),
        });

        let picker = Arc::clone(&pool);
        peerlon::register_peer_picker(move || Arc::clone(&picker) as Arc<dyn PeerPicker>);

        pool
    }

    /// Replaces the pool's peer set.
    ///
    /// Each peer is a base URL, and the set should include this process's own
    /// `self_url`. A fresh ring and getter table are built and swapped in
    /// atomically; in-flight fetches keep using the old ones.
    pub fn set_peers<I, S>(&self, peers: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let urls: Vec<String> = peers.into_iter().map(Into::into).collect();

        let mut ring = build_ring(&self.opts);
        ring.add(urls.iter().cloned());

        let getters = urls
            .into_iter()
            .map(|url| {
                let getter = Arc::new(HttpGetter {
                    client: self.client.clone(),
                    base_url: format!("{url}{}", self.opts.base_path),
                });
                (url, getter)
            })
            .collect();

        *self.state.lock() = PoolState { ring, getters };
    }

    /// Returns the router serving this pool's shard to the other peers.
    ///
    /// Mount it on whatever server the embedding application runs; values are
    /// served under `{base_path}{group}/{key}` as protobuf-encoded
    /// [`GetResponse`] bodies.
    #[must_use]
    pub fn router(&self) -> Router {
        let path = format!("{}{{group}}/{{key}}", self.opts.base_path);
        Router::new().route(&path, get(serve_value))
    }
}

impl PeerPicker for HttpPool {
    fn pick_peer(&self, key: &str) -> Option<Arc<dyn ProtoGetter>> {
        let state = self.state.lock();
        let owner = state.ring.get(key)?;
        if owner == self.self_url {
            return None;
        }
        state
            .getters
            .get(owner)
            .map(|getter| Arc::clone(getter) as Arc<dyn ProtoGetter>)
    }
}

impl fmt::Debug for HttpPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpPool")
            .field("self_url", &self.self_url)
            .field("opts", &self.opts)
            .finish_non_exhaustive()
    }
}

fn build_ring(opts: &HttpPoolOptions) -> Ring {
    match &opts.hash {
        Some(hash) => {
            let hash = Arc::clone(hash);
            Ring::with_hasher(opts.replicas, move |bytes| hash(bytes))
        }
        None => Ring::new(opts.replicas),
    }
}

/// Serves one key on behalf of another peer.
async fn serve_value(Path((group_name, key)): Path<(String, String)>) -> Response {
    let Some(group) = peerlon::get_group(&group_name) else {
        return (StatusCode::NOT_FOUND, format!("no such group: {group_name}")).into_response();
    };
    group.stats().server_requests.add(1);

    let mut view = ByteView::default();
    if let Err(error) = group.get(&key, &mut ByteViewSink::new(&mut view)).await {
        return (StatusCode::INTERNAL_SERVER_ERROR, error.to_string()).into_response();
    }

    let body = GetResponse {
        value: view.to_bytes(),
        minute_qps: None,
    }
    .encode_to_vec();

    ([(header::CONTENT_TYPE, "application/x-protobuf")], body).into_response()
}

/// Client side of the transport: fetches one peer's shard over HTTP.
struct HttpGetter {
    client: reqwest::Client,
    base_url: String,
}

#[async_trait]
impl ProtoGetter for HttpGetter {
    async fn get(&self, request: &GetRequest, response: &mut GetResponse) -> Result<()> {
        let url = format!(
            "{}{}/{}",
            self.base_url,
            utf8_percent_encode(&request.group, NON_ALPHANUMERIC),
            utf8_percent_encode(&request.key, NON_ALPHANUMERIC),
        );

        let reply = self.client.get(&url).send().await.map_err(Error::peer)?;
        let status = reply.status();
        if !status.is_success() {
            return Err(Error::peer(format!("peer returned {status}")));
        }

        let body = reply.bytes().await.map_err(Error::peer)?;
        *response = GetResponse::decode(body).map_err(Error::peer)?;
        Ok(())
    }
}
