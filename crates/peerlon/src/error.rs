// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Error types for cache operations.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

/// A specialized [`Result`] type for cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// An error surfaced by a group read.
///
/// Errors are `Clone` because a single load may be shared by many concurrent
/// callers: whichever caller performs the work stores one error, and every
/// waiter receives its own handle to it.
#[derive(Clone, Debug, thiserror::Error)]
pub enum Error {
    /// The backend getter failed; the cause is forwarded verbatim.
    #[error("backend getter failed")]
    Loader(#[source] SharedCause),

    /// A peer fetch failed: connection error, non-OK status, or an undecodable
    /// reply. The engine normally swallows these and retries locally; one
    /// surfaces only when the local retry fails too, or from a transport used
    /// directly.
    #[error("peer fetch failed")]
    Peer(#[source] SharedCause),

    /// A message body could not be decoded.
    #[error("malformed message")]
    Decode(#[from] prost::DecodeError),

    /// A byte payload was delivered into a string-shaped destination but is
    /// not valid UTF-8.
    #[error("value is not valid UTF-8")]
    Utf8(#[from] std::str::Utf8Error),
}

impl Error {
    /// Wraps a backend getter failure.
    pub fn loader(cause: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self::Loader(SharedCause::new(cause))
    }

    /// Wraps a peer transport failure.
    pub fn peer(cause: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self::Peer(SharedCause::new(cause))
    }
}

/// A clonable handle to an arbitrary underlying error.
#[derive(Clone)]
pub struct SharedCause(Arc<dyn StdError + Send + Sync>);

impl SharedCause {
    fn new(cause: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self(Arc::from(cause.into()))
    }

    /// Returns the underlying error as type `T` if it matches.
    #[must_use]
    pub fn downcast_ref<T: StdError + 'static>(&self) -> Option<&T> {
        self.0.downcast_ref()
    }
}

impl fmt::Display for SharedCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Debug for SharedCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl StdError for SharedCause {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.0.source()
    }
}
