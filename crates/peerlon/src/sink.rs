// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Value receivers that deliver a loaded value in the caller's preferred shape.
//!
//! A [`Sink`] is handed to [`Group::get`](crate::Group::get) and filled in by
//! whichever path produces the value: the local cache, a peer reply, or the
//! backend getter. Each variant marshals into a different destination (string,
//! view, decoded message, byte vector) while also retaining a [`ByteView`] of
//! the value for the engine to cache, with as few copies as the destination
//! allows.

use std::str;

use prost::Message;

use crate::error::Result;
use crate::view::ByteView;

/// Receives the value produced by a read.
///
/// A backend getter must call exactly one setter on success. Repeated sets are
/// tolerated — the last write wins — which allows a sink to be reused across a
/// failed attempt and its retry.
///
/// The trait is object-safe; the engine works through `&mut dyn Sink`. Setting
/// a typed message goes through [`SinkExt::set_proto`], which encodes on the
/// caller's side of the object boundary.
pub trait Sink: Send {
    /// Sets the value to `s`.
    fn set_string(&mut self, s: &str) -> Result<()>;

    /// Sets the value to a copy of `b`. The caller retains ownership of `b`.
    fn set_bytes(&mut self, b: &[u8]) -> Result<()>;

    /// Sets the value to an already-encoded message body, taking ownership of
    /// the buffer.
    ///
    /// This is the delivery path for [`SinkExt::set_proto`]; variants override
    /// it to keep the buffer instead of re-copying it.
    fn set_encoded(&mut self, body: Vec<u8>) -> Result<()> {
        self.set_bytes(&body)
    }

    /// Delivers an existing view into the sink.
    ///
    /// Variants that can absorb a view without copying override this; the
    /// default forwards to [`set_string`](Self::set_string) or
    /// [`set_bytes`](Self::set_bytes) according to the view's representation.
    fn set_view(&mut self, view: ByteView) -> Result<()> {
        match view.as_text() {
            Some(text) => self.set_string(text),
            None => self.set_bytes(view.as_slice()),
        }
    }

    /// Returns the frozen view of the value for the engine to cache.
    ///
    /// Reading the view of a sink that was never set yields an empty view.
    fn view(&self) -> Result<ByteView>;
}

/// Setter methods that are generic over the message type.
///
/// Blanket-implemented for every [`Sink`], including `dyn Sink`.
pub trait SinkExt: Sink {
    /// Sets the value to the encoded form of `message`. The caller retains
    /// ownership of `message`.
    fn set_proto<M: Message>(&mut self, message: &M) -> Result<()> {
        self.set_encoded(message.encode_to_vec())
    }
}

impl<S: Sink + ?Sized> SinkExt for S {}

/// Sink that populates a caller-provided `String`.
///
/// Byte payloads must be valid UTF-8; anything else fails with
/// [`Error::Utf8`](crate::Error::Utf8).
#[derive(Debug)]
pub struct StringSink<'a> {
    dst: &'a mut String,
    view: ByteView,
}

impl<'a> StringSink<'a> {
    /// Creates a sink that writes into `dst`.
    pub fn new(dst: &'a mut String) -> Self {
        Self {
            dst,
            view: ByteView::default(),
        }
    }
}

impl Sink for StringSink<'_> {
    fn set_string(&mut self, s: &str) -> Result<()> {
        self.view = ByteView::from_text(s);
        self.dst.clear();
        self.dst.push_str(s);
        Ok(())
    }

    fn set_bytes(&mut self, b: &[u8]) -> Result<()> {
        self.set_string(str::from_utf8(b)?)
    }

    fn view(&self) -> Result<ByteView> {
        Ok(self.view.clone())
    }
}

/// Sink that populates a caller-provided [`ByteView`].
///
/// This is the cheapest sink: a cached view is moved in without any copy.
#[derive(Debug)]
pub struct ByteViewSink<'a> {
    dst: &'a mut ByteView,
}

impl<'a> ByteViewSink<'a> {
    /// Creates a sink that writes into `dst`.
    pub fn new(dst: &'a mut ByteView) -> Self {
        Self { dst }
    }
}

impl Sink for ByteViewSink<'_> {
    fn set_string(&mut self, s: &str) -> Result<()> {
        *self.dst = ByteView::from_text(s);
        Ok(())
    }

    fn set_bytes(&mut self, b: &[u8]) -> Result<()> {
        *self.dst = ByteView::from(b);
        Ok(())
    }

    fn set_encoded(&mut self, body: Vec<u8>) -> Result<()> {
        *self.dst = ByteView::from_bytes(body);
        Ok(())
    }

    fn set_view(&mut self, view: ByteView) -> Result<()> {
        *self.dst = view;
        Ok(())
    }

    fn view(&self) -> Result<ByteView> {
        Ok(self.dst.clone())
    }
}

/// Sink that decodes the value into a caller-provided message.
///
/// The encoded bytes are retained as the cached view, so the value round-trips
/// to peers without re-encoding.
#[derive(Debug)]
pub struct ProtoSink<'a, M> {
    dst: &'a mut M,
    view: ByteView,
}

impl<'a, M: Message + Default> ProtoSink<'a, M> {
    /// Creates a sink that decodes into `dst`.
    pub fn new(dst: &'a mut M) -> Self {
        Self {
            dst,
            view: ByteView::default(),
        }
    }
}

impl<M: Message + Default> Sink for ProtoSink<'_, M> {
    fn set_string(&mut self, s: &str) -> Result<()> {
        *self.dst = M::decode(s.as_bytes())?;
        self.view = ByteView::from(s.as_bytes());
        Ok(())
    }

    fn set_bytes(&mut self, b: &[u8]) -> Result<()> {
        *self.dst = M::decode(b)?;
        self.view = ByteView::from(b);
        Ok(())
    }

    fn set_encoded(&mut self, body: Vec<u8>) -> Result<()> {
        *self.dst = M::decode(body.as_slice())?;
        self.view = ByteView::from_bytes(body);
        Ok(())
    }

    fn view(&self) -> Result<ByteView> {
        Ok(self.view.clone())
    }
}

/// Sink that allocates a byte vector for the value and assigns it to `dst`.
///
/// The destination never aliases the cached view: `set_bytes` copies twice,
/// once for the destination and once for the view.
#[derive(Debug)]
pub struct AllocatingByteSliceSink<'a> {
    dst: &'a mut Vec<u8>,
    view: ByteView,
}

impl<'a> AllocatingByteSliceSink<'a> {
    /// Creates a sink that writes into `dst`.
    pub fn new(dst: &'a mut Vec<u8>) -> Self {
        Self {
            dst,
            view: ByteView::default(),
        }
    }
}

impl Sink for AllocatingByteSliceSink<'_> {
    fn set_string(&mut self, s: &str) -> Result<()> {
        *self.dst = s.as_bytes().to_vec();
        self.view = ByteView::from_text(s);
        Ok(())
    }

    fn set_bytes(&mut self, b: &[u8]) -> Result<()> {
        self.set_encoded(b.to_vec())
    }

    fn set_encoded(&mut self, body: Vec<u8>) -> Result<()> {
        *self.dst = body.clone();
        self.view = ByteView::from_bytes(body);
        Ok(())
    }

    fn set_view(&mut self, view: ByteView) -> Result<()> {
        *self.dst = view.to_vec();
        self.view = view;
        Ok(())
    }

    fn view(&self) -> Result<ByteView> {
        Ok(self.view.clone())
    }
}

/// Sink that writes at most the destination's current length.
///
/// Longer values are silently truncated in the destination (the cached view
/// still holds the full value); shorter values shrink the destination to fit.
#[derive(Debug)]
pub struct TruncatingByteSliceSink<'a> {
    dst: &'a mut Vec<u8>,
    view: ByteView,
}

impl<'a> TruncatingByteSliceSink<'a> {
    /// Creates a sink whose capacity is the current length of `dst`.
    pub fn new(dst: &'a mut Vec<u8>) -> Self {
        Self {
            dst,
            view: ByteView::default(),
        }
    }

    fn fill(&mut self, b: &[u8]) {
        let n = b.len().min(self.dst.len());
        self.dst[..n].copy_from_slice(&b[..n]);
        self.dst.truncate(n);
    }
}

impl Sink for TruncatingByteSliceSink<'_> {
    fn set_string(&mut self, s: &str) -> Result<()> {
        self.fill(s.as_bytes());
        self.view = ByteView::from_text(s);
        Ok(())
    }

    fn set_bytes(&mut self, b: &[u8]) -> Result<()> {
        self.fill(b);
        self.view = ByteView::from(b);
        Ok(())
    }

    fn set_encoded(&mut self, body: Vec<u8>) -> Result<()> {
        self.fill(&body);
        self.view = ByteView::from_bytes(body);
        Ok(())
    }

    fn view(&self) -> Result<ByteView> {
        Ok(self.view.clone())
    }
}
