// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Receive-side body handling.
//!
//! A request or response body arrives as a series of Body fragments closed
//! by an End-of-Body fragment. The host either lets the engine collect them
//! into one buffer (the default) or asks for per-fragment `StreamAvail`
//! delivery, in which case nothing is retained.

use bytes::{Bytes, BytesMut};

/// Accumulator behind the buffered receive strategy.
#[derive(Debug, Default)]
pub struct BufferedBody {
    acc: Option<BytesMut>,
}

impl BufferedBody {
    /// Append one fragment, sizing the buffer from the Length hint when it
    /// is the first one.
    pub fn push(&mut self, data: &[u8], hint: usize) {
        let acc = self
            .acc
            .get_or_insert_with(|| BytesMut::with_capacity(hint.max(data.len())));
        acc.extend_from_slice(data);
    }

    /// Whether any fragment has been collected yet.
    #[inline]
    pub fn started(&self) -> bool {
        self.acc.is_some()
    }

    /// Close the accumulator and hand back the complete payload.
    pub fn take(&mut self) -> Bytes {
        self.acc.take().map(BytesMut::freeze).unwrap_or_default()
    }
}

/// How inbound Body fragments are delivered to the host.
#[derive(Debug)]
pub enum BodySink {
    /// Collect fragments; a single Body header lands on the RX list at
    /// End-of-Body.
    Buffered(BufferedBody),
    /// Emit `StreamAvail` per fragment; data not read during the event is
    /// lost.
    Streamed,
}

impl Default for BodySink {
    fn default() -> Self {
        Self::Buffered(BufferedBody::default())
    }
}

impl BodySink {
    #[inline]
    pub fn is_streamed(&self) -> bool {
        matches!(self, Self::Streamed)
    }

    #[inline]
    pub fn started(&self) -> bool {
        match self {
            Self::Buffered(b) => b.started(),
            Self::Streamed => false,
        }
    }
}
