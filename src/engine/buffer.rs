// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The single RX / TX byte accumulator used by the engine.
//!
//! Packets are appended at the tail and consumed from the head; the buffer
//! is reused across transactions. Growth happens in page-sized steps so
//! repeated small appends stay amortized.

use bytes::{BufMut, BytesMut};

const PAGE: usize = 4096;

#[derive(Debug, Default)]
pub struct PacketBuf {
    inner: BytesMut,
}

impl PacketBuf {
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            inner: BytesMut::with_capacity(cap),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.inner
    }

    /// Append bytes, growing by at least one page when out of capacity.
    pub fn append(&mut self, data: &[u8]) {
        if self.inner.capacity() - self.inner.len() < data.len() {
            let grow = data.len().next_multiple_of(PAGE);
            self.inner.reserve(grow);
        }
        self.inner.put_slice(data);
    }

    /// Append `n` zero bytes and return the offset they start at. Used to
    /// reserve the common frame before its final values are known.
    pub fn reserve(&mut self, n: usize) -> usize {
        let off = self.inner.len();
        if self.inner.capacity() - off < n {
            self.inner.reserve(n.next_multiple_of(PAGE));
        }
        self.inner.put_bytes(0, n);
        off
    }

    /// Overwrite previously reserved bytes at `off`.
    pub fn put_at(&mut self, off: usize, data: &[u8]) {
        self.inner[off..off + data.len()].copy_from_slice(data);
    }

    /// Drop `n` bytes from the head.
    pub fn pull(&mut self, n: usize) {
        let n = n.min(self.inner.len());
        let _ = self.inner.split_to(n);
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.inner.clear();
    }

    /// Hand out a writable tail of at least `n` bytes; commit with the
    /// actually filled count.
    pub fn read_in<F>(&mut self, n: usize, fill: F) -> std::io::Result<usize>
    where F: FnOnce(&mut [u8]) -> std::io::Result<usize> {
        let old = self.inner.len();
        self.inner.resize(old + n, 0);
        let got = fill(&mut self.inner[old..old + n]);
        match got {
            Ok(actual) => {
                self.inner.truncate(old + actual);
                Ok(actual)
            },
            Err(e) => {
                self.inner.truncate(old);
                Err(e)
            },
        }
    }
}
