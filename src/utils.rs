// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

/// Encode a string the way OBEX name-like headers carry it: UTF-16
/// big-endian with a trailing U+0000 terminator.
pub fn encode_unicode(s: &str) -> Bytes {
    let mut out = BytesMut::with_capacity((s.len() + 1) * 2);
    for unit in s.encode_utf16() {
        out.put_u16(unit);
    }
    out.put_u16(0);
    out.freeze()
}

/// Decode a UTF-16 big-endian header payload, tolerating a trailing
/// U+0000 terminator. Returns `None` on odd length or invalid UTF-16.
pub fn decode_unicode(data: &[u8]) -> Option<String> {
    if data.len() % 2 != 0 {
        return None;
    }
    let mut units = data
        .chunks_exact(2)
        .map(|c| u16::from_be_bytes([c[0], c[1]]))
        .collect::<Vec<_>>();
    if units.last() == Some(&0) {
        units.pop();
    }
    String::from_utf16(&units).ok()
}

pub struct HexPreview<'a>(pub &'a [u8]);

impl<'a> fmt::Debug for HexPreview<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const MAX: usize = 128;
        let slice = if self.0.len() > MAX {
            &self.0[..MAX]
        } else {
            self.0
        };
        let mut first = true;
        write!(f, "\"")?;
        for b in slice {
            if !first {
                write!(f, " ")?;
            }
            write!(f, "{b:02x}")?;
            first = false;
        }
        if self.0.len() > MAX {
            write!(f, " ... (+{} bytes)", self.0.len() - MAX)?;
        }
        write!(f, "\"")
    }
}
