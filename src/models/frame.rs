// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Fixed wire frames: the 3-byte common header that starts every packet,
//! the 4-byte CONNECT payload and the 2-byte SETPATH payload.

use bytes::Bytes;
use zerocopy::{
    BigEndian, FromBytes as ZFromBytes, Immutable, IntoBytes, KnownLayout, U16,
};

use crate::models::{header::ParseError, opcode::RawOpcode};

/// OBEX protocol version 1.1, encoded as major/minor nibbles.
pub const OBEX_VERSION: u8 = 0x10;

/// Smallest TX packet size a peer must accept.
pub const MINIMUM_MTU: u16 = 255;
/// Default packet size for both directions until CONNECT negotiates better.
pub const DEFAULT_MTU: u16 = 1024;
/// Upper bound of the 16-bit length field.
pub const MAXIMUM_MTU: u16 = u16::MAX;

/// Size of [`CommonFrame`] on the wire.
pub const FRAME_LEN: usize = 3;
/// Size of [`ConnectFrame`] on the wire.
pub const CONNECT_FRAME_LEN: usize = 4;
/// Size of [`SetPathFrame`] on the wire.
pub const SETPATH_FRAME_LEN: usize = 2;

/// Common header shared by all packets: opcode/response byte plus the total
/// packet length (which includes these three bytes).
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, ZFromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct CommonFrame {
    pub opcode: RawOpcode,
    pub len: U16<BigEndian>,
}

impl CommonFrame {
    /// Peek a common frame off the front of `buf`, if enough bytes arrived.
    pub fn peek(buf: &[u8]) -> Option<Self> {
        Self::read_from_bytes(buf.get(..FRAME_LEN)?).ok()
    }

    #[inline]
    pub fn total_len(&self) -> usize {
        usize::from(self.len.get())
    }
}

/// The non-header payload of CONNECT requests and responses.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, ZFromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct ConnectFrame {
    pub version: u8,
    pub flags: u8,
    pub mtu: U16<BigEndian>,
}

impl ConnectFrame {
    pub fn new(mtu_rx: u16) -> Self {
        Self {
            version: OBEX_VERSION,
            flags: 0x00,
            mtu: U16::new(mtu_rx),
        }
    }

    pub fn encode(&self) -> Bytes {
        Bytes::copy_from_slice(self.as_bytes())
    }

    /// Parse the four pre-header bytes of a CONNECT packet. `data` is the
    /// packet payload after the common frame.
    pub fn parse(data: &[u8]) -> Result<Self, ParseError> {
        let raw = data
            .get(..CONNECT_FRAME_LEN)
            .ok_or(ParseError::BadConnectFrame {
                available: data.len(),
            })?;
        Self::read_from_bytes(raw).map_err(|_| ParseError::BadConnectFrame {
            available: data.len(),
        })
    }
}

/// The non-header payload of SETPATH requests. Both bytes are pass-through
/// for the engine; their meaning belongs to the host.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, ZFromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct SetPathFrame {
    pub flags: u8,
    pub constants: u8,
}

impl SetPathFrame {
    pub fn new(flags: u8, constants: u8) -> Self {
        Self { flags, constants }
    }

    pub fn encode(&self) -> Bytes {
        Bytes::copy_from_slice(self.as_bytes())
    }

    pub fn parse(data: &[u8]) -> Option<Self> {
        Self::read_from_bytes(data.get(..SETPATH_FRAME_LEN)?).ok()
    }
}
