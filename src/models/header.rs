// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! OBEX header model.
//!
//! A header id byte carries its encoding class in the top two bits and the
//! actual 6-bit id in the lower six:
//!
//! ```text
//! 0x00  null-terminated UTF-16BE text with a 2-byte length prefix
//! 0x40  byte sequence with a 2-byte length prefix
//! 0x80  single byte value
//! 0xC0  4-byte big-endian value
//! ```
//!
//! During receive, headers are first borrowed views into the RX accumulator
//! ([`HeaderView`]) and become owning [`Header`]s only when moved onto an
//! object's RX list. On the TX side a header payload is either an owned
//! buffer or a host-fed stream source; the two variants share a small
//! v-table via `enum_dispatch`.

use bitflags::bitflags;
use bytes::Bytes;
use enum_dispatch::enum_dispatch;
use thiserror::Error;

use crate::engine::buffer::PacketBuf;

/// Mask that selects the 6-bit header id.
pub const HDR_ID_MASK: u8 = 0x3F;
/// Mask that selects the 2-bit encoding class.
pub const HDR_TYPE_MASK: u8 = 0xC0;

/// Smallest useful payload slice of a split header.
const MIN_DATA_SIZE: usize = 1;

/// Header encoding class, from the top two bits of the id byte.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderType {
    Unicode = 0x00,
    Bytes = 0x40,
    U8 = 0x80,
    U32 = 0xC0,
}

impl HeaderType {
    #[inline]
    pub const fn from_id_byte(byte: u8) -> Self {
        match byte & HDR_TYPE_MASK {
            0x00 => Self::Unicode,
            0x40 => Self::Bytes,
            0x80 => Self::U8,
            _ => Self::U32,
        }
    }

    /// Size of the encoded header prefix: id byte only for fixed-width
    /// values, id byte + 2-byte length for the variable-width classes.
    #[inline]
    pub const fn prefix_len(self) -> usize {
        match self {
            Self::U8 | Self::U32 => 1,
            Self::Bytes | Self::Unicode => 3,
        }
    }
}

/// A full header id byte: encoding class | 6-bit id.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct RawHeaderId(u8);

impl RawHeaderId {
    pub const COUNT: Self = Self(0xC0);
    pub const NAME: Self = Self(0x01);
    pub const TYPE: Self = Self(0x42);
    pub const LENGTH: Self = Self(0xC3);
    pub const TIME: Self = Self(0x44);
    pub const DESCRIPTION: Self = Self(0x05);
    pub const TARGET: Self = Self(0x46);
    pub const BODY: Self = Self(0x48);
    pub const BODY_END: Self = Self(0x49);
    pub const WHO: Self = Self(0x4A);
    pub const CONNECTION_ID: Self = Self(0xCB);
    pub const APP_PARAM: Self = Self(0x4C);
    pub const AUTH_CHALLENGE: Self = Self(0x4D);
    pub const AUTH_RESPONSE: Self = Self(0x4E);
    pub const OBJECT_CLASS: Self = Self(0x4F);
    pub const SESSION_PARAM: Self = Self(0x52);
    pub const SESSION_SEQ: Self = Self(0x93);
    pub const ACTION_ID: Self = Self(0x94);
    pub const DEST_NAME: Self = Self(0x15);
    pub const PERMISSIONS: Self = Self(0xD6);
    pub const SRM: Self = Self(0x97);
    pub const SRM_FLAGS: Self = Self(0x98);

    /// 6-bit id of the Body / End-of-Body pair.
    pub const BODY_ID: u8 = 0x08;
    pub const BODY_END_ID: u8 = 0x09;

    #[inline]
    pub const fn from_raw(byte: u8) -> Self {
        Self(byte)
    }

    #[inline]
    pub const fn raw(self) -> u8 {
        self.0
    }

    #[inline]
    pub const fn id(self) -> u8 {
        self.0 & HDR_ID_MASK
    }

    #[inline]
    pub const fn hdr_type(self) -> HeaderType {
        HeaderType::from_id_byte(self.0)
    }

    #[inline]
    pub const fn is_body(self) -> bool {
        self.id() == Self::BODY_ID || self.id() == Self::BODY_END_ID
    }

    /// Bit position of this id inside a 64-bit header filter.
    #[inline]
    pub const fn filter_bit(self) -> u64 {
        1u64 << self.id()
    }
}

impl std::fmt::Debug for RawHeaderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RawHeaderId(0x{:02X})", self.0)
    }
}

/// Filter matching Body and End-of-Body.
pub const BODY_FILTER: u64 =
    (1u64 << RawHeaderId::BODY_ID) | (1u64 << RawHeaderId::BODY_END_ID);

bitflags! {
    /// Flags accepted by `Object::add_header`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct HeaderFlags: u32 {
        /// Fail if this header would not fit in one outbound packet
        /// together with everything already queued.
        const FIT_ONE_PACKET = 1 << 0;
        /// Begin a host-fed body stream.
        const STREAM_START = 1 << 1;
        /// Feed the next chunk into the active body stream.
        const STREAM_DATA = 1 << 2;
        /// Feed the final chunk and mark the stream finished.
        const STREAM_DATA_END = 1 << 3;
        /// Suspend the object once this header has fully left the queue.
        const SUSPEND = 1 << 4;
    }
}

/// Errors raised while decoding inbound packets.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("header at offset {offset} declares {declared} bytes but only {available} remain")]
    TruncatedHeader {
        offset: usize,
        declared: usize,
        available: usize,
    },
    #[error("packet of {available} bytes is shorter than its pre-header data")]
    ShortPacket { available: usize },
    #[error("CONNECT frame requires 4 bytes, got {available}")]
    BadConnectFrame { available: usize },
    #[error("command 0x{got:02x} does not match the in-flight command 0x{expected:02x}")]
    CommandMismatch { expected: u8, got: u8 },
    #[error("unknown command opcode 0x{0:02x}")]
    UnknownCommand(u8),

    #[error("unexpected payload during a CONNECT exchange")]
    UnexpectedConnectData,
}

/// Operations every TX payload variant supports.
#[enum_dispatch]
pub trait PayloadOps {
    /// Bytes still to be sent.
    fn remaining(&self) -> usize;

    /// View of the unsent bytes.
    fn pending(&self) -> &[u8];

    /// Consume `n` sent bytes.
    fn advance(&mut self, n: usize);

    /// Nothing further will ever arrive for this payload.
    fn eos_pending(&self) -> bool;
}

/// An owned payload; sent once, possibly split over several packets.
#[derive(Debug, Clone, Default)]
pub struct MemBufPayload {
    data: Bytes,
    offset: usize,
}

impl MemBufPayload {
    pub fn new(data: Bytes) -> Self {
        Self { data, offset: 0 }
    }

    /// The complete payload, ignoring send progress. RX-side accessor.
    #[inline]
    pub fn full(&self) -> &[u8] {
        &self.data
    }
}

impl PayloadOps for MemBufPayload {
    #[inline]
    fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    #[inline]
    fn pending(&self) -> &[u8] {
        &self.data[self.offset..]
    }

    #[inline]
    fn advance(&mut self, n: usize) {
        self.offset = (self.offset + n).min(self.data.len());
    }

    #[inline]
    fn eos_pending(&self) -> bool {
        true
    }
}

/// A host-fed payload: bytes are attached chunk by chunk in response to
/// `StreamEmpty` events and the end is signalled explicitly.
#[derive(Debug, Clone, Default)]
pub struct StreamPayload {
    chunk: Bytes,
    offset: usize,
    finished: bool,
}

impl StreamPayload {
    pub fn set_chunk(&mut self, data: Bytes) {
        self.chunk = data;
        self.offset = 0;
    }

    pub fn finish(&mut self) {
        self.finished = true;
    }

    #[inline]
    pub fn is_marked_finished(&self) -> bool {
        self.finished
    }
}

impl PayloadOps for StreamPayload {
    #[inline]
    fn remaining(&self) -> usize {
        self.chunk.len() - self.offset
    }

    #[inline]
    fn pending(&self) -> &[u8] {
        &self.chunk[self.offset..]
    }

    #[inline]
    fn advance(&mut self, n: usize) {
        self.offset = (self.offset + n).min(self.chunk.len());
    }

    #[inline]
    fn eos_pending(&self) -> bool {
        self.finished
    }
}

#[enum_dispatch(PayloadOps)]
#[derive(Debug, Clone)]
pub enum HeaderPayload {
    MemBuf(MemBufPayload),
    Stream(StreamPayload),
}

impl Default for HeaderPayload {
    fn default() -> Self {
        Self::MemBuf(MemBufPayload::default())
    }
}

/// An owning header, either queued for TX or parked on an object's RX list.
#[derive(Debug, Clone)]
pub struct Header {
    id: RawHeaderId,
    payload: HeaderPayload,
    flags: HeaderFlags,
}

impl Header {
    pub fn new(id: RawHeaderId, data: Bytes, flags: HeaderFlags) -> Self {
        Self {
            id,
            payload: HeaderPayload::MemBuf(MemBufPayload::new(data)),
            flags,
        }
    }

    pub fn new_stream(flags: HeaderFlags) -> Self {
        Self {
            id: RawHeaderId::BODY,
            payload: HeaderPayload::Stream(StreamPayload::default()),
            flags,
        }
    }

    #[inline]
    pub fn id(&self) -> RawHeaderId {
        self.id
    }

    #[inline]
    pub fn flags(&self) -> HeaderFlags {
        self.flags
    }

    #[inline]
    pub fn payload(&self) -> &HeaderPayload {
        &self.payload
    }

    #[inline]
    pub fn payload_mut(&mut self) -> &mut HeaderPayload {
        &mut self.payload
    }

    /// Only a Body byte-sequence may be split across packets.
    #[inline]
    pub fn is_splittable(&self) -> bool {
        self.id.is_body() && self.id.hdr_type() == HeaderType::Bytes
    }

    /// Encoded size of what is left to send: prefix + unsent payload.
    #[inline]
    pub fn on_wire_size(&self) -> usize {
        self.id.hdr_type().prefix_len() + self.payload.remaining()
    }

    /// Fully drained, nothing more will follow.
    #[inline]
    pub fn is_finished(&self) -> bool {
        self.payload.remaining() == 0 && self.payload.eos_pending()
    }

    /// First unsent payload byte, if any. Used to pick SRM parameters out
    /// of a header just before it is serialized.
    #[inline]
    pub fn peek_first(&self) -> Option<u8> {
        self.payload.pending().first().copied()
    }

    /// RX-side accessors. These look at the whole payload, not the unsent
    /// remainder.
    pub fn bytes(&self) -> &[u8] {
        match &self.payload {
            HeaderPayload::MemBuf(b) => b.full(),
            HeaderPayload::Stream(s) => s.pending(),
        }
    }

    pub fn as_u8(&self) -> Option<u8> {
        self.bytes().first().copied()
    }

    pub fn as_u32(&self) -> Option<u32> {
        let raw: [u8; 4] = self.bytes().get(..4)?.try_into().ok()?;
        Some(u32::from_be_bytes(raw))
    }

    pub fn as_unicode(&self) -> Option<String> {
        crate::utils::decode_unicode(self.bytes())
    }

    /// Serialize as much of this header as fits into `budget` bytes of
    /// `buf`. Returns the number of bytes appended; zero means the header
    /// does not fit and the caller should finish the packet first.
    ///
    /// A Body payload that is drained by this call is emitted with the
    /// End-of-Body id once no further bytes can arrive; intermediate
    /// fragments keep the Body id. Fixed-width values shorter than their
    /// width are zero-padded to stay on protocol.
    pub fn append_into(&mut self, buf: &mut PacketBuf, budget: usize) -> usize {
        let prefix = self.id.hdr_type().prefix_len();
        let remaining = self.payload.remaining();

        if (prefix + remaining > budget && !self.is_splittable())
            || prefix + MIN_DATA_SIZE > budget
        {
            return 0;
        }

        let take = match self.id.hdr_type() {
            HeaderType::U8 => remaining.min(1),
            HeaderType::U32 => remaining.min(4),
            HeaderType::Bytes | HeaderType::Unicode => {
                if remaining > budget - prefix {
                    budget - prefix
                } else {
                    remaining
                }
            },
        };

        let drained = remaining == take;
        let wire_id = if self.id.is_body() && drained && self.payload.eos_pending() {
            RawHeaderId::BODY_END.raw()
        } else if self.id.is_body() {
            RawHeaderId::BODY.raw()
        } else {
            self.id.raw()
        };

        // Emitted data width: fixed types always carry their full width,
        // padded with zeroes when the payload runs short.
        let emitted = match self.id.hdr_type() {
            HeaderType::U8 => 1,
            HeaderType::U32 => 4,
            _ => take,
        };
        let total = prefix + emitted;
        if total > budget {
            return 0;
        }

        buf.append(&[wire_id]);
        if prefix == 3 {
            buf.append(&(total as u16).to_be_bytes());
        }
        if take > 0 {
            buf.append(&self.payload.pending()[..take]);
        }
        for _ in take..emitted {
            buf.append(&[0]);
        }
        self.payload.advance(take);

        total
    }
}

/// A borrowed header parsed out of the RX accumulator. Valid only until
/// the accumulator is cleared; clone into a [`Header`] to keep it.
#[derive(Debug, Clone, Copy)]
pub struct HeaderView<'a> {
    pub id: RawHeaderId,
    pub data: &'a [u8],
}

impl<'a> HeaderView<'a> {
    /// Parse one header off the front of `buf`. `offset` is only used for
    /// error reporting. Returns the view and the number of consumed bytes.
    pub fn parse(buf: &'a [u8], offset: usize) -> Result<(Self, usize), ParseError> {
        let err = |declared: usize| ParseError::TruncatedHeader {
            offset,
            declared,
            available: buf.len(),
        };

        let id_byte = *buf.first().ok_or_else(|| err(1))?;
        let id = RawHeaderId::from_raw(id_byte);
        match id.hdr_type() {
            HeaderType::U8 => {
                let data = buf.get(1..2).ok_or_else(|| err(2))?;
                Ok((Self { id, data }, 2))
            },
            HeaderType::U32 => {
                let data = buf.get(1..5).ok_or_else(|| err(5))?;
                Ok((Self { id, data }, 5))
            },
            HeaderType::Bytes | HeaderType::Unicode => {
                let raw_len = buf.get(1..3).ok_or_else(|| err(3))?;
                let declared = usize::from(u16::from_be_bytes([raw_len[0], raw_len[1]]));
                if declared < 3 || declared > buf.len() {
                    return Err(err(declared));
                }
                let data = &buf[3..declared];
                Ok((Self { id, data }, declared))
            },
        }
    }

    #[inline]
    pub fn as_u32(&self) -> Option<u32> {
        let raw: [u8; 4] = self.data.get(..4)?.try_into().ok()?;
        Some(u32::from_be_bytes(raw))
    }

    #[inline]
    pub fn first_byte(&self) -> Option<u8> {
        self.data.first().copied()
    }

    /// Materialize an owning copy for the RX header list. End-of-Body
    /// collapses onto the logical Body id.
    pub fn to_owned_header(&self) -> Header {
        let id = if self.id.id() == RawHeaderId::BODY_END_ID {
            RawHeaderId::BODY
        } else {
            self.id
        };
        Header::new(
            id,
            Bytes::copy_from_slice(self.data),
            HeaderFlags::empty(),
        )
    }
}
