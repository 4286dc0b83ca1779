// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Helpers for encoding / decoding the very first byte of every OBEX
//! packet.
//!
//! The byte layout is defined by the IrDA OBEX specification:
//!
//! ```text
//!  7   6   5   4   3   2   1   0      bit position
//! +---+---------------------------+
//! | F |       OPCODE (7 bits)     |  ← first packet octet
//! +---+---------------------------+
//! ```
//!
//! * **F** – *Final* flag. Marks the last packet of a request (client) or
//!   of a response (server, where it is always set).
//! * **OPCODE** – operation code on requests, response code on responses.
//!
//! The utilities below allow you to
//!
//! * split the raw byte into a pair `(final, Opcode)` (`TryFrom<u8>`)
//! * merge a pair back into the raw byte (`From<&PacketOpcode> for u8`).

use core::fmt;
use std::convert::TryFrom;

use thiserror::Error;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Mask that selects the lower 7 bits (**OPCODE**) from the first octet.
pub const OPCODE_MASK: u8 = 0b0111_1111;
/// Mask that selects the top bit (**F**) from the first octet.
pub const FINAL_MASK: u8 = 0b1000_0000;

/// All command op-codes defined by OBEX 1.1 + SRM.
#[repr(u8)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    #[default]
    Connect = 0x00,
    Disconnect = 0x01,
    Put = 0x02,
    Get = 0x03,
    /* 0x04 reserved */
    SetPath = 0x05,
    /* 0x06 reserved */
    Session = 0x07,
    /* 0x08–0x7E reserved */
    Abort = 0x7F,
}

impl Opcode {
    #[inline]
    pub fn from_u7(v: u8) -> Option<Self> {
        Some(match v {
            0x00 => Self::Connect,
            0x01 => Self::Disconnect,
            0x02 => Self::Put,
            0x03 => Self::Get,
            0x05 => Self::SetPath,
            0x07 => Self::Session,
            0x7F => Self::Abort,
            _ => return None,
        })
    }
}

/// Returned when the lower seven bits contain an undefined op-code.
#[derive(Debug, Error)]
#[error("invalid opcode: 0x{0:02x}")]
pub struct UnknownOpcode(pub u8);

/// Typed representation of the very first packet byte.
///
/// * `final_bit` – high-order **F** bit.
/// * `opcode` – command op-code.
#[derive(Debug, PartialEq, Eq, Default)]
#[repr(C)]
pub struct PacketOpcode {
    pub final_bit: bool,
    pub opcode: Opcode,
}

impl TryFrom<u8> for PacketOpcode {
    type Error = UnknownOpcode;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        let final_bit = (byte & FINAL_MASK) != 0;
        let code = byte & OPCODE_MASK;
        let opcode = Opcode::from_u7(code).ok_or(UnknownOpcode(code))?;
        Ok(Self { final_bit, opcode })
    }
}

impl From<&PacketOpcode> for u8 {
    fn from(b: &PacketOpcode) -> u8 {
        let mut raw = b.opcode as u8;
        if b.final_bit {
            raw |= FINAL_MASK;
        }
        raw
    }
}

/// Wire-safe, zero-copy first packet octet.
/// Transparent over `u8`, so it can live inside a zerocopy frame struct.
#[repr(transparent)]
#[derive(Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct RawOpcode(u8);

impl RawOpcode {
    #[inline]
    pub const fn raw(&self) -> u8 {
        self.0
    }

    #[inline]
    pub const fn from_raw(v: u8) -> Self {
        Self(v)
    }

    // Flags
    #[inline]
    pub const fn is_final(&self) -> bool {
        (self.0 & FINAL_MASK) != 0
    }

    #[inline]
    pub fn set_final(&mut self) {
        self.0 |= FINAL_MASK
    }

    // Opcode (lower 7 bits)
    #[inline]
    pub const fn opcode_raw(&self) -> u8 {
        self.0 & OPCODE_MASK
    }

    #[inline]
    pub fn set_opcode_raw(&mut self, v: u8) {
        self.0 = (self.0 & !OPCODE_MASK) | (v & OPCODE_MASK)
    }

    #[inline]
    pub fn opcode_known(&self) -> Option<Opcode> {
        Opcode::from_u7(self.opcode_raw())
    }

    #[inline]
    pub fn set_opcode_known(&mut self, k: Opcode) {
        self.set_opcode_raw(k as u8);
    }
}

impl fmt::Debug for RawOpcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match PacketOpcode::try_from(self.0) {
            Ok(op) => {
                let mut tmp = f.debug_struct("RawOpcode");
                if op.final_bit {
                    tmp.field("F", &op.final_bit);
                }
                tmp.field("opcode", &op.opcode).finish()
            },
            Err(_) => {
                let mut tmp = f.debug_struct("RawOpcode");
                if self.is_final() {
                    tmp.field("F", &self.is_final());
                }
                tmp.field("opcode_raw", &format_args!("0x{:02X}", self.opcode_raw()))
                    .finish()
            },
        }
    }
}
