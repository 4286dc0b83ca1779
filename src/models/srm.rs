// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Single-Response-Mode wait flags.
//!
//! The SRMP header byte maps onto two independent wait bits. The mapping
//! is mirrored between the sending and the receiving side: a parameter
//! asking the peer to wait tells us to keep sending, and vice versa.

use bitflags::bitflags;

/// Value of the SRM header that enables single response mode.
pub const SRM_ENABLE: u8 = 0x01;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SrmFlags: u8 {
        /// Wait for a local event before sending the next packet.
        const WAIT_LOCAL = 1 << 0;
        /// Wait for a remote packet before sending.
        const WAIT_REMOTE = 1 << 1;
    }
}

/// Decode an SRMP byte found in a packet we are sending.
pub fn decode_tx(flag: u8) -> SrmFlags {
    match flag {
        0x00 => SrmFlags::WAIT_LOCAL,
        0x01 => SrmFlags::WAIT_REMOTE,
        0x02 => SrmFlags::WAIT_LOCAL | SrmFlags::WAIT_REMOTE,
        _ => SrmFlags::empty(),
    }
}

/// Decode an SRMP byte found in a packet we received.
pub fn decode_rx(flag: u8) -> SrmFlags {
    match flag {
        0x00 => SrmFlags::WAIT_REMOTE,
        0x01 => SrmFlags::WAIT_LOCAL,
        0x02 => SrmFlags::WAIT_LOCAL | SrmFlags::WAIT_REMOTE,
        _ => SrmFlags::empty(),
    }
}
