// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The OBEX transaction unit.
//!
//! An [`Object`] carries one command, the headers queued for transmission,
//! the headers received so far and the transaction's progress flags. A
//! client builds an object and submits it; a server engine creates one per
//! inbound request and lets the host fill in the response during events.

pub mod body;

use std::collections::VecDeque;

use bytes::Bytes;

use crate::{
    engine::error::ObexError,
    models::{
        event::RspMode,
        frame::FRAME_LEN,
        header::{Header, HeaderFlags, HeaderPayload, PayloadOps, RawHeaderId},
        opcode::{FINAL_MASK, Opcode},
        response::ResponseCode,
    },
    object::body::BodySink,
};

#[derive(Debug)]
pub struct Object {
    pub(crate) cmd: Opcode,
    /// Opcode byte used on non-final packets: the command for a client,
    /// the intermediate response code for a server.
    pub(crate) opcode: u8,
    /// Opcode byte substituted on the final packet of the transaction.
    pub(crate) lastopcode: u8,

    pub(crate) tx_headerq: VecDeque<Header>,
    pub(crate) tx_pre: Option<Bytes>,

    pub(crate) rx_headers: Vec<Header>,
    pub(crate) rx_pre: Bytes,
    pub(crate) header_offset: usize,
    pub(crate) hinted_body_len: usize,
    pub(crate) body: BodySink,
    cursor: usize,

    pub(crate) abort: bool,
    pub(crate) suspend: bool,
    pub(crate) checked: bool,
    pub(crate) first_packet_sent: bool,
    pub(crate) rsp_mode: RspMode,

    /// Negotiated TX MTU at the time the object was created; used for
    /// packet-space computations.
    mtu_tx: u16,
}

impl Object {
    pub(crate) fn new(cmd: Opcode, mtu_tx: u16) -> Self {
        let mut object = Self {
            cmd,
            opcode: 0,
            lastopcode: 0,
            tx_headerq: VecDeque::new(),
            tx_pre: None,
            rx_headers: Vec::new(),
            rx_pre: Bytes::new(),
            header_offset: 0,
            hinted_body_len: 0,
            body: BodySink::default(),
            cursor: 0,
            abort: false,
            suspend: false,
            checked: false,
            first_packet_sent: false,
            rsp_mode: RspMode::Normal,
            mtu_tx,
        };
        object.set_command(cmd);
        object
    }

    /// The command this transaction performs.
    #[inline]
    pub fn command(&self) -> Opcode {
        self.cmd
    }

    pub(crate) fn set_command(&mut self, cmd: Opcode) {
        self.cmd = cmd;
        self.opcode = cmd as u8;
        self.lastopcode = cmd as u8 | FINAL_MASK;
    }

    /// Server side: response code for intermediate packets and for the
    /// final packet.
    pub fn set_response(&mut self, rsp: ResponseCode, last_rsp: ResponseCode) {
        self.opcode = rsp.raw();
        self.lastopcode = last_rsp.raw();
    }

    /// The response code currently set for intermediate packets.
    #[inline]
    pub fn response(&self) -> ResponseCode {
        ResponseCode::from_wire(self.opcode)
    }

    /// The response code currently set for the final packet.
    #[inline]
    pub fn final_response(&self) -> ResponseCode {
        ResponseCode::from_wire(self.lastopcode)
    }

    /// Opcode byte for the packet being prepared. With an empty TX queue
    /// the final opcode takes over (when allowed) and Final is always set;
    /// otherwise Final is set only when forced (server role).
    pub(crate) fn real_opcode(&self, allowfinal: bool, forcefinal: bool) -> u8 {
        if !self.tx_headerq.is_empty() {
            let mut raw = self.opcode;
            if forcefinal {
                raw |= FINAL_MASK;
            }
            raw
        } else {
            let raw = if allowfinal {
                self.lastopcode
            } else {
                self.opcode
            };
            raw | FINAL_MASK
        }
    }

    /// Everything queued for transmission has been serialized.
    #[inline]
    pub(crate) fn tx_finished(&self) -> bool {
        self.tx_headerq.is_empty() && self.tx_pre.is_none()
    }

    /// Queue a header whose payload is already encoded for its type class.
    ///
    /// The `STREAM_*` flags drive body streaming: `STREAM_START` installs a
    /// stream source (ignoring `data`), `STREAM_DATA` / `STREAM_DATA_END`
    /// feed it. `FIT_ONE_PACKET` rejects headers that cannot share one
    /// packet with everything queued before them.
    pub fn add_header(
        &mut self,
        id: RawHeaderId,
        data: Bytes,
        flags: HeaderFlags,
    ) -> Result<(), ObexError> {
        // End-of-Body is not a separate header, just the final fragment.
        let id = if id.id() == RawHeaderId::BODY_END_ID {
            RawHeaderId::BODY
        } else {
            id
        };

        if flags.intersects(HeaderFlags::STREAM_DATA | HeaderFlags::STREAM_DATA_END) {
            let stream = self.tx_stream_mut().ok_or(ObexError::InvalidArgument(
                "no active body stream on this object",
            ))?;
            stream.set_chunk(data);
            if flags.contains(HeaderFlags::STREAM_DATA_END) {
                stream.finish();
            }
            return Ok(());
        }

        if flags.contains(HeaderFlags::STREAM_START) {
            if self.tx_stream_mut().is_some() {
                return Err(ObexError::InvalidArgument(
                    "a body stream is already active",
                ));
            }
            self.tx_headerq
                .push_back(Header::new_stream(flags & HeaderFlags::SUSPEND));
            return Ok(());
        }

        let hdr = Header::new(id, data, flags & HeaderFlags::SUSPEND);
        if flags.contains(HeaderFlags::FIT_ONE_PACKET) && !hdr.is_splittable() {
            let space = self.available_space(flags);
            if space < hdr.on_wire_size() {
                return Err(ObexError::HeaderTooBig {
                    size: hdr.on_wire_size(),
                    space,
                });
            }
        }
        self.tx_headerq.push_back(hdr);
        Ok(())
    }

    /// Queue a single-byte header.
    pub fn add_u8(
        &mut self,
        id: RawHeaderId,
        value: u8,
        flags: HeaderFlags,
    ) -> Result<(), ObexError> {
        self.add_header(id, Bytes::copy_from_slice(&[value]), flags)
    }

    /// Queue a 4-byte big-endian header.
    pub fn add_u32(
        &mut self,
        id: RawHeaderId,
        value: u32,
        flags: HeaderFlags,
    ) -> Result<(), ObexError> {
        self.add_header(id, Bytes::copy_from_slice(&value.to_be_bytes()), flags)
    }

    /// Queue a UTF-16BE text header (Name, Description, ...).
    pub fn add_unicode(
        &mut self,
        id: RawHeaderId,
        text: &str,
        flags: HeaderFlags,
    ) -> Result<(), ObexError> {
        self.add_header(id, crate::utils::encode_unicode(text), flags)
    }

    /// Bytes left in the current outbound packet: the TX MTU minus the
    /// common frame and, under `FIT_ONE_PACKET`, minus everything queued.
    pub fn available_space(&self, flags: HeaderFlags) -> usize {
        let mut used = FRAME_LEN;
        if flags.contains(HeaderFlags::FIT_ONE_PACKET) {
            if let Some(pre) = &self.tx_pre {
                used += pre.len();
            }
            used += self
                .tx_headerq
                .iter()
                .map(Header::on_wire_size)
                .sum::<usize>();
        }
        usize::from(self.mtu_tx).saturating_sub(used)
    }

    /// The next unread received header, advancing the iterator.
    pub fn next_rx_header(&mut self) -> Option<&Header> {
        let hdr = self.rx_headers.get(self.cursor)?;
        self.cursor += 1;
        Some(hdr)
    }

    /// Rewind the RX iterator to the first received header.
    pub fn reparse_rx_headers(&mut self) {
        self.cursor = 0;
    }

    /// All received headers in arrival order, without moving the iterator.
    #[inline]
    pub fn rx_headers(&self) -> &[Header] {
        &self.rx_headers
    }

    /// Switch body reception to per-fragment `StreamAvail` delivery. Must
    /// happen before the first Body fragment arrives: at `ReqHint` on the
    /// server, before submit on the client.
    pub fn stream_body(&mut self) {
        self.body = BodySink::Streamed;
    }

    /// Data transmitted before the headers (CONNECT and SETPATH carry
    /// this; other commands may via this call).
    pub fn set_pre_header_data(&mut self, data: Bytes) -> Result<(), ObexError> {
        if self.tx_pre.is_some() {
            return Err(ObexError::InvalidArgument(
                "pre-header data is already set",
            ));
        }
        self.tx_pre = Some(data);
        Ok(())
    }

    /// Received pre-header bytes, empty unless `header_offset` was set.
    #[inline]
    pub fn pre_header_data(&self) -> &[u8] {
        &self.rx_pre
    }

    /// Number of pre-header bytes expected on inbound packets. CONNECT and
    /// SETPATH configure this automatically.
    pub fn set_header_offset(&mut self, offset: usize) {
        self.header_offset = offset;
    }

    /// Response mode this transaction runs under. Hosts switch it from the
    /// documented events, together with the engine-level mode.
    pub fn set_response_mode(&mut self, mode: RspMode) {
        self.rsp_mode = mode;
    }

    /// Stop emitting and consuming packets for this object.
    pub fn suspend(&mut self) {
        self.suspend = true;
    }

    /// Resume a suspended object.
    pub fn resume(&mut self) {
        self.suspend = false;
    }

    #[inline]
    pub fn is_suspended(&self) -> bool {
        self.suspend
    }

    pub(crate) fn tx_stream_mut(
        &mut self,
    ) -> Option<&mut crate::models::header::StreamPayload> {
        self.tx_headerq.iter_mut().find_map(|h| {
            match h.payload_mut() {
                HeaderPayload::Stream(s) => Some(s),
                HeaderPayload::MemBuf(_) => None,
            }
        })
    }

    /// Front of the TX queue holds a stream source that is out of data but
    /// not finished; the host has to feed it before the packet can grow.
    pub(crate) fn tx_stream_starved(&self) -> bool {
        match self.tx_headerq.front().map(Header::payload) {
            Some(HeaderPayload::Stream(s)) => {
                s.remaining() == 0 && !s.is_marked_finished()
            },
            _ => false,
        }
    }

    /// Any queued stream source is out of data but not finished.
    pub(crate) fn tx_stream_starved_any(&self) -> bool {
        self.tx_headerq.iter().any(|h| match h.payload() {
            HeaderPayload::Stream(s) => s.remaining() == 0 && !s.is_marked_finished(),
            HeaderPayload::MemBuf(_) => false,
        })
    }
}
