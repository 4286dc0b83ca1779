// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Bridge between the current object and the raw packet buffers: header
//! serialization on the way out, filtered header parsing on the way in.

use bytes::Bytes;
use tracing::debug;

use crate::{
    engine::{DumpFlags, Engine, EventCtx, error::ObexError},
    models::{
        event::{Event, RspMode},
        frame::{CommonFrame, FRAME_LEN},
        header::{
            BODY_FILTER, Header, HeaderFlags, HeaderPayload, HeaderView, ParseError,
            PayloadOps, RawHeaderId,
        },
        srm::{self, SrmFlags},
    },
    object::body::BodySink,
    utils::HexPreview,
};

impl Engine {
    /// A complete packet is sitting at the head of the RX buffer.
    pub(crate) fn msg_rx_ready(&self) -> bool {
        CommonFrame::peek(self.rx_buf.as_slice())
            .is_some_and(|f| f.total_len() >= FRAME_LEN && self.rx_buf.len() >= f.total_len())
    }

    /// Opcode byte of the pending RX packet.
    pub(crate) fn msg_rx_opcode(&self) -> Option<u8> {
        if !self.msg_rx_ready() {
            return None;
        }
        CommonFrame::peek(self.rx_buf.as_slice()).map(|f| f.opcode.raw())
    }

    /// Declared length of the pending RX packet.
    pub(crate) fn msg_rx_len(&self) -> Option<usize> {
        if !self.msg_rx_ready() {
            return None;
        }
        CommonFrame::peek(self.rx_buf.as_slice()).map(|f| f.total_len())
    }

    /// The TX buffer has been flushed completely.
    #[inline]
    pub(crate) fn msg_tx_empty(&self) -> bool {
        self.tx_buf.is_empty()
    }

    /// Drop the evaluated packet from the RX buffer.
    pub(crate) fn msg_receive_finished(&mut self) {
        if let Some(len) = self.msg_rx_len() {
            debug!("pulling {len} bytes");
            self.rx_buf.pull(len);
        }
    }

    /// Serialize the next outbound packet from the current object into the
    /// TX buffer.
    ///
    /// Returns `false` without touching the buffer when the object is
    /// suspended or its body stream is starved; the caller stays in the
    /// prepare substate. A starved stream fires `StreamEmpty` first, so the
    /// host gets a chance to feed it within this very step.
    pub(crate) fn msg_prepare(
        &mut self,
        allowfinal: bool,
        forcefinal: bool,
    ) -> Result<bool, ObexError> {
        self.feed_tx_stream();

        let Self {
            tx_buf,
            object,
            srm_flags,
            rsp_mode,
            mtu_tx,
            dump,
            ..
        } = self;
        let Some(object) = object.as_mut() else {
            return Ok(false);
        };
        if object.suspend {
            return Ok(false);
        }
        if object.tx_stream_starved() && object.tx_pre.is_none() {
            // The packet would open with a dry stream; nothing to say until
            // the host feeds it.
            return Ok(false);
        }

        let mut tx_left = usize::from(*mtu_tx) - FRAME_LEN;
        tx_buf.clear();
        let frame_off = tx_buf.reserve(FRAME_LEN);

        // Non-header data goes out first and only once (CONNECT, SETPATH).
        if let Some(pre) = object.tx_pre.take() {
            debug!("adding {} bytes of non-header data", pre.len());
            tx_buf.append(&pre);
        }

        let mut srm_byte: Option<u8> = None;
        while let Some(front) = object.tx_headerq.front_mut() {
            if tx_left == 0 {
                break;
            }
            if let HeaderPayload::Stream(s) = front.payload()
                && s.remaining() == 0
                && !s.is_marked_finished()
            {
                break;
            }

            let first_byte = (front.id() == RawHeaderId::SRM_FLAGS)
                .then(|| front.peek_first())
                .flatten();
            let appended = front.append_into(tx_buf, tx_left);
            if appended == 0 {
                break;
            }
            tx_left -= appended;
            if first_byte.is_some() {
                srm_byte = first_byte;
            }

            if front.is_finished() {
                let suspend_after = front.flags().contains(HeaderFlags::SUSPEND);
                object.tx_headerq.pop_front();
                if suspend_after {
                    object.suspend = true;
                    break;
                }
            } else {
                // A split body filled the rest of this packet.
                break;
            }
        }

        let real_opcode = object.real_opcode(allowfinal, forcefinal);
        debug!("generating packet with opcode 0x{real_opcode:02x}");
        let total = tx_buf.len() as u16;
        tx_buf.put_at(frame_off, &[real_opcode]);
        tx_buf.put_at(frame_off + 1, &total.to_be_bytes());

        if *rsp_mode == RspMode::Single
            && let Some(byte) = srm_byte
        {
            srm_flags.remove(SrmFlags::WAIT_REMOTE);
            srm_flags.insert(srm::decode_tx(byte));
        }

        if dump.contains(DumpFlags::TX) {
            debug!("Tx {:?}", HexPreview(tx_buf.as_slice()));
        }
        Ok(true)
    }

    /// Fire `StreamEmpty` when the object's TX body stream has run dry, so
    /// the host can attach the next chunk before the packet is built.
    fn feed_tx_stream(&mut self) {
        let starved = self
            .object
            .as_ref()
            .is_some_and(crate::object::Object::tx_stream_starved_any);
        if !starved {
            return;
        }
        let cmd = self.current_cmd();
        self.deliver_event(Event::StreamEmpty, cmd, None, false);
    }

    /// Parse the pending RX packet into the current object, skipping every
    /// header whose id bit is set in `filter`. `first_run` additionally
    /// consumes the pre-header bytes and runs the SRM pre-receive hook.
    pub(crate) fn msg_receive_filtered(
        &mut self,
        filter: u64,
        first_run: bool,
    ) -> Result<(), ParseError> {
        if !self.msg_rx_ready() {
            return Ok(());
        }

        let Self {
            rx_buf,
            object,
            handler,
            srm_flags,
            rsp_mode,
            mode,
            ..
        } = self;
        let Some(object) = object.as_mut() else {
            return Ok(());
        };
        let Some(frame) = CommonFrame::peek(rx_buf.as_slice()) else {
            return Ok(());
        };
        let len = frame.total_len();
        let packet = &rx_buf.as_slice()[..len];

        if first_run {
            if *rsp_mode == RspMode::Single {
                srm_flags.remove(SrmFlags::WAIT_LOCAL);
            }
            if object.header_offset > 0 && object.rx_pre.is_empty() {
                let end = FRAME_LEN + object.header_offset;
                if end > len {
                    return Err(ParseError::ShortPacket { available: len });
                }
                object.rx_pre = Bytes::copy_from_slice(&packet[FRAME_LEN..end]);
                debug!("command has {} bytes of non-header data", object.header_offset);
            }
        }

        let mut offset = FRAME_LEN + object.header_offset;
        if offset > len {
            return Err(ParseError::ShortPacket { available: len });
        }

        while offset < len {
            let (view, consumed) = HeaderView::parse(&packet[offset..len], offset)?;
            let id6 = view.id.id();
            debug!(
                "header: id=0x{:02x}, size={}",
                view.id.raw(),
                view.data.len()
            );

            let mut handled = false;
            if filter & BODY_FILTER == 0 {
                if view.id.is_body() {
                    let cmd = object.cmd;
                    let is_end = id6 == RawHeaderId::BODY_END_ID;
                    if object.body.is_streamed() {
                        // Spare the host the empty non-last fragment.
                        if !(id6 == RawHeaderId::BODY_ID && view.data.is_empty()) {
                            handler.on_event(EventCtx {
                                event: Event::StreamAvail,
                                mode: *mode,
                                command: cmd,
                                response: None,
                                object: Some(&mut *object),
                                stream_data: Some(view.data),
                                rsp_mode: &mut *rsp_mode,
                            });
                            if is_end && !view.data.is_empty() {
                                handler.on_event(EventCtx {
                                    event: Event::StreamAvail,
                                    mode: *mode,
                                    command: cmd,
                                    response: None,
                                    object: Some(&mut *object),
                                    stream_data: Some(&[]),
                                    rsp_mode: &mut *rsp_mode,
                                });
                            }
                        }
                    } else if let BodySink::Buffered(buffered) = &mut object.body {
                        buffered.push(view.data, object.hinted_body_len);
                        if is_end {
                            let payload = buffered.take();
                            object.rx_headers.push(Header::new(
                                RawHeaderId::BODY,
                                payload,
                                HeaderFlags::empty(),
                            ));
                        }
                    }
                    handled = true;
                } else if id6 == RawHeaderId::LENGTH.id() && !object.body.started() {
                    // The length may be useful when buffering the body.
                    if let Some(value) = view.as_u32() {
                        object.hinted_body_len = value as usize;
                        debug!("hinted body len is {value}");
                    }
                }
            }

            if !handled && filter & view.id.filter_bit() == 0 {
                if id6 == RawHeaderId::SRM_FLAGS.id() && *rsp_mode == RspMode::Single {
                    srm_flags.insert(srm::decode_rx(view.first_byte().unwrap_or(0xFF)));
                }
                object.rx_headers.push(view.to_owned_header());
            }

            offset += consumed;
        }

        Ok(())
    }

    /// Unfiltered receive with pre-header handling.
    pub(crate) fn msg_receive(&mut self, first_run: bool) -> Result<(), ParseError> {
        self.msg_receive_filtered(0, first_run)
    }
}
