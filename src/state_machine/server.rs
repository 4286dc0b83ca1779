// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Server role: receive a request packet by packet, hand decision points
//! to the host, then emit the response.

use tracing::debug;

use crate::{
    engine::{Engine, error::ObexError},
    models::{
        event::{Event, RspMode, State, Substate, WorkStatus},
        frame::{CONNECT_FRAME_LEN, ConnectFrame, FRAME_LEN, MINIMUM_MTU},
        header::{BODY_FILTER, ParseError},
        opcode::{FINAL_MASK, OPCODE_MASK, Opcode},
        response::ResponseCode,
        srm::SrmFlags,
    },
    object::Object,
};

pub(crate) async fn step(engine: &mut Engine) -> Result<WorkStatus, ObexError> {
    match engine.state {
        State::Idle => idle(engine).await,
        State::Request => match engine.substate {
            Substate::Rx => request_rx(engine).await,
            Substate::TxPrepare => {
                // Acknowledge the last request packet with a CONTINUE.
                if engine.msg_prepare(false, true)? {
                    engine.substate = Substate::Tx;
                    Ok(WorkStatus::Progress)
                } else {
                    Ok(WorkStatus::Timeout)
                }
            },
            Substate::Tx => {
                engine.substate = Substate::Rx;
                Ok(WorkStatus::Progress)
            },
        },
        State::Response => match engine.substate {
            Substate::TxPrepare => response_prepare(engine),
            Substate::Tx => response_sent(engine),
            Substate::Rx => response_rx(engine).await,
        },
        State::Abort => Ok(WorkStatus::Progress),
    }
}

/// Nothing in flight; the pending packet opens a new request.
async fn idle(engine: &mut Engine) -> Result<WorkStatus, ObexError> {
    if !engine.msg_rx_ready() {
        return Ok(WorkStatus::Progress);
    }

    if engine.object.is_some() {
        debug!("got a new server request while already having one");
        engine.respond_simple(ResponseCode::INTERNAL_SERVER_ERROR).await?;
        engine.msg_receive_finished();
        return Ok(WorkStatus::Progress);
    }

    let opcode_byte = engine.msg_rx_opcode().unwrap_or(0);
    let Some(cmd) = Opcode::from_u7(opcode_byte & OPCODE_MASK) else {
        debug!("unknown command 0x{opcode_byte:02x}");
        engine.respond_simple(ResponseCode::NOT_IMPLEMENTED).await?;
        engine.msg_receive_finished();
        return Ok(WorkStatus::Progress);
    };

    let mut object = Object::new(cmd, engine.mtu_tx);
    object.set_response(
        ResponseCode::NOT_IMPLEMENTED,
        ResponseCode::NOT_IMPLEMENTED,
    );
    object.rsp_mode = engine.rsp_mode;
    engine.object = Some(object);

    // An ABORT outside a transaction needs no hint to the host.
    if cmd != Opcode::Abort {
        engine.deliver_event(Event::ReqHint, cmd, None, false);
    }

    match cmd {
        Opcode::Connect => {
            debug!("got CONNECT");
            let len = engine.msg_rx_len().unwrap_or(0);
            let payload = &engine.rx_buf.as_slice()[FRAME_LEN.min(len)..len];
            match ConnectFrame::parse(payload) {
                Ok(frame) => {
                    let peer_mtu = frame.mtu.get();
                    engine.mtu_tx =
                        peer_mtu.min(engine.mtu_tx_max).max(MINIMUM_MTU);
                    debug!(
                        "requested MTU={peer_mtu}, used MTU={}",
                        engine.mtu_tx
                    );
                    if let Some(object) = engine.object.as_mut() {
                        object.header_offset = CONNECT_FRAME_LEN;
                    }
                },
                Err(e) => {
                    engine.respond_simple(ResponseCode::BAD_REQUEST).await?;
                    return fail_parse(engine, e);
                },
            }
        },
        Opcode::SetPath => {
            if let Some(object) = engine.object.as_mut() {
                object.header_offset = crate::models::frame::SETPATH_FRAME_LEN;
            }
        },
        _ => {},
    }

    engine.state = State::Request;
    engine.substate = Substate::Rx;
    request_rx(engine).await
}

/// Drain one request packet into the object and decide whether to reply
/// CONTINUE, keep listening, or move to the response.
async fn request_rx(engine: &mut Engine) -> Result<WorkStatus, ObexError> {
    if !engine.msg_rx_ready() {
        return Ok(WorkStatus::Progress);
    }

    let opcode_byte = engine.msg_rx_opcode().unwrap_or(0);
    let cmd_raw = opcode_byte & OPCODE_MASK;
    let final_bit = opcode_byte & FINAL_MASK != 0;

    if cmd_raw == Opcode::Abort as u8 {
        return peer_abort(engine).await;
    }
    let obj_cmd = engine.current_cmd();
    if cmd_raw != obj_cmd as u8 {
        // The cmd field differs from the first fragment. Bail out.
        engine.respond_simple(ResponseCode::BAD_REQUEST).await?;
        return fail_parse(
            engine,
            ParseError::CommandMismatch {
                expected: obj_cmd as u8,
                got: cmd_raw,
            },
        );
    }

    // Look at everything except body headers first: the host can reject a
    // request or pick a receive strategy before any body is spooled.
    if let Err(e) = engine.msg_receive_filtered(BODY_FILTER, true) {
        engine.respond_simple(ResponseCode::BAD_REQUEST).await?;
        return fail_parse(engine, e);
    }

    let mut finished = final_bit;
    let mut deny = false;
    if !finished {
        // Multi-packet request: assume acceptance, let the host veto once
        // at REQCHECK.
        if let Some(object) = engine.object.as_mut() {
            object.set_response(ResponseCode::CONTINUE, ResponseCode::SUCCESS);
        }
        if !engine.object.as_ref().is_some_and(|o| o.checked) {
            engine.deliver_event(Event::ReqCheck, obj_cmd, None, false);
            if let Some(object) = engine.object.as_mut() {
                object.checked = true;
            }
        }
        let accepted = engine
            .object
            .as_ref()
            .is_some_and(|o| o.response().is_accepted());
        if !accepted {
            finished = true;
            deny = true;
        }
    }

    if !deny
        && let Err(e) = engine.msg_receive_filtered(!BODY_FILTER, false)
    {
        engine.respond_simple(ResponseCode::BAD_REQUEST).await?;
        return fail_parse(engine, e);
    }
    engine.msg_receive_finished();

    if !finished {
        engine.deliver_event(Event::Progress, obj_cmd, None, false);
        let normal = engine
            .object
            .as_ref()
            .is_some_and(|o| o.rsp_mode == RspMode::Normal);
        if normal || engine.srm_flags.contains(SrmFlags::WAIT_REMOTE) {
            engine.substate = Substate::TxPrepare;
        }
        return Ok(WorkStatus::Progress);
    }

    if !engine.object.as_ref().is_some_and(|o| o.first_packet_sent) {
        // The whole request has arrived; the host attaches its response
        // headers while this event is delivered.
        if !deny {
            debug!("we got a request");
            engine.deliver_event(Event::Req, obj_cmd, None, false);
        }
        if obj_cmd == Opcode::Connect {
            let frame = ConnectFrame::new(engine.mtu_rx).encode();
            if let Some(object) = engine.object.as_mut() {
                object.tx_pre = Some(frame);
            }
        }
    }
    engine.state = State::Response;
    engine.substate = Substate::TxPrepare;
    Ok(WorkStatus::Progress)
}

fn response_prepare(engine: &mut Engine) -> Result<WorkStatus, ObexError> {
    if engine.msg_prepare(true, true)? {
        engine.substate = Substate::Tx;
        Ok(WorkStatus::Progress)
    } else {
        Ok(WorkStatus::Timeout)
    }
}

/// One response packet fully left the transport.
fn response_sent(engine: &mut Engine) -> Result<WorkStatus, ObexError> {
    let Some(object) = engine.object.as_mut() else {
        return Ok(WorkStatus::Progress);
    };
    object.first_packet_sent = true;
    let cmd = object.cmd;
    let suspended = object.suspend;
    let finished = object.tx_finished() && !suspended;
    let single = object.rsp_mode == RspMode::Single;
    let last_rsp = object.final_response();

    engine.deliver_event(Event::Progress, cmd, None, false);

    if finished {
        if cmd == Opcode::Disconnect {
            debug!("DISCONNECT done, resetting MTU");
            engine.mtu_tx = MINIMUM_MTU;
            engine.rsp_mode = RspMode::Normal;
            engine.srm_flags = SrmFlags::empty();
        }
        engine.deliver_event(Event::ReqDone, cmd, Some(last_rsp), true);
        engine.state = State::Idle;
        engine.substate = Substate::Rx;
    } else if suspended {
        engine.substate = Substate::TxPrepare;
    } else if single && !engine.srm_flags.contains(SrmFlags::WAIT_REMOTE) {
        engine.substate = Substate::TxPrepare;
    } else {
        engine.substate = Substate::Rx;
    }
    Ok(WorkStatus::Progress)
}

/// An inbound packet while the response is going out: the client pulling
/// the next packet, an abort, or out-of-band data.
async fn response_rx(engine: &mut Engine) -> Result<WorkStatus, ObexError> {
    let Some(opcode_byte) = engine.msg_rx_opcode() else {
        return Ok(WorkStatus::Progress);
    };
    let cmd_raw = opcode_byte & OPCODE_MASK;

    if cmd_raw == Opcode::Abort as u8 {
        return peer_abort(engine).await;
    }
    let obj_cmd = engine.current_cmd();
    if cmd_raw != obj_cmd as u8 {
        engine.respond_simple(ResponseCode::BAD_REQUEST).await?;
        return fail_parse(
            engine,
            ParseError::CommandMismatch {
                expected: obj_cmd as u8,
                got: cmd_raw,
            },
        );
    }

    let len = engine.msg_rx_len().unwrap_or(FRAME_LEN);
    if len > FRAME_LEN {
        // The peer is sending while we respond. Expected under SRM,
        // surfaced in Normal mode; either way the headers stay on the RX
        // list for the host to inspect at REQDONE.
        if engine
            .object
            .as_ref()
            .is_some_and(|o| o.rsp_mode == RspMode::Normal)
        {
            debug!("didn't expect data from peer ({len})");
            engine.deliver_event(Event::Unexpected, obj_cmd, None, false);
        }
        if obj_cmd == Opcode::Connect {
            engine.respond_simple(ResponseCode::BAD_REQUEST).await?;
            return fail_parse(engine, ParseError::UnexpectedConnectData);
        }
        if let Err(e) = engine.msg_receive(true) {
            engine.respond_simple(ResponseCode::BAD_REQUEST).await?;
            return fail_parse(engine, e);
        }
    } else if let Err(e) = engine.msg_receive(true) {
        engine.respond_simple(ResponseCode::BAD_REQUEST).await?;
        return fail_parse(engine, e);
    }

    engine.msg_receive_finished();
    engine.substate = Substate::TxPrepare;
    Ok(WorkStatus::Progress)
}

/// The peer aborted: acknowledge, notify, drop the object.
async fn peer_abort(engine: &mut Engine) -> Result<WorkStatus, ObexError> {
    debug!("got ABORT request");
    engine.respond_simple(ResponseCode::SUCCESS).await?;
    engine.msg_receive_finished();
    let cmd = engine.current_cmd();
    engine.deliver_event(Event::Abort, cmd, None, true);
    engine.state = State::Idle;
    engine.substate = Substate::Rx;
    Ok(WorkStatus::Progress)
}

fn fail_parse(engine: &mut Engine, err: ParseError) -> Result<WorkStatus, ObexError> {
    engine.rx_buf.clear();
    let cmd = engine.current_cmd();
    engine.deliver_event(Event::ParseErr, cmd, None, true);
    engine.state = State::Idle;
    engine.substate = Substate::Rx;
    Err(ObexError::Parse(err))
}
