// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Client role: emit the request packet by packet, then collect the
//! response until a final code arrives.

use tracing::debug;

use crate::{
    engine::{Engine, error::ObexError},
    models::{
        event::{Event, Mode, RspMode, State, Substate, WorkStatus},
        frame::{CONNECT_FRAME_LEN, ConnectFrame, FRAME_LEN, MINIMUM_MTU},
        header::ParseError,
        opcode::Opcode,
        response::ResponseCode,
        srm::SrmFlags,
    },
};

pub(crate) async fn step(engine: &mut Engine) -> Result<WorkStatus, ObexError> {
    match engine.state {
        State::Request => match engine.substate {
            Substate::TxPrepare => prepare_request(engine),
            Substate::Tx => request_sent(engine),
            Substate::Rx => request_rx(engine),
        },
        State::Response => response_rx(engine).await,
        State::Abort => match engine.substate {
            Substate::TxPrepare => {
                engine.prepare_simple_command(Opcode::Abort);
                engine.substate = Substate::Tx;
                Ok(WorkStatus::Progress)
            },
            Substate::Tx => {
                engine.substate = Substate::Rx;
                Ok(WorkStatus::Progress)
            },
            Substate::Rx => abort_rx(engine).await,
        },
        State::Idle => Ok(WorkStatus::Progress),
    }
}

/// Serialize the next request packet, or divert to the ABORT exchange when
/// the host cancelled nicely.
fn prepare_request(engine: &mut Engine) -> Result<WorkStatus, ObexError> {
    if engine.object.as_ref().is_some_and(|o| o.abort) {
        debug!("aborting: sending ABORT instead of the next request packet");
        engine.state = State::Abort;
        engine.prepare_simple_command(Opcode::Abort);
        engine.substate = Substate::Tx;
        return Ok(WorkStatus::Progress);
    }

    if engine.msg_prepare(true, false)? {
        engine.substate = Substate::Tx;
        Ok(WorkStatus::Progress)
    } else {
        // Suspended, or the body stream is waiting on the host.
        Ok(WorkStatus::Timeout)
    }
}

/// One request packet fully left the transport.
fn request_sent(engine: &mut Engine) -> Result<WorkStatus, ObexError> {
    let Some(object) = engine.object.as_mut() else {
        return Ok(WorkStatus::Progress);
    };
    object.first_packet_sent = true;
    let cmd = object.cmd;
    let suspended = object.suspend;
    let finished = object.tx_finished() && !suspended;
    let single = object.rsp_mode == RspMode::Single;

    engine.deliver_event(Event::Progress, cmd, None, false);

    if finished {
        engine.state = State::Response;
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

/// A packet arrived while the request is still going out: the peer's
/// CONTINUE, an early rejection, or out-of-band progress data.
fn request_rx(engine: &mut Engine) -> Result<WorkStatus, ObexError> {
    let Some(opcode_byte) = engine.msg_rx_opcode() else {
        return Ok(WorkStatus::Progress);
    };
    let rsp = ResponseCode::from_wire(opcode_byte);

    // Some peers acknowledge every fragment with SUCCESS; accept that too.
    if rsp != ResponseCode::CONTINUE && rsp != ResponseCode::SUCCESS {
        debug!("request not accepted: {rsp}");
        engine.msg_receive_finished();
        let cmd = engine.current_cmd();
        engine.deliver_event(Event::ReqDone, cmd, Some(rsp), true);
        engine.mode = Mode::Server;
        engine.state = State::Idle;
        engine.substate = Substate::Rx;
        return Ok(WorkStatus::Progress);
    }

    let len = engine.msg_rx_len().unwrap_or(FRAME_LEN);
    if len > FRAME_LEN {
        // Out-of-band data in the middle of our request. Expected under
        // SRM; surfaced (and kept on the RX list) in Normal mode.
        if engine
            .object
            .as_ref()
            .is_some_and(|o| o.rsp_mode == RspMode::Normal)
        {
            let cmd = engine.current_cmd();
            engine.deliver_event(Event::Unexpected, cmd, None, false);
        }
        if engine.current_cmd() == Opcode::Connect {
            return fail_parse(engine, ParseError::UnexpectedConnectData);
        }
        if let Err(e) = engine.msg_receive(true) {
            return fail_parse(engine, e);
        }
    } else if let Err(e) = engine.msg_receive(true) {
        return fail_parse(engine, e);
    }

    engine.msg_receive_finished();
    engine.substate = Substate::TxPrepare;
    Ok(WorkStatus::Progress)
}

/// Collect response packets until a final response code ends the
/// transaction.
async fn response_rx(engine: &mut Engine) -> Result<WorkStatus, ObexError> {
    let Some(opcode_byte) = engine.msg_rx_opcode() else {
        return Ok(WorkStatus::Progress);
    };
    let rsp = ResponseCode::from_wire(opcode_byte);
    let cmd = engine.current_cmd();

    match cmd {
        Opcode::Connect => {
            // The CONNECT response opens with version/flags/MTU.
            let Some(len) = engine.msg_rx_len() else {
                return Ok(WorkStatus::Progress);
            };
            let payload = &engine.rx_buf.as_slice()[FRAME_LEN.min(len)..len];
            match ConnectFrame::parse(payload) {
                Ok(frame) => {
                    debug!("peer version=0x{:02x}", frame.version);
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
                Err(e) => return fail_parse(engine, e),
            }
        },
        Opcode::Disconnect => {
            debug!("DISCONNECT done, resetting MTU");
            engine.mtu_tx = MINIMUM_MTU;
            engine.rsp_mode = RspMode::Normal;
            engine.srm_flags = SrmFlags::empty();
        },
        _ => {},
    }

    if let Err(e) = engine.msg_receive(true) {
        return fail_parse(engine, e);
    }
    engine.msg_receive_finished();

    if rsp == ResponseCode::CONTINUE {
        let Some(object) = engine.object.as_ref() else {
            return Ok(WorkStatus::Progress);
        };
        if object.abort {
            debug!("ignoring CONTINUE, request was aborted");
            engine.state = State::Request;
            engine.substate = Substate::TxPrepare;
            return Ok(WorkStatus::Progress);
        }
        if object.suspend {
            return Ok(WorkStatus::Progress);
        }
        let send_next = object.rsp_mode == RspMode::Normal
            || engine.srm_flags.contains(SrmFlags::WAIT_REMOTE);
        engine.deliver_event(Event::Progress, cmd, Some(rsp), false);
        if send_next {
            engine.state = State::Request;
            engine.substate = Substate::TxPrepare;
        }
        return Ok(WorkStatus::Progress);
    }

    // A non-informational code finishes the transaction.
    debug!("done, rsp={rsp}");
    let aborting = engine.object.as_ref().is_some_and(|o| o.abort);
    if aborting {
        if rsp == ResponseCode::SUCCESS {
            engine.deliver_event(Event::Abort, cmd, Some(rsp), true);
        } else {
            engine.deliver_event(Event::LinkErr, cmd, Some(rsp), true);
        }
    } else {
        engine.deliver_event(Event::ReqDone, cmd, Some(rsp), true);
    }
    engine.mode = Mode::Server;
    engine.state = State::Idle;
    engine.substate = Substate::Rx;
    Ok(WorkStatus::Progress)
}

/// The ABORT command was flushed; wait for the acknowledgement.
async fn abort_rx(engine: &mut Engine) -> Result<WorkStatus, ObexError> {
    let Some(opcode_byte) = engine.msg_rx_opcode() else {
        return Ok(WorkStatus::Progress);
    };
    let rsp = ResponseCode::from_wire(opcode_byte);
    engine.msg_receive_finished();
    let cmd = engine.current_cmd();

    if rsp == ResponseCode::SUCCESS {
        engine.deliver_event(Event::Abort, cmd, Some(rsp), true);
    } else {
        engine.deliver_event(Event::LinkErr, cmd, Some(rsp), true);
        let _ = engine.transport.disconnect().await;
    }
    engine.mode = Mode::Server;
    engine.state = State::Idle;
    engine.substate = Substate::Rx;
    Ok(WorkStatus::Progress)
}

fn fail_parse(engine: &mut Engine, err: ParseError) -> Result<WorkStatus, ObexError> {
    engine.rx_buf.clear();
    let cmd = engine.current_cmd();
    engine.deliver_event(Event::ParseErr, cmd, None, true);
    engine.mode = Mode::Server;
    engine.state = State::Idle;
    engine.substate = Substate::Rx;
    Err(ObexError::Parse(err))
}
