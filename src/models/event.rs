// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Engine-visible enums: events delivered to the host, the engine role,
//! response mode and the coarse work-loop states.

use serde::{Deserialize, Serialize};

/// Events delivered through the engine's event handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// A packet boundary was crossed in either direction.
    Progress,
    /// Server: a request is about to arrive; decide on streaming or an
    /// early rejection here.
    ReqHint,
    /// Server: all first-packet headers of a multi-packet request are
    /// available for inspection.
    ReqCheck,
    /// Server: the whole request arrived; attach response headers now.
    Req,
    /// The transaction finished; for clients the response code is final.
    ReqDone,
    /// The transaction was aborted, by either side.
    Abort,
    /// A connection is waiting on the listening endpoint.
    AcceptHint,
    /// The transport failed; the engine dropped to idle.
    LinkErr,
    /// An inbound packet could not be parsed; the engine dropped to idle.
    ParseErr,
    /// The peer sent data while we were transmitting (Normal mode only).
    Unexpected,
    /// The TX body stream ran dry; feed more data or finish it.
    StreamEmpty,
    /// A body fragment is available for a streaming receiver.
    StreamAvail,
}

/// Which half of the protocol this engine is currently playing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Client,
    Server,
}

/// Response mode: classic request/response or Single-Response-Mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RspMode {
    #[default]
    Normal,
    Single,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    Request,
    Response,
    Abort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Substate {
    Rx,
    TxPrepare,
    Tx,
}

/// What the next `work` call will do, for main-loop integration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataDirection {
    In,
    Out,
    None,
}

/// Outcome of one `work` step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkStatus {
    /// The engine made progress.
    Progress,
    /// Nothing happened before the read timeout expired.
    Timeout,
}
