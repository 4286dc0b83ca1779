// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use thiserror::Error;

use crate::{
    models::{frame::MINIMUM_MTU, header::ParseError},
    transport::TransportError,
};

/// Errors surfaced by the engine API.
///
/// Transport and parse failures also deliver `LinkErr` / `ParseErr` events
/// before the error is returned; the synchronous variants deliver nothing.
#[derive(Debug, Error)]
pub enum ObexError {
    #[error("another request is already in flight")]
    Busy,

    #[error("invalid MTU {0}: the protocol minimum is {MINIMUM_MTU}")]
    InvalidMtu(u16),

    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("header of {size} bytes does not fit into {space} bytes of packet space")]
    HeaderTooBig { size: usize, space: usize },

    #[error("transport: {0}")]
    Transport(#[from] TransportError),

    #[error("protocol parse: {0}")]
    Parse(#[from] ParseError),
}
