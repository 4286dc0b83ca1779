// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Client and server protocol state machines.
//!
//! Both roles share the engine's state/substate/SRM fields and are
//! expressed as two closed steppers dispatched from a single entry point,
//! invoked at the end of every [`crate::engine::Engine::work`] call.

pub(crate) mod client;
pub(crate) mod server;

use crate::{
    engine::{Engine, error::ObexError},
    models::event::{Mode, WorkStatus},
};

pub(crate) async fn step(engine: &mut Engine) -> Result<WorkStatus, ObexError> {
    match engine.mode {
        Mode::Client => client::step(engine).await,
        Mode::Server => server::step(engine).await,
    }
}
