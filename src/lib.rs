// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

pub mod cfg;
pub mod engine;
pub mod models;
pub mod object;
pub mod state_machine;
pub mod transport;
pub mod utils;
