// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

use crate::{
    engine::InitFlags,
    models::{event::RspMode, frame::MINIMUM_MTU},
};

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Config {
    /// Protocol-level parameters negotiated or enforced on the wire.
    pub engine: EngineConfig,
    /// Endpoint behavior toggles applied at engine construction.
    #[serde(default)]
    pub options: OptionsConfig,
    /// Transport addressing kept locally and never sent on the wire.
    #[serde(default)]
    pub transport: TransportConfig,
}

/// Packet-size and pacing parameters.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct EngineConfig {
    #[serde(rename = "MaxRxPacketSize")]
    /// Largest packet this engine accepts; sent to the peer at CONNECT.
    pub mtu_rx: u16,

    #[serde(rename = "MaxTxPacketSize")]
    /// Upper bound for the negotiated transmit packet size.
    pub mtu_tx_max: u16,

    #[serde(default, rename = "ResponseMode")]
    /// Normal request/response or Single-Response-Mode.
    pub response_mode: RspMode,

    #[serde(default, rename = "TimeoutMs")]
    /// Read-side timeout in milliseconds; absent means wait forever.
    pub timeout_ms: Option<u64>,
}

/// Construction-time switches, mirroring the engine init flags.
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct OptionsConfig {
    #[serde(default, rename = "KeepServer")]
    /// Retain the listening endpoint after accepting a connection.
    pub keep_server: bool,

    #[serde(default, rename = "FilterHint")]
    /// Filter discovered devices by the OBEX hint bit.
    pub filter_hint: bool,

    #[serde(default, rename = "FilterIas")]
    /// Filter discovered devices by service name.
    pub filter_ias: bool,

    #[serde(default, rename = "CloseOnExec")]
    /// Open new descriptors close-on-exec.
    pub cloexec: bool,

    #[serde(default, rename = "NonBlocking")]
    /// Open new descriptors non-blocking.
    pub nonblocking: bool,
}

/// Where to connect or listen; both optional because a caller may supply a
/// pre-connected channel.
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct TransportConfig {
    #[serde(default, rename = "TargetAddress")]
    pub target_address: Option<String>,

    #[serde(default, rename = "ListenAddress")]
    pub listen_address: Option<String>,
}

impl Config {
    /// Load and validate a YAML config. Relative paths are resolved
    /// against the working directory.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = resolve_path(path.as_ref())?;
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed to read config file: {path:?}"))?;
        let cfg: Self = serde_yaml::from_str(&raw)
            .with_context(|| format!("failed to parse config file: {path:?}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        ensure!(
            self.engine.mtu_rx >= MINIMUM_MTU,
            "MaxRxPacketSize {} below the protocol minimum {MINIMUM_MTU}",
            self.engine.mtu_rx
        );
        ensure!(
            self.engine.mtu_tx_max >= MINIMUM_MTU,
            "MaxTxPacketSize {} below the protocol minimum {MINIMUM_MTU}",
            self.engine.mtu_tx_max
        );
        Ok(())
    }

    /// Engine init flags derived from the options block.
    pub fn init_flags(&self) -> InitFlags {
        let mut flags = InitFlags::empty();
        if self.options.keep_server {
            flags |= InitFlags::KEEP_SERVER;
        }
        if self.options.filter_hint {
            flags |= InitFlags::FILTER_HINT;
        }
        if self.options.filter_ias {
            flags |= InitFlags::FILTER_IAS;
        }
        if self.options.cloexec {
            flags |= InitFlags::CLOEXEC;
        }
        if self.options.nonblocking {
            flags |= InitFlags::NONBLOCK;
        }
        flags
    }
}

fn resolve_path(path: &Path) -> Result<PathBuf> {
    let abs = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .context("cannot get current working dir")?
            .join(path)
    };
    abs.canonicalize()
        .with_context(|| format!("failed to canonicalize config path {abs:?}"))
}
