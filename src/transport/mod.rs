// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Transport abstraction.
//!
//! The engine drives any reliable byte stream through this trait and never
//! names a concrete transport. Implementations only have to provide the
//! small contract below: readiness waiting with a timeout, a non-blocking
//! read into the RX accumulator and a possibly-partial write.

pub mod stream;
pub mod tcp;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::engine::buffer::PacketBuf;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport i/o: {0}")]
    Io(#[from] std::io::Error),

    #[error("transport is not connected")]
    NotConnected,

    #[error("operation not supported by this transport")]
    Unsupported,

    #[error("operation cancelled")]
    Cancelled,
}

/// Outcome of a readiness wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputReady {
    /// Bytes can be read from the connected peer.
    Data,
    /// A connection is pending on the listening endpoint.
    Accept,
    /// The timeout expired first.
    Timeout,
}

/// A discoverable endpoint reported by `find_interfaces`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interface {
    pub name: String,
    pub address: String,
    pub service: Option<String>,
}

#[async_trait]
pub trait Transport: Send {
    /// Connect to the configured peer.
    async fn connect(&mut self) -> Result<(), TransportError> {
        Err(TransportError::Unsupported)
    }

    /// Bind the listening endpoint.
    async fn listen(&mut self) -> Result<(), TransportError> {
        Err(TransportError::Unsupported)
    }

    /// Promote a pending inbound connection. With `keep_server` the
    /// listening endpoint stays open for further clients.
    async fn accept(&mut self, _keep_server: bool) -> Result<(), TransportError> {
        Err(TransportError::Unsupported)
    }

    /// Tear the connection down.
    async fn disconnect(&mut self) -> Result<(), TransportError>;

    fn is_connected(&self) -> bool;

    /// Wait at most `timeout` (`None` = forever) until the transport has
    /// something for the engine.
    async fn handle_input(
        &mut self,
        timeout: Option<Duration>,
    ) -> Result<InputReady, TransportError>;

    /// Move up to `max` readily available bytes into `buf` without
    /// blocking. Zero is a valid result.
    fn read(&mut self, buf: &mut PacketBuf, max: usize) -> Result<usize, TransportError>;

    /// Write some prefix of `data`; short writes are acceptable.
    async fn write(&mut self, data: &[u8]) -> Result<usize, TransportError>;

    /// Startup TX MTU suggestion (USB-style transports report large
    /// frames); `None` leaves the protocol minimum in place.
    fn mtu_hint(&self) -> Option<u16> {
        None
    }

    /// Enumerate discoverable endpoints, when the transport supports it.
    fn find_interfaces(&mut self) -> Vec<Interface> {
        Vec::new()
    }

    /// Address the next `connect` at a discovered endpoint.
    fn select_interface(&mut self, _intf: &Interface) -> Result<(), TransportError> {
        Err(TransportError::Unsupported)
    }
}

/// Await `fut` under an optional timeout and a cancellation token.
pub(crate) async fn io_with_timeout<F, T>(
    label: &'static str,
    fut: F,
    io_timeout: Option<Duration>,
    cancel: &CancellationToken,
) -> Result<Option<T>, TransportError>
where
    F: Future<Output = std::io::Result<T>>,
{
    tokio::select! {
        _ = cancel.cancelled() => {
            tracing::debug!("{label} cancelled");
            Err(TransportError::Cancelled)
        },
        res = async {
            match io_timeout {
                Some(dur) => match tokio::time::timeout(dur, fut).await {
                    Ok(r) => r.map(Some),
                    Err(_) => Ok(None),
                },
                None => fut.await.map(Some),
            }
        } => res.map_err(TransportError::from),
    }
}
