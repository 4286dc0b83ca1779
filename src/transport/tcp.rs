// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! TCP transport back-end.
//!
//! The default OBEX-over-TCP port is 650. The listening socket can stay
//! open after an accept so one process can serve several clients in turn.

use std::{net::SocketAddr, time::Duration};

use async_trait::async_trait;
use tokio::{
    io::Interest,
    net::{TcpListener, TcpStream},
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
    engine::buffer::PacketBuf,
    transport::{InputReady, Transport, TransportError, io_with_timeout},
};

/// Default TCP port assigned to OBEX.
pub const OBEX_TCP_PORT: u16 = 650;

#[derive(Debug, Default)]
pub struct TcpTransport {
    remote: Option<SocketAddr>,
    local: Option<SocketAddr>,
    listener: Option<TcpListener>,
    stream: Option<TcpStream>,
    pending: Option<TcpStream>,
    cancel: CancellationToken,
}

impl TcpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Address the next `connect` call.
    pub fn with_remote(mut self, addr: SocketAddr) -> Self {
        self.remote = Some(addr);
        self
    }

    /// Address the next `listen` call; defaults to `0.0.0.0:650`.
    pub fn with_local(mut self, addr: SocketAddr) -> Self {
        self.local = Some(addr);
        self
    }

    /// Token that aborts any blocked wait on this transport.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Bound listener address, once `listen` succeeded.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    fn stream(&self) -> Result<&TcpStream, TransportError> {
        self.stream.as_ref().ok_or(TransportError::NotConnected)
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        let addr = self.remote.ok_or(TransportError::NotConnected)?;
        let stream = TcpStream::connect(addr).await?;
        stream.set_linger(None)?;
        stream.set_nodelay(true)?;
        debug!("connected to {addr}");
        self.stream = Some(stream);
        Ok(())
    }

    async fn listen(&mut self) -> Result<(), TransportError> {
        let addr = self
            .local
            .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], OBEX_TCP_PORT)));
        let listener = TcpListener::bind(addr).await?;
        debug!("listening on {:?}", listener.local_addr());
        self.listener = Some(listener);
        Ok(())
    }

    async fn accept(&mut self, keep_server: bool) -> Result<(), TransportError> {
        let stream = match self.pending.take() {
            Some(s) => s,
            None => {
                let listener =
                    self.listener.as_ref().ok_or(TransportError::NotConnected)?;
                listener.accept().await?.0
            },
        };
        stream.set_nodelay(true)?;
        self.stream = Some(stream);
        if !keep_server {
            self.listener = None;
        }
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        self.pending = None;
        self.stream = None;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    async fn handle_input(
        &mut self,
        timeout: Option<Duration>,
    ) -> Result<InputReady, TransportError> {
        if let Some(stream) = &self.stream {
            let ready = io_with_timeout(
                "tcp readable",
                stream.ready(Interest::READABLE),
                timeout,
                &self.cancel,
            )
            .await?;
            return Ok(match ready {
                Some(_) => InputReady::Data,
                None => InputReady::Timeout,
            });
        }

        if let Some(listener) = &self.listener {
            let accepted = io_with_timeout(
                "tcp accept",
                listener.accept(),
                timeout,
                &self.cancel,
            )
            .await?;
            return Ok(match accepted {
                Some((stream, peer)) => {
                    debug!("pending connection from {peer}");
                    self.pending = Some(stream);
                    InputReady::Accept
                },
                None => InputReady::Timeout,
            });
        }

        Err(TransportError::NotConnected)
    }

    fn read(&mut self, buf: &mut PacketBuf, max: usize) -> Result<usize, TransportError> {
        let stream = self.stream()?;
        let n = buf.read_in(max, |chunk| match stream.try_read(chunk) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(e),
        })?;
        Ok(n)
    }

    async fn write(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;
        let n = tokio::io::AsyncWriteExt::write(stream, data).await?;
        Ok(n)
    }
}
