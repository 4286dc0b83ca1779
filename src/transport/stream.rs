// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Generic byte-channel transport.
//!
//! Wraps any `AsyncRead + AsyncWrite` pair: a pre-connected socket pair, a
//! serial/CDC device, or an in-memory duplex. Readiness waiting doubles as
//! the actual read: bytes are staged internally and the engine drains the
//! stage through `read`.

use std::time::Duration;

use async_trait::async_trait;
use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::{
    engine::buffer::PacketBuf,
    transport::{InputReady, Transport, TransportError, io_with_timeout},
};

const STAGE_CHUNK: usize = 4096;

pub struct StreamTransport<S> {
    io: Option<S>,
    stage: BytesMut,
    mtu_hint: Option<u16>,
    cancel: CancellationToken,
}

impl<S> StreamTransport<S>
where S: AsyncRead + AsyncWrite + Unpin + Send
{
    pub fn new(io: S) -> Self {
        Self {
            io: Some(io),
            stage: BytesMut::new(),
            mtu_hint: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Advertise a startup TX MTU, the way large-frame transports do.
    pub fn with_mtu_hint(mut self, mtu: u16) -> Self {
        self.mtu_hint = Some(mtu);
        self
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

#[async_trait]
impl<S> Transport for StreamTransport<S>
where S: AsyncRead + AsyncWrite + Unpin + Send
{
    async fn connect(&mut self) -> Result<(), TransportError> {
        // The wrapped channel is connected by construction.
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        if let Some(mut io) = self.io.take() {
            let _ = io.shutdown().await;
        }
        self.stage.clear();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.io.is_some()
    }

    async fn handle_input(
        &mut self,
        timeout: Option<Duration>,
    ) -> Result<InputReady, TransportError> {
        if !self.stage.is_empty() {
            return Ok(InputReady::Data);
        }
        let io = self.io.as_mut().ok_or(TransportError::NotConnected)?;

        let old = self.stage.len();
        self.stage.resize(old + STAGE_CHUNK, 0);
        let read = io_with_timeout(
            "stream read",
            io.read(&mut self.stage[old..]),
            timeout,
            &self.cancel,
        )
        .await;
        match read {
            Ok(Some(0)) => {
                self.stage.truncate(old);
                Err(TransportError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "peer closed the stream",
                )))
            },
            Ok(Some(n)) => {
                self.stage.truncate(old + n);
                Ok(InputReady::Data)
            },
            Ok(None) => {
                self.stage.truncate(old);
                Ok(InputReady::Timeout)
            },
            Err(e) => {
                self.stage.truncate(old);
                Err(e)
            },
        }
    }

    fn read(&mut self, buf: &mut PacketBuf, max: usize) -> Result<usize, TransportError> {
        let n = max.min(self.stage.len());
        buf.append(&self.stage[..n]);
        self.stage.advance(n);
        Ok(n)
    }

    async fn write(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        let io = self.io.as_mut().ok_or(TransportError::NotConnected)?;
        let n = io.write(data).await?;
        io.flush().await?;
        Ok(n)
    }

    fn mtu_hint(&self) -> Option<u16> {
        self.mtu_hint
    }
}
