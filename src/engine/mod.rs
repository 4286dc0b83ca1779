// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The protocol engine.
//!
//! One engine owns one transport, one pair of packet accumulators and at
//! most one in-flight [`Object`]. All protocol progress happens inside
//! [`Engine::work`], driven by the host from a single task; events are
//! delivered synchronously to the host's [`EventHandler`] while `work`
//! runs.

pub mod buffer;
pub mod error;
pub(crate) mod msg;

use std::time::Duration;

use bitflags::bitflags;
use tracing::debug;

use crate::{
    engine::{buffer::PacketBuf, error::ObexError},
    models::{
        event::{DataDirection, Event, Mode, RspMode, State, Substate, WorkStatus},
        frame::{CommonFrame, ConnectFrame, DEFAULT_MTU, FRAME_LEN, MINIMUM_MTU},
        opcode::{FINAL_MASK, Opcode},
        response::ResponseCode,
        srm::SrmFlags,
    },
    object::Object,
    state_machine,
    transport::{InputReady, Interface, Transport, TransportError},
    utils::HexPreview,
};

bitflags! {
    /// Options fixed at engine construction.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct InitFlags: u32 {
        /// Retain the listening endpoint after accepting a connection and
        /// let the host decide when to accept (`AcceptHint`).
        const KEEP_SERVER = 1 << 0;
        /// Filter discovered devices by the OBEX hint bit.
        const FILTER_HINT = 1 << 1;
        /// Filter discovered devices by service name.
        const FILTER_IAS = 1 << 2;
        /// Open new descriptors close-on-exec.
        const CLOEXEC = 1 << 3;
        /// Open new descriptors non-blocking.
        const NONBLOCK = 1 << 4;
    }
}

bitflags! {
    /// Hex-dump switches, taken from `OBEX_DUMP` at construction.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DumpFlags: u8 {
        const TX = 1 << 0;
        const RX = 1 << 1;
    }
}

impl DumpFlags {
    /// Read `OBEX_DUMP` (bit 0 = TX, bit 1 = RX).
    pub fn from_env() -> Self {
        std::env::var("OBEX_DUMP")
            .ok()
            .and_then(|v| v.parse::<u8>().ok())
            .map(Self::from_bits_truncate)
            .unwrap_or_default()
    }
}

/// Everything the host may look at or touch while an event is delivered.
pub struct EventCtx<'a> {
    pub event: Event,
    pub mode: Mode,
    pub command: Opcode,
    pub response: Option<ResponseCode>,
    /// The transferred object; absent for `AcceptHint` and engine-level
    /// link errors.
    pub object: Option<&'a mut Object>,
    /// Body fragment for `StreamAvail`; an empty slice is end-of-stream.
    pub stream_data: Option<&'a [u8]>,
    /// Response mode, switchable at the documented events.
    pub rsp_mode: &'a mut RspMode,
}

pub trait EventHandler: Send {
    fn on_event(&mut self, ctx: EventCtx<'_>);
}

impl<F> EventHandler for F
where F: FnMut(EventCtx<'_>) + Send
{
    fn on_event(&mut self, ctx: EventCtx<'_>) {
        self(ctx)
    }
}

/// Outcome of the input half of one work step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StepInput {
    Progress,
    Timeout,
}

pub struct Engine {
    pub(crate) mtu_rx: u16,
    pub(crate) mtu_tx: u16,
    pub(crate) mtu_tx_max: u16,

    pub(crate) state: State,
    pub(crate) substate: Substate,
    pub(crate) mode: Mode,
    pub(crate) rsp_mode: RspMode,

    pub(crate) init_flags: InitFlags,
    pub(crate) srm_flags: SrmFlags,

    pub(crate) rx_buf: PacketBuf,
    pub(crate) tx_buf: PacketBuf,

    pub(crate) object: Option<Object>,
    pub(crate) handler: Box<dyn EventHandler>,
    pub(crate) transport: Box<dyn Transport>,
    pub(crate) interfaces: Vec<Interface>,

    pub(crate) timeout: Option<Duration>,
    pub(crate) dump: DumpFlags,
}

impl Engine {
    pub fn new(
        transport: impl Transport + 'static,
        handler: impl EventHandler + 'static,
        flags: InitFlags,
    ) -> Self {
        Self {
            mtu_rx: DEFAULT_MTU,
            mtu_tx: MINIMUM_MTU,
            mtu_tx_max: DEFAULT_MTU,
            state: State::Idle,
            substate: Substate::Rx,
            mode: Mode::Server,
            rsp_mode: RspMode::Normal,
            init_flags: flags,
            srm_flags: SrmFlags::empty(),
            rx_buf: PacketBuf::with_capacity(usize::from(DEFAULT_MTU)),
            tx_buf: PacketBuf::with_capacity(usize::from(DEFAULT_MTU)),
            object: None,
            handler: Box::new(handler),
            transport: Box::new(transport),
            interfaces: Vec::new(),
            timeout: None,
            dump: DumpFlags::from_env(),
        }
    }

    /// Drop the transport connection and the in-flight object, if any.
    pub async fn cleanup(&mut self) {
        let _ = self.transport.disconnect().await;
        self.object = None;
        self.rx_buf.clear();
        self.tx_buf.clear();
    }

    // ---- configuration ---------------------------------------------------

    /// Set receive MTU and the cap for the negotiated transmit MTU. Both
    /// must hold at least a minimum-sized packet; rejected while a request
    /// is in flight.
    pub fn set_mtu(&mut self, mtu_rx: u16, mtu_tx_max: u16) -> Result<(), ObexError> {
        if self.object.is_some() {
            return Err(ObexError::Busy);
        }
        if mtu_rx < MINIMUM_MTU {
            return Err(ObexError::InvalidMtu(mtu_rx));
        }
        if mtu_tx_max < MINIMUM_MTU {
            return Err(ObexError::InvalidMtu(mtu_tx_max));
        }
        self.mtu_rx = mtu_rx;
        self.mtu_tx_max = mtu_tx_max;
        Ok(())
    }

    /// Read-side timeout in milliseconds; negative means infinite.
    pub fn set_timeout(&mut self, ms: i64) {
        self.timeout = u64::try_from(ms).ok().map(Duration::from_millis);
    }

    /// Switch between Normal and Single response mode. Affects the current
    /// object when called from `Progress` (client) or `ReqHint` /
    /// `ReqCheck` (server).
    pub fn set_response_mode(&mut self, mode: RspMode) {
        self.rsp_mode = mode;
        if let Some(object) = self.object.as_mut() {
            object.rsp_mode = mode;
        }
    }

    #[inline]
    pub fn response_mode(&self) -> RspMode {
        self.rsp_mode
    }

    #[inline]
    pub fn mtu_rx(&self) -> u16 {
        self.mtu_rx
    }

    #[inline]
    pub fn mtu_tx(&self) -> u16 {
        self.mtu_tx
    }

    #[inline]
    pub fn is_idle(&self) -> bool {
        self.state == State::Idle
    }

    #[inline]
    pub fn has_object(&self) -> bool {
        self.object.is_some()
    }

    // ---- objects ---------------------------------------------------------

    /// Create an object for `cmd`. CONNECT objects get their 4-byte frame
    /// (version, flags, receive MTU) attached up front.
    pub fn new_object(&self, cmd: Opcode) -> Object {
        let mut object = Object::new(cmd, self.mtu_tx);
        if cmd == Opcode::Connect {
            object.tx_pre = Some(ConnectFrame::new(self.mtu_rx).encode());
        }
        object
    }

    /// Submit a request. The engine owns the object from here until the
    /// terminal event.
    pub fn request(&mut self, mut object: Object) -> Result<(), ObexError> {
        if self.object.is_some() {
            return Err(ObexError::Busy);
        }
        object.rsp_mode = self.rsp_mode;
        self.object = Some(object);
        self.mode = Mode::Client;
        self.state = State::Request;
        self.substate = Substate::TxPrepare;
        Ok(())
    }

    /// Cancel the in-flight transaction. `nice` sends a protocol ABORT at
    /// the next packet boundary; otherwise the engine drops everything,
    /// disconnects and reports `Abort` followed by `LinkErr`.
    pub async fn cancel(&mut self, nice: bool) {
        if self.object.is_none() {
            return;
        }
        if nice {
            if let Some(object) = self.object.as_mut() {
                object.abort = true;
            }
            return;
        }
        let cmd = self.current_cmd();
        self.deliver_event(Event::Abort, cmd, None, true);
        self.tx_buf.clear();
        self.rx_buf.clear();
        // Without an ABORT on the wire the peer is out of sync; tear the
        // link down before telling the host.
        let _ = self.transport.disconnect().await;
        self.deliver_event(Event::LinkErr, cmd, None, false);
        self.mode = Mode::Server;
        self.state = State::Idle;
        self.substate = Substate::Rx;
    }

    /// Suspend the in-flight object.
    pub fn suspend_request(&mut self) -> Result<(), ObexError> {
        self.object
            .as_mut()
            .map(Object::suspend)
            .ok_or(ObexError::InvalidArgument("no object in flight"))
    }

    /// Resume a suspended object.
    pub fn resume_request(&mut self) -> Result<(), ObexError> {
        self.object
            .as_mut()
            .map(Object::resume)
            .ok_or(ObexError::InvalidArgument("no object in flight"))
    }

    // ---- transport control ----------------------------------------------

    pub async fn transport_connect(&mut self) -> Result<(), ObexError> {
        if self.object.is_some() {
            return Err(ObexError::Busy);
        }
        self.transport.connect().await?;
        self.apply_mtu_hint();
        Ok(())
    }

    pub async fn transport_listen(&mut self) -> Result<(), ObexError> {
        self.transport.listen().await?;
        Ok(())
    }

    pub async fn transport_disconnect(&mut self) -> Result<(), ObexError> {
        self.transport.disconnect().await?;
        Ok(())
    }

    /// Promote a pending inbound connection, keeping the listener open when
    /// KEEP_SERVER was requested. Call from `AcceptHint`.
    pub async fn accept(&mut self) -> Result<(), ObexError> {
        let keep = self.init_flags.contains(InitFlags::KEEP_SERVER);
        self.transport.accept(keep).await?;
        self.apply_mtu_hint();
        Ok(())
    }

    /// Feed bytes into the engine for caller-pumped transports.
    pub fn feed_data(&mut self, data: &[u8]) {
        self.rx_buf.append(data);
    }

    /// Refresh the interface list from the transport.
    pub fn enumerate_interfaces(&mut self) -> usize {
        self.interfaces = self.transport.find_interfaces();
        self.interfaces.len()
    }

    #[inline]
    pub fn interfaces(&self) -> &[Interface] {
        &self.interfaces
    }

    /// Connect to a previously discovered interface.
    pub async fn interface_connect(&mut self, index: usize) -> Result<(), ObexError> {
        if self.object.is_some() {
            return Err(ObexError::Busy);
        }
        let intf = self
            .interfaces
            .get(index)
            .ok_or(ObexError::InvalidArgument("interface index out of range"))?
            .clone();
        self.transport.select_interface(&intf)?;
        self.transport.connect().await?;
        self.apply_mtu_hint();
        Ok(())
    }

    fn apply_mtu_hint(&mut self) {
        if let Some(hint) = self.transport.mtu_hint() {
            self.mtu_tx = hint.min(self.mtu_tx_max).max(MINIMUM_MTU);
        }
    }

    // ---- the work loop ---------------------------------------------------

    /// What the next `work` call will do.
    pub fn data_direction(&self) -> DataDirection {
        if self.state == State::Idle {
            return DataDirection::In;
        }
        match self.substate {
            Substate::Rx => DataDirection::In,
            Substate::Tx => DataDirection::Out,
            Substate::TxPrepare => DataDirection::None,
        }
    }

    /// Run one step of the protocol: read or transmit as the current state
    /// requires, then let the active state machine act on it.
    pub async fn work(&mut self) -> Result<WorkStatus, ObexError> {
        if self.state == State::Idle {
            match self.handle_input_step().await? {
                StepInput::Timeout => return Ok(WorkStatus::Timeout),
                StepInput::Progress => {},
            }
        } else if self.substate == Substate::Rx {
            if self.check_srm_input().await? {
                match self.handle_input_step().await? {
                    StepInput::Timeout => return Ok(WorkStatus::Timeout),
                    StepInput::Progress => {},
                }
            }
        } else if self.substate == Substate::Tx && !self.msg_tx_empty() {
            if let Err(e) = self.transmit_step().await {
                let cmd = self.current_cmd();
                self.deliver_event(Event::LinkErr, cmd, None, true);
                self.mode = Mode::Server;
                self.state = State::Idle;
                return Err(ObexError::Transport(e));
            }
            if !self.msg_tx_empty() {
                return Ok(WorkStatus::Timeout);
            }
        }

        state_machine::step(self).await
    }

    /// The blocking driver built on `work`: process one inbound packet,
    /// then keep working with an infinite timeout until the engine needs
    /// input again or the transaction is over.
    pub async fn handle_input(&mut self, timeout_ms: i64) -> Result<WorkStatus, ObexError> {
        let old = self.timeout;
        self.set_timeout(timeout_ms);

        if self.data_direction() == DataDirection::In {
            match self.work().await {
                Ok(WorkStatus::Progress) => {},
                other => {
                    self.timeout = old;
                    return other;
                },
            }
        }

        self.timeout = None;
        let mut result = Ok(WorkStatus::Progress);
        while self.state != State::Idle && self.data_direction() != DataDirection::In {
            match self.work().await {
                Ok(WorkStatus::Progress) => {},
                other => {
                    result = other;
                    break;
                },
            }
        }

        self.timeout = old;
        result
    }

    // ---- internals shared with the state machines ------------------------

    pub(crate) fn current_cmd(&self) -> Opcode {
        self.object.as_ref().map_or(Opcode::Abort, |o| o.cmd)
    }

    /// Deliver an event to the host. With `delete_object` the object is
    /// detached first and dropped right after the callback returns.
    pub(crate) fn deliver_event(
        &mut self,
        event: Event,
        cmd: Opcode,
        rsp: Option<ResponseCode>,
        delete_object: bool,
    ) {
        let Self {
            handler,
            object,
            rsp_mode,
            mode,
            ..
        } = self;
        let mut taken = if delete_object { object.take() } else { None };
        let obj_ref = if delete_object {
            taken.as_mut()
        } else {
            object.as_mut()
        };
        handler.on_event(EventCtx {
            event,
            mode: *mode,
            command: cmd,
            response: rsp,
            object: obj_ref,
            stream_data: None,
            rsp_mode,
        });
    }

    /// Wait for transport input and pull what arrived into the RX buffer.
    pub(crate) async fn handle_input_step(&mut self) -> Result<StepInput, ObexError> {
        let timeout = self.timeout;
        match self.transport.handle_input(timeout).await {
            Err(e) => Err(self.link_error(e)),
            Ok(InputReady::Timeout) => Ok(StepInput::Timeout),
            Ok(InputReady::Accept) => {
                debug!("data available on the listening endpoint");
                if self.init_flags.contains(InitFlags::KEEP_SERVER) {
                    self.deliver_event(Event::AcceptHint, Opcode::Connect, None, false);
                } else {
                    let accepted = self.transport.accept(false).await;
                    if let Err(e) = accepted {
                        return Err(self.link_error(e));
                    }
                    self.apply_mtu_hint();
                }
                Ok(StepInput::Progress)
            },
            Ok(InputReady::Data) => self.data_indication(),
        }
    }

    /// Read a message from the transport into the RX buffer. Returns
    /// `Timeout` while the packet is still incomplete and nothing more is
    /// readily available.
    pub(crate) fn data_indication(&mut self) -> Result<StepInput, ObexError> {
        if self.rx_buf.len() < FRAME_LEN {
            let need = FRAME_LEN - self.rx_buf.len();
            let n = self.read_some(need)?;
            debug!("got {n} bytes");
            if n == 0 && self.rx_buf.len() < FRAME_LEN {
                return Ok(StepInput::Timeout);
            }
        }

        let Some(frame) = CommonFrame::peek(self.rx_buf.as_slice()) else {
            // Still less than a common frame; wait for more.
            return Ok(StepInput::Progress);
        };
        let size = frame.total_len();
        if size < FRAME_LEN {
            let err = crate::models::header::ParseError::ShortPacket {
                available: size,
            };
            let cmd = self.current_cmd();
            self.rx_buf.clear();
            self.deliver_event(Event::ParseErr, cmd, None, true);
            self.mode = Mode::Server;
            self.state = State::Idle;
            return Err(ObexError::Parse(err));
        }

        if self.rx_buf.len() < size {
            let need = size - self.rx_buf.len();
            let n = self.read_some(need)?;
            if n == 0 && self.rx_buf.len() < size {
                return Ok(StepInput::Timeout);
            }
        }

        if self.rx_buf.len() < size {
            // Fragmented packet; the rest will arrive later.
            debug!("need more data, size={size}, have={}", self.rx_buf.len());
            return Ok(StepInput::Progress);
        }

        if self.dump.contains(DumpFlags::RX) {
            debug!("Rx {:?}", HexPreview(&self.rx_buf.as_slice()[..size]));
        }
        Ok(StepInput::Progress)
    }

    fn read_some(&mut self, max: usize) -> Result<usize, ObexError> {
        let Self {
            transport, rx_buf, ..
        } = self;
        match transport.read(rx_buf, max) {
            Ok(n) => Ok(n),
            Err(e) => Err(self.link_error(e)),
        }
    }

    /// Report a dead link: event to the host, engine back to idle.
    pub(crate) fn link_error(&mut self, err: TransportError) -> ObexError {
        let cmd = self.current_cmd();
        self.deliver_event(Event::LinkErr, cmd, None, true);
        self.mode = Mode::Server;
        self.state = State::Idle;
        ObexError::Transport(err)
    }

    /// In Single mode the sending side keeps transmitting unless told to
    /// wait; probe for input without blocking and fall back to packet
    /// preparation when the peer is silent. Returns whether the regular
    /// input wait should still run.
    pub(crate) async fn check_srm_input(&mut self) -> Result<bool, ObexError> {
        let single = self
            .object
            .as_ref()
            .is_some_and(|o| o.rsp_mode == RspMode::Single);
        let sending_side = (self.mode == Mode::Client && self.state == State::Request)
            || (self.mode == Mode::Server && self.state == State::Response);
        if !single
            || self.srm_flags.contains(SrmFlags::WAIT_LOCAL)
            || !sending_side
        {
            return Ok(true);
        }

        match self.transport.handle_input(Some(Duration::ZERO)).await {
            Err(e) => Err(self.link_error(e)),
            Ok(InputReady::Timeout) => {
                self.substate = Substate::TxPrepare;
                Ok(false)
            },
            Ok(InputReady::Data) => {
                self.data_indication()?;
                Ok(false)
            },
            Ok(InputReady::Accept) => Ok(false),
        }
    }

    /// Push TX buffer bytes to the transport; partial writes leave the
    /// rest for the next step.
    pub(crate) async fn transmit_step(&mut self) -> Result<(), TransportError> {
        let Self {
            transport, tx_buf, ..
        } = self;
        if tx_buf.is_empty() {
            return Ok(());
        }
        let n = transport.write(tx_buf.as_slice()).await?;
        tx_buf.pull(n);
        Ok(())
    }

    /// Send a bare 3-byte response immediately (error replies and ABORT
    /// acknowledgements that bypass the object machinery).
    pub(crate) async fn respond_simple(&mut self, rsp: ResponseCode) -> Result<(), ObexError> {
        let opcode = rsp.raw() | FINAL_MASK;
        self.tx_buf.clear();
        self.tx_buf.append(&[opcode, 0x00, 0x03]);
        if self.dump.contains(DumpFlags::TX) {
            debug!("Tx {:?}", HexPreview(self.tx_buf.as_slice()));
        }
        while !self.msg_tx_empty() {
            if let Err(e) = self.transmit_step().await {
                return Err(self.link_error(e));
            }
        }
        Ok(())
    }

    /// Queue a bare command packet (client-side ABORT).
    pub(crate) fn prepare_simple_command(&mut self, cmd: Opcode) {
        self.tx_buf.clear();
        self.tx_buf.append(&[cmd as u8 | FINAL_MASK, 0x00, 0x03]);
        if self.dump.contains(DumpFlags::TX) {
            debug!("Tx {:?}", HexPreview(self.tx_buf.as_slice()));
        }
    }
}
