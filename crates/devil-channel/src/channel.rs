//! A live connection to one DEVIL channel.
//!
//! The channel owns the RPC client, the notification subscription, the
//! registers described by its [`DeviceProfile`], and the stream multiplexer.
//! It never blocks: the owner calls [`Channel::on_readable`] whenever a
//! socket signals readiness, and consumers observe the result through
//! registered listeners.
//!
//! Handshake:
//!
//! ```text
//! Connecting ──notificationPort──▶ DiscoveringPorts ──streamPorts──▶
//! ReadingRegisters ──readRegister × N, streamAcquisitionConfig──▶ Ready
//! ```
//!
//! A `shutdown` notification moves the channel to `ShuttingDown` from any
//! state; terminal transport or protocol errors move it to `Failed`.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use rmpv::Value;
use tracing::{debug, error, info, trace, warn};

use crate::config::ChannelConfig;
use crate::discovery::ResourceDescriptor;
use crate::error::{ConflictError, Error, ProtocolError, Result};
use crate::mux::StreamMux;
use crate::profile::{DeviceProfile, ErrorCondition};
use crate::protocol::{self, Notification};
use crate::register::{Register, RegisterEvent};
use crate::rpc::{self, Completion, RpcClient};
use crate::socket::{Connector, Inbound, SocketKind, SocketToken, TransportSocket};
use crate::stream::{self, StreamPacket};

/// Handshake and lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Waiting for the notification port.
    Connecting,
    /// Waiting for the stream ports.
    DiscoveringPorts,
    /// Reading initial register values and acquisition config.
    ReadingRegisters,
    /// Fully synchronized.
    Ready,
    /// The device announced shutdown; all sockets are closed.
    ShuttingDown,
    /// A transport or protocol error ended the connection.
    Failed,
    /// Closed locally.
    Closed,
}

impl ChannelState {
    /// Whether the channel has released its sockets for good.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ChannelState::ShuttingDown | ChannelState::Failed | ChannelState::Closed
        )
    }
}

/// Time span and resolution of stream acquisitions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamAcquisitionConfig {
    /// Acquisition window length in seconds.
    pub time_span_seconds: f64,
    /// Samples per acquisition.
    pub points: u32,
}

impl StreamAcquisitionConfig {
    fn from_params(params: &[Value]) -> std::result::Result<Self, ProtocolError> {
        let bad = || ProtocolError::Malformed {
            what: "stream acquisition config",
            reason: format!("{params:?}"),
        };
        let time_span_seconds = params.first().and_then(protocol::as_number).ok_or_else(bad)?;
        let points = params
            .get(1)
            .and_then(Value::as_u64)
            .and_then(|p| u32::try_from(p).ok())
            .ok_or_else(bad)?;
        Ok(Self {
            time_span_seconds,
            points,
        })
    }
}

/// Who caused a register change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOrigin {
    /// A write made through this channel.
    Local,
    /// A value reported by the device.
    Remote,
}

/// Events delivered to channel listeners.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// Handshake finished; every register is synchronized.
    ConnectionReady,
    /// The device is going away; the channel has closed everything.
    ShuttingDown,
    /// The connection died.
    ConnectionFailed {
        /// What went wrong.
        reason: String,
    },
    /// A register value changed.
    RegisterChanged {
        /// Register index.
        index: u16,
        /// New value in the register's signedness.
        value: i32,
        /// Source of the change.
        origin: ChangeOrigin,
    },
    /// A register write was rejected and the value is being re-read.
    RegisterDesynchronized {
        /// Register index.
        index: u16,
    },
    /// A stream packet arrived.
    StreamPacketReceived(Arc<StreamPacket>),
    /// A stream subscription was torn down by an error.
    StreamFailed {
        /// Stream index.
        stream_idx: u16,
        /// What went wrong.
        reason: String,
    },
    /// The device reported a new acquisition config.
    StreamAcquisitionConfigChanged(StreamAcquisitionConfig),
    /// The active error conditions changed.
    ErrorConditionsChanged(Vec<ErrorCondition>),
}

/// Handle returned by [`Channel::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Box<dyn FnMut(&ChannelEvent) + Send>;

/// What to do with the result of an RPC call.
#[derive(Debug)]
enum Continuation {
    NotificationPort,
    StreamPorts,
    ReadRegister {
        index: u16,
        remaining: VecDeque<u16>,
        then: AfterRead,
    },
    ModifyRegister {
        index: u16,
    },
    StreamAcquisitionConfig,
    SetStreamAcquisitionConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AfterRead {
    ReadStreamAcquisitionConfig,
    Nothing,
}

impl Continuation {
    fn is_handshake(&self) -> bool {
        match self {
            Continuation::NotificationPort
            | Continuation::StreamPorts
            | Continuation::StreamAcquisitionConfig => true,
            Continuation::ReadRegister { then, .. } => *then == AfterRead::ReadStreamAcquisitionConfig,
            Continuation::ModifyRegister { .. } | Continuation::SetStreamAcquisitionConfig => false,
        }
    }
}

/// Client side of one device channel.
pub struct Channel<C: Connector> {
    connector: C,
    config: ChannelConfig,
    host: String,
    resource: ResourceDescriptor,
    profile: DeviceProfile,
    state: ChannelState,
    rpc: RpcClient<C::Link, Continuation>,
    notifications: Option<TransportSocket<C::Link>>,
    registers: BTreeMap<u16, Register>,
    streams: StreamMux<C::Link>,
    stream_acquisition_config: Option<StreamAcquisitionConfig>,
    error_conditions: Vec<ErrorCondition>,
    listeners: Vec<(ListenerId, Listener)>,
    next_listener_id: u64,
}

impl<C: Connector> fmt::Debug for Channel<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("host", &self.host)
            .field("dev_id", &self.resource.dev_id)
            .field("state", &self.state)
            .field("pending_rpc", &self.rpc.pending())
            .field("open_streams", &self.streams.open_streams())
            .finish()
    }
}

impl<C: Connector> Channel<C> {
    /// Connect to the device advertised as `resource` on `host` and start
    /// the handshake.
    pub fn connect(
        mut connector: C,
        host: &str,
        resource: ResourceDescriptor,
        profile: DeviceProfile,
        config: ChannelConfig,
    ) -> Result<Self> {
        let endpoint = config.endpoint(host, resource.port);
        let socket =
            TransportSocket::connect(&mut connector, SocketKind::Request, &endpoint, SocketToken::Rpc)?;

        let registers = profile
            .registers
            .iter()
            .map(|spec| (spec.index, Register::new(spec.index, spec.signed)))
            .collect();

        let mut channel = Self {
            connector,
            config,
            host: host.to_string(),
            resource,
            profile,
            state: ChannelState::Connecting,
            rpc: RpcClient::new(socket),
            notifications: None,
            registers,
            streams: StreamMux::new(),
            stream_acquisition_config: None,
            error_conditions: Vec::new(),
            listeners: Vec::new(),
            next_listener_id: 1,
        };
        info!(endpoint = %endpoint, device = %channel.resource, "connecting to channel");
        channel
            .rpc
            .invoke("notificationPort", vec![], Some(Continuation::NotificationPort))?;
        Ok(channel)
    }

    // ------------------------------------------------------------------
    // Observers
    // ------------------------------------------------------------------

    /// Register a listener for channel events.
    pub fn subscribe<F>(&mut self, listener: F) -> ListenerId
    where
        F: FnMut(&ChannelEvent) + Send + 'static,
    {
        let id = ListenerId(self.next_listener_id);
        self.next_listener_id += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.len() != before
    }

    fn emit(&mut self, event: ChannelEvent) {
        trace!(event = ?event, "channel event");
        for (_, listener) in self.listeners.iter_mut() {
            listener(&event);
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Current lifecycle state.
    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// Whether the handshake has completed.
    pub fn is_ready(&self) -> bool {
        self.state == ChannelState::Ready
    }

    /// Descriptor of the connected device.
    pub fn resource(&self) -> &ResourceDescriptor {
        &self.resource
    }

    /// Device profile in use.
    pub fn profile(&self) -> &DeviceProfile {
        &self.profile
    }

    /// Host the channel connects to.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Register with the given index.
    pub fn register(&self, index: u16) -> Option<&Register> {
        self.registers.get(&index)
    }

    /// Register with the given profile name.
    pub fn register_by_name(&self, name: &str) -> Option<&Register> {
        let index = self.profile.register(name)?.index;
        self.registers.get(&index)
    }

    /// All registers, ordered by index.
    pub fn registers(&self) -> impl Iterator<Item = &Register> {
        self.registers.values()
    }

    /// Last known stream acquisition config.
    pub fn stream_acquisition_config(&self) -> Option<StreamAcquisitionConfig> {
        self.stream_acquisition_config
    }

    /// Error conditions currently reported by the device.
    pub fn error_conditions(&self) -> &[ErrorCondition] {
        &self.error_conditions
    }

    /// Number of streams the device publishes (zero before discovery).
    pub fn stream_count(&self) -> usize {
        self.streams.stream_count()
    }

    /// Whether a subscriber socket is open for `stream_idx`.
    pub fn is_stream_open(&self, stream_idx: u16) -> bool {
        self.streams.is_open(stream_idx)
    }

    /// Subscriber count of `stream_idx`.
    pub fn stream_subscribers(&self, stream_idx: u16) -> usize {
        self.streams.ref_count(stream_idx)
    }

    /// RPC calls queued or in flight.
    pub fn pending_calls(&self) -> usize {
        self.rpc.pending()
    }

    // ------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------

    fn ensure_open(&self) -> Result<()> {
        if self.state.is_terminal() {
            return Err(Error::ChannelClosed);
        }
        Ok(())
    }

    /// Write a register value. The local value changes immediately and the
    /// write is forwarded to the device. Writes to registers that are not
    /// synchronized yet are ignored; values outside the register's 16-bit
    /// range are rejected.
    pub fn set_register(&mut self, index: u16, value: i32) -> Result<()> {
        self.ensure_open()?;
        let register = self
            .registers
            .get_mut(&index)
            .ok_or(Error::UnknownRegister(index))?;
        if !register.accepts(value) {
            return Err(Error::ValueOutOfRange { index, value });
        }
        let events = register.set_from_local_change(value);
        self.apply_register_events(index, events)
    }

    /// Write a register by profile name.
    pub fn set_register_by_name(&mut self, name: &str, value: i32) -> Result<()> {
        let index = self
            .profile
            .register(name)
            .map(|r| r.index)
            .ok_or_else(|| Error::Config(format!("no register named {name}")))?;
        self.set_register(index, value)
    }

    /// Ask the device to use a new acquisition config. Returns `false` if the
    /// config is already in effect and nothing was sent.
    pub fn set_stream_acquisition_config(&mut self, config: StreamAcquisitionConfig) -> Result<bool> {
        self.ensure_open()?;
        if self.stream_acquisition_config == Some(config) {
            return Ok(false);
        }
        self.invoke(
            "setStreamAcquisitionConfig",
            vec![Value::F64(config.time_span_seconds), Value::from(config.points)],
            Some(Continuation::SetStreamAcquisitionConfig),
        )?;
        Ok(true)
    }

    /// Add a consumer of `stream_idx`, opening its socket if it is the first.
    pub fn add_stream_subscription(&mut self, stream_idx: u16) -> Result<()> {
        self.ensure_open()?;
        if self.streams.stream_count() == 0 {
            return Err(Error::NotReady("stream ports not discovered yet"));
        }
        self.streams.add_subscription(&mut self.connector, stream_idx)?;
        Ok(())
    }

    /// Remove a consumer of `stream_idx`. Safe to call after the channel has
    /// already closed every stream.
    pub fn remove_stream_subscription(&mut self, stream_idx: u16) {
        self.streams.remove_subscription(stream_idx);
    }

    /// Close every socket without waiting for the device.
    pub fn close(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        self.close_sockets();
        self.state = ChannelState::Closed;
        info!(dev_id = %self.resource.dev_id, "channel closed");
    }

    fn close_sockets(&mut self) {
        self.rpc.close();
        if let Some(mut socket) = self.notifications.take() {
            socket.close();
        }
        self.streams.close_all();
    }

    fn fail(&mut self, reason: String) {
        if self.state.is_terminal() {
            return;
        }
        error!(dev_id = %self.resource.dev_id, reason = %reason, "channel failed");
        self.close_sockets();
        self.state = ChannelState::Failed;
        self.emit(ChannelEvent::ConnectionFailed { reason });
    }

    fn shutdown(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        info!(dev_id = %self.resource.dev_id, "remote shutdown");
        self.close_sockets();
        self.state = ChannelState::ShuttingDown;
        self.emit(ChannelEvent::ShuttingDown);
    }

    fn set_state(&mut self, state: ChannelState) {
        debug!(from = ?self.state, to = ?state, "channel state");
        self.state = state;
    }

    fn invoke(&mut self, method: &str, args: Vec<Value>, then: Option<Continuation>) -> Result<()> {
        match self.rpc.invoke(method, args, then) {
            Ok(()) => Ok(()),
            Err(e) => {
                if e.is_terminal() {
                    self.fail(format!("{method}: {e}"));
                }
                Err(e)
            }
        }
    }

    // ------------------------------------------------------------------
    // Readiness dispatch
    // ------------------------------------------------------------------

    /// Process everything currently available on the socket for `token`.
    pub fn on_readable(&mut self, token: SocketToken) {
        match token {
            SocketToken::Rpc => self.drain_rpc(),
            SocketToken::Notification => self.drain_notifications(),
            SocketToken::Stream(idx) => self.drain_stream(idx),
        }
    }

    fn drain_rpc(&mut self) {
        loop {
            match self.rpc.poll_completion() {
                Ok(Some(completion)) => self.handle_completion(completion),
                Ok(None) => return,
                Err(e) => {
                    self.fail(format!("RPC socket error: {e}"));
                    return;
                }
            }
        }
    }

    fn drain_notifications(&mut self) {
        loop {
            let next = match self.notifications.as_mut() {
                Some(socket) => socket.poll_next(),
                None => return,
            };
            match next {
                Ok(Some(Inbound::Message(payload))) | Ok(Some(Inbound::Response(payload))) => {
                    self.handle_notification(&payload)
                }
                Ok(None) => return,
                Err(e) => {
                    self.fail(format!("notification socket error: {e}"));
                    return;
                }
            }
        }
    }

    fn drain_stream(&mut self, stream_idx: u16) {
        loop {
            let payload = match self.streams.poll_next(stream_idx) {
                Ok(Some(payload)) => payload,
                Ok(None) => return,
                Err(e) => {
                    self.stream_failed(stream_idx, format!("socket error: {e}"));
                    return;
                }
            };
            match stream::decode_stream_message(stream_idx, &payload) {
                Ok(packet) => self.emit(ChannelEvent::StreamPacketReceived(Arc::new(packet))),
                Err(Error::SampleFormat(e)) => {
                    warn!(stream = stream_idx, error = %e, "dropping stream packet");
                }
                Err(e) => {
                    self.stream_failed(stream_idx, e.to_string());
                    return;
                }
            }
        }
    }

    fn stream_failed(&mut self, stream_idx: u16, reason: String) {
        warn!(stream = stream_idx, reason = %reason, "closing stream subscription");
        self.streams.drop_subscription(stream_idx);
        self.emit(ChannelEvent::StreamFailed { stream_idx, reason });
    }

    // ------------------------------------------------------------------
    // RPC completions
    // ------------------------------------------------------------------

    fn handle_completion(&mut self, completion: Completion<Continuation>) {
        let Completion {
            method,
            on_result,
            outcome,
        } = completion;

        let Some(then) = on_result else {
            if let Err(e) = outcome {
                if e.is_terminal() {
                    self.fail(format!("{method}: {e}"));
                }
            }
            return;
        };

        if let Continuation::ModifyRegister { index } = then {
            self.finish_register_write(index, outcome);
            return;
        }

        let value = match outcome {
            Ok(value) => value,
            Err(e) => {
                if e.is_terminal() || then.is_handshake() {
                    self.fail(format!("{method}: {e}"));
                } else {
                    warn!(method = %method, error = %e, "RPC call failed");
                }
                return;
            }
        };

        let result = match then {
            Continuation::NotificationPort => self.got_notification_port(&value),
            Continuation::StreamPorts => self.got_stream_ports(&value),
            Continuation::ReadRegister {
                index,
                remaining,
                then,
            } => self.got_register_value(index, &value, remaining, then),
            Continuation::StreamAcquisitionConfig => self.got_stream_acquisition_config(&value),
            Continuation::SetStreamAcquisitionConfig => Ok(()),
            Continuation::ModifyRegister { .. } => Ok(()),
        };
        if let Err(e) = result {
            self.fail(format!("{method}: {e}"));
        }
    }

    fn got_notification_port(&mut self, value: &Value) -> Result<()> {
        let port = as_port(value).ok_or_else(|| rpc::malformed("notification port", value))?;
        let endpoint = self.config.endpoint(&self.host, port);
        let socket = TransportSocket::connect(
            &mut self.connector,
            SocketKind::Subscriber,
            &endpoint,
            SocketToken::Notification,
        )?;
        self.notifications = Some(socket);
        self.set_state(ChannelState::DiscoveringPorts);
        self.invoke("streamPorts", vec![], Some(Continuation::StreamPorts))
    }

    fn got_stream_ports(&mut self, value: &Value) -> Result<()> {
        let ports = value
            .as_array()
            .ok_or_else(|| rpc::malformed("stream ports", value))?
            .iter()
            .map(|p| as_port(p).ok_or_else(|| rpc::malformed("stream port", p)))
            .collect::<Result<Vec<_>>>()?;
        debug!(ports = ?ports, "stream ports");
        let endpoints = ports
            .into_iter()
            .map(|port| self.config.endpoint(&self.host, port))
            .collect();
        self.streams.set_endpoints(endpoints);
        self.set_state(ChannelState::ReadingRegisters);

        let indices = self.profile.registers.iter().map(|r| r.index).collect();
        self.read_registers(indices, AfterRead::ReadStreamAcquisitionConfig)
    }

    /// Read registers one after another; each read is issued when the
    /// previous one completes.
    fn read_registers(&mut self, mut remaining: VecDeque<u16>, then: AfterRead) -> Result<()> {
        let Some(index) = remaining.pop_front() else {
            return match then {
                AfterRead::ReadStreamAcquisitionConfig => self.invoke(
                    "streamAcquisitionConfig",
                    vec![],
                    Some(Continuation::StreamAcquisitionConfig),
                ),
                AfterRead::Nothing => Ok(()),
            };
        };
        self.invoke(
            "readRegister",
            vec![Value::from(index)],
            Some(Continuation::ReadRegister {
                index,
                remaining,
                then,
            }),
        )
    }

    fn got_register_value(
        &mut self,
        index: u16,
        value: &Value,
        remaining: VecDeque<u16>,
        then: AfterRead,
    ) -> Result<()> {
        let raw = as_raw(value).ok_or_else(|| rpc::malformed("register value", value))?;
        if let Some(register) = self.registers.get_mut(&index) {
            let events = register.set_from_remote_query(raw);
            self.apply_register_events(index, events)?;
        }
        self.read_registers(remaining, then)
    }

    fn got_stream_acquisition_config(&mut self, value: &Value) -> Result<()> {
        let params = value
            .as_array()
            .ok_or_else(|| rpc::malformed("stream acquisition config", value))?;
        let config = StreamAcquisitionConfig::from_params(params)?;
        self.stream_acquisition_config = Some(config);
        self.set_state(ChannelState::Ready);
        info!(dev_id = %self.resource.dev_id, "connection ready");
        self.emit(ChannelEvent::ConnectionReady);
        Ok(())
    }

    fn finish_register_write(&mut self, index: u16, outcome: Result<Value>) {
        let reason = match outcome {
            Ok(value) if protocol::is_truthy(&value) => {
                trace!(index = index, "register write accepted");
                return;
            }
            Ok(other) => format!("remote returned {other}"),
            Err(Error::Rpc(e)) => e.message,
            Err(e) => {
                self.fail(format!("modifyRegister: {e}"));
                return;
            }
        };
        self.register_conflict(ConflictError { index, reason });
    }

    fn register_conflict(&mut self, conflict: ConflictError) {
        warn!(error = %conflict, "register conflict, re-reading");
        let index = conflict.index;
        let Some(register) = self.registers.get_mut(&index) else {
            return;
        };
        let events = register.mark_as_desynchronized();
        if let Err(e) = self.apply_register_events(index, events) {
            warn!(error = %e, "failed to report desynchronized register");
        }
        if let Err(e) = self.read_registers(VecDeque::from([index]), AfterRead::Nothing) {
            warn!(index = index, error = %e, "failed to re-read register");
        }
    }

    fn apply_register_events(&mut self, index: u16, events: Vec<RegisterEvent>) -> Result<()> {
        let mut origin = ChangeOrigin::Remote;
        for event in events {
            match event {
                RegisterEvent::ChangedLocally { old_raw, new_raw } => {
                    origin = ChangeOrigin::Local;
                    self.invoke(
                        "modifyRegister",
                        vec![Value::from(index), Value::from(old_raw), Value::from(new_raw)],
                        Some(Continuation::ModifyRegister { index }),
                    )?;
                }
                RegisterEvent::ChangedRemotely(_) => origin = ChangeOrigin::Remote,
                RegisterEvent::Changed(value) => {
                    self.emit(ChannelEvent::RegisterChanged {
                        index,
                        value,
                        origin,
                    });
                    if self.profile.condition_register == Some(index) {
                        self.update_error_conditions(value);
                    }
                }
                RegisterEvent::Desynchronized => {
                    self.emit(ChannelEvent::RegisterDesynchronized { index });
                }
            }
        }
        Ok(())
    }

    fn update_error_conditions(&mut self, value: i32) {
        self.error_conditions = self.profile.active_error_conditions(value as u32);
        let conditions = self.error_conditions.clone();
        self.emit(ChannelEvent::ErrorConditionsChanged(conditions));
    }

    // ------------------------------------------------------------------
    // Notifications
    // ------------------------------------------------------------------

    fn handle_notification(&mut self, payload: &[u8]) {
        let notification = match protocol::decode_notification(payload) {
            Ok(n) => n,
            Err(e) => {
                self.fail(format!("error while handling notification: {e}"));
                return;
            }
        };
        if let Err(e) = self.dispatch_notification(notification) {
            self.fail(format!("error while handling notification: {e}"));
        }
    }

    fn dispatch_notification(&mut self, notification: Notification) -> Result<()> {
        let Notification { method, params } = notification;
        match method.as_str() {
            "registerChanged" => {
                let (index, raw) = match params.as_slice() {
                    [idx, value] => (
                        idx.as_u64().and_then(|i| u16::try_from(i).ok()),
                        as_raw(value),
                    ),
                    _ => (None, None),
                };
                let (Some(index), Some(raw)) = (index, raw) else {
                    return Err(ProtocolError::Malformed {
                        what: "registerChanged",
                        reason: format!("{params:?}"),
                    }
                    .into());
                };
                let Some(register) = self.registers.get_mut(&index) else {
                    warn!(index = index, "change notification for unknown register");
                    return Ok(());
                };
                let events = register.set_from_remote_notification(raw);
                self.apply_register_events(index, events)
            }
            "streamAcquisitionConfigChanged" => {
                let config = StreamAcquisitionConfig::from_params(&params)?;
                self.stream_acquisition_config = Some(config);
                self.emit(ChannelEvent::StreamAcquisitionConfigChanged(config));
                Ok(())
            }
            "shutdown" => {
                self.shutdown();
                Ok(())
            }
            _ => {
                let err = ProtocolError::UnknownNotification(method);
                warn!(error = %err, params = ?params, "received unknown notification type");
                Ok(())
            }
        }
    }
}

fn as_port(value: &Value) -> Option<u16> {
    value.as_u64().and_then(|p| u16::try_from(p).ok())
}

fn as_raw(value: &Value) -> Option<u32> {
    value.as_u64().and_then(|v| u32::try_from(v).ok())
}
