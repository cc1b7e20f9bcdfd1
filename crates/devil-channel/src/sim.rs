//! In-memory network for exercising the client without a device.
//!
//! [`SimNetwork`] plays the remote side: tests inject responses,
//! notifications and stream packets per [`SocketToken`] and inspect what the
//! client sent. Links opened through [`SimNetwork::connector`] share its state.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use rmpv::Value;

use crate::error::TransportError;
use crate::protocol;
use crate::socket::{Connector, Link, SocketKind, SocketToken};

#[derive(Debug)]
struct SimSocket {
    endpoint: String,
    kind: SocketKind,
    generation: u64,
    inbound: VecDeque<Bytes>,
    sent: Vec<Bytes>,
    error: Option<String>,
    closed: bool,
}

#[derive(Debug, Default)]
struct SimState {
    sockets: HashMap<SocketToken, SimSocket>,
    next_generation: u64,
    ready: VecDeque<SocketToken>,
    refuse: Vec<String>,
    opened: Vec<(SocketToken, String)>,
}

/// Shared in-memory network.
#[derive(Debug, Clone, Default)]
pub struct SimNetwork {
    state: Arc<Mutex<SimState>>,
}

impl SimNetwork {
    /// Creates an empty network.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Connector whose links live on this network.
    pub fn connector(&self) -> SimConnector {
        SimConnector { net: self.clone() }
    }

    /// Make future connection attempts to `endpoint` fail.
    pub fn refuse(&self, endpoint: &str) {
        self.lock().refuse.push(endpoint.to_string());
    }

    /// Queue an inbound message on the live socket for `token` and signal
    /// readiness. Messages for absent or closed sockets are dropped.
    pub fn deliver(&self, token: SocketToken, payload: Vec<u8>) {
        let mut state = self.lock();
        let delivered = match state.sockets.get_mut(&token) {
            Some(socket) if !socket.closed => {
                socket.inbound.push_back(Bytes::from(payload));
                true
            }
            _ => false,
        };
        if delivered {
            state.ready.push_back(token);
        }
    }

    /// Deliver a msgpack-rpc response on the RPC socket.
    pub fn respond(&self, result: Value) {
        if let Ok(bytes) = protocol::encode_response(None, result) {
            self.deliver(SocketToken::Rpc, bytes);
        }
    }

    /// Deliver a msgpack-rpc error response on the RPC socket.
    pub fn respond_error(&self, message: &str) {
        if let Ok(bytes) = protocol::encode_response(Some(message), Value::Nil) {
            self.deliver(SocketToken::Rpc, bytes);
        }
    }

    /// Publish a notification on the socket for `token`.
    pub fn notify(&self, token: SocketToken, method: &str, params: Vec<Value>) {
        if let Ok(bytes) = protocol::encode_notification(method, params) {
            self.deliver(token, bytes);
        }
    }

    /// Make the next receive on `token` fail with `reason`.
    pub fn fail(&self, token: SocketToken, reason: &str) {
        let mut state = self.lock();
        if let Some(socket) = state.sockets.get_mut(&token) {
            socket.error = Some(reason.to_string());
            state.ready.push_back(token);
        }
    }

    /// Pop the oldest pending readiness signal.
    pub fn take_ready(&self) -> Option<SocketToken> {
        self.lock().ready.pop_front()
    }

    /// Everything the client sent on `token`'s current socket.
    pub fn sent(&self, token: SocketToken) -> Vec<Bytes> {
        self.lock()
            .sockets
            .get(&token)
            .map(|s| s.sent.clone())
            .unwrap_or_default()
    }

    /// Decoded `(method, args)` of every request sent on the RPC socket.
    pub fn requests(&self) -> Vec<(String, Vec<Value>)> {
        self.sent(SocketToken::Rpc)
            .iter()
            .filter_map(|b| protocol::decode_value(b).ok())
            .filter_map(|v| match v {
                Value::Array(mut items) if items.len() == 4 => {
                    let args = match items.pop() {
                        Some(Value::Array(a)) => a,
                        _ => Vec::new(),
                    };
                    let method = items.pop()?.as_str()?.to_string();
                    Some((method, args))
                }
                _ => None,
            })
            .collect()
    }

    /// Method names of every request sent on the RPC socket.
    pub fn request_methods(&self) -> Vec<String> {
        self.requests().into_iter().map(|(m, _)| m).collect()
    }

    /// Whether a socket for `token` exists and is not closed.
    pub fn is_open(&self, token: SocketToken) -> bool {
        self.lock()
            .sockets
            .get(&token)
            .map(|s| !s.closed)
            .unwrap_or(false)
    }

    /// Whether the socket for `token` was opened and later closed.
    pub fn is_closed(&self, token: SocketToken) -> bool {
        self.lock()
            .sockets
            .get(&token)
            .map(|s| s.closed)
            .unwrap_or(false)
    }

    /// Endpoint the socket for `token` connected to.
    pub fn endpoint(&self, token: SocketToken) -> Option<String> {
        self.lock().sockets.get(&token).map(|s| s.endpoint.clone())
    }

    /// Kind of the socket for `token`.
    pub fn kind(&self, token: SocketToken) -> Option<SocketKind> {
        self.lock().sockets.get(&token).map(|s| s.kind)
    }

    /// How many times a socket for `token` was opened.
    pub fn open_count(&self, token: SocketToken) -> usize {
        self.lock().opened.iter().filter(|(t, _)| *t == token).count()
    }
}

/// [`Connector`] for [`SimNetwork`].
#[derive(Debug, Clone)]
pub struct SimConnector {
    net: SimNetwork,
}

impl Connector for SimConnector {
    type Link = SimLink;

    fn open(
        &mut self,
        kind: SocketKind,
        endpoint: &str,
        token: SocketToken,
    ) -> Result<SimLink, TransportError> {
        let mut state = self.net.lock();
        if state.refuse.iter().any(|e| e == endpoint) {
            return Err(TransportError::ConnectFailed {
                endpoint: endpoint.to_string(),
                reason: "connection refused".to_string(),
            });
        }
        state.next_generation += 1;
        let generation = state.next_generation;
        state.sockets.insert(
            token,
            SimSocket {
                endpoint: endpoint.to_string(),
                kind,
                generation,
                inbound: VecDeque::new(),
                sent: Vec::new(),
                error: None,
                closed: false,
            },
        );
        state.opened.push((token, endpoint.to_string()));
        Ok(SimLink {
            token,
            generation,
            net: self.net.clone(),
        })
    }
}

/// One end of a simulated socket.
#[derive(Debug)]
pub struct SimLink {
    token: SocketToken,
    generation: u64,
    net: SimNetwork,
}

impl SimLink {
    fn with_socket<T>(&self, f: impl FnOnce(&mut SimSocket) -> T) -> Option<T> {
        let mut state = self.net.lock();
        state
            .sockets
            .get_mut(&self.token)
            .filter(|s| s.generation == self.generation)
            .map(f)
    }
}

impl Link for SimLink {
    fn send(&mut self, payload: Bytes) -> io::Result<()> {
        self.with_socket(|s| s.sent.push(payload))
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "socket replaced"))
    }

    fn try_recv(&mut self) -> io::Result<Bytes> {
        self.with_socket(|s| {
            if let Some(reason) = s.error.take() {
                return Err(io::Error::new(io::ErrorKind::ConnectionReset, reason));
            }
            s.inbound
                .pop_front()
                .ok_or_else(|| io::Error::from(io::ErrorKind::WouldBlock))
        })
        .unwrap_or_else(|| Err(io::Error::from(io::ErrorKind::WouldBlock)))
    }

    fn close(&mut self) {
        self.with_socket(|s| s.closed = true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deliver_signals_readiness() {
        let net = SimNetwork::new();
        let mut connector = net.connector();
        let mut link = connector
            .open(SocketKind::Subscriber, "tcp://h:1", SocketToken::Notification)
            .unwrap();
        net.deliver(SocketToken::Notification, vec![1, 2]);
        assert_eq!(net.take_ready(), Some(SocketToken::Notification));
        assert_eq!(link.try_recv().unwrap(), Bytes::from_static(&[1, 2]));
        let err = link.try_recv().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }

    #[test]
    fn test_stale_link_does_not_touch_reopened_socket() {
        let net = SimNetwork::new();
        let mut connector = net.connector();
        let mut old = connector
            .open(SocketKind::Subscriber, "tcp://h:1", SocketToken::Stream(0))
            .unwrap();
        old.close();
        let _new = connector
            .open(SocketKind::Subscriber, "tcp://h:1", SocketToken::Stream(0))
            .unwrap();
        old.close();
        assert!(net.is_open(SocketToken::Stream(0)));
        assert_eq!(net.open_count(SocketToken::Stream(0)), 2);
    }

    #[test]
    fn test_refused_endpoint() {
        let net = SimNetwork::new();
        net.refuse("tcp://h:9");
        let mut connector = net.connector();
        let err = connector
            .open(SocketKind::Request, "tcp://h:9", SocketToken::Rpc)
            .unwrap_err();
        assert!(matches!(err, TransportError::ConnectFailed { .. }));
    }
}
