//! Non-blocking transport sockets.
//!
//! A [`Link`] is the raw, substrate-specific connection (a ZeroMQ socket, an
//! in-memory pipe). [`TransportSocket`] wraps one link and adds the
//! request/response routing and close bookkeeping every owner needs.
//!
//! Readiness is signalled out of band: a [`Connector`] hands each link the
//! [`SocketToken`] it was opened for, and the link reports that token whenever
//! inbound data may be available. The owner must then drain the socket
//! completely, because subscriber sockets do not re-signal per message.

use std::fmt;
use std::io;

use bytes::Bytes;
use tracing::{debug, warn};

use crate::error::TransportError;

/// Identifies which socket of a channel became readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocketToken {
    /// The request/response RPC socket.
    Rpc,
    /// The notification subscriber socket.
    Notification,
    /// A stream subscriber socket for the given stream index.
    Stream(u16),
}

impl fmt::Display for SocketToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SocketToken::Rpc => write!(f, "rpc"),
            SocketToken::Notification => write!(f, "notification"),
            SocketToken::Stream(idx) => write!(f, "stream[{idx}]"),
        }
    }
}

/// Messaging pattern of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketKind {
    /// Strict send/receive alternation.
    Request,
    /// Receive-only, subscribed to every topic.
    Subscriber,
}

/// Raw, non-blocking message connection.
pub trait Link: Send {
    /// Queue a message for sending.
    fn send(&mut self, payload: Bytes) -> io::Result<()>;

    /// Take the next inbound message.
    ///
    /// Returns an error of kind [`io::ErrorKind::WouldBlock`] when nothing is
    /// available right now.
    fn try_recv(&mut self) -> io::Result<Bytes>;

    /// Release the underlying connection.
    fn close(&mut self);
}

/// Opens links and wires them to the owner's readiness notifications.
pub trait Connector {
    /// Link type produced by this connector.
    type Link: Link;

    /// Connect a new link of `kind` to `endpoint`; readiness for it is
    /// reported with `token`.
    fn open(
        &mut self,
        kind: SocketKind,
        endpoint: &str,
        token: SocketToken,
    ) -> Result<Self::Link, TransportError>;
}

/// One inbound message, routed by the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// First message after a [`TransportSocket::request`].
    Response(Bytes),
    /// Any other message.
    Message(Bytes),
}

/// Event-driven wrapper around a single link.
pub struct TransportSocket<L: Link> {
    link: L,
    endpoint: String,
    awaiting_response: bool,
    closed: bool,
}

impl<L: Link> fmt::Debug for TransportSocket<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportSocket")
            .field("endpoint", &self.endpoint)
            .field("awaiting_response", &self.awaiting_response)
            .field("closed", &self.closed)
            .finish()
    }
}

impl<L: Link> TransportSocket<L> {
    /// Open a socket through `connector`.
    pub fn connect<C>(
        connector: &mut C,
        kind: SocketKind,
        endpoint: &str,
        token: SocketToken,
    ) -> Result<Self, TransportError>
    where
        C: Connector<Link = L>,
    {
        let link = connector.open(kind, endpoint, token)?;
        debug!(endpoint = endpoint, token = %token, "socket connected");
        Ok(Self::from_link(link, endpoint))
    }

    /// Wrap an already connected link.
    pub fn from_link(link: L, endpoint: &str) -> Self {
        Self {
            link,
            endpoint: endpoint.to_string(),
            awaiting_response: false,
            closed: false,
        }
    }

    /// Remote endpoint this socket is connected to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Whether a request is waiting for its response.
    pub fn awaiting_response(&self) -> bool {
        self.awaiting_response
    }

    /// Fire-and-forget send.
    pub fn send(&mut self, payload: Bytes) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed {
                endpoint: self.endpoint.clone(),
            });
        }
        self.link.send(payload).map_err(TransportError::IoError)
    }

    /// Send `payload` and route the next inbound message as
    /// [`Inbound::Response`].
    pub fn request(&mut self, payload: Bytes) -> Result<(), TransportError> {
        if self.awaiting_response {
            return Err(TransportError::RequestInFlight {
                endpoint: self.endpoint.clone(),
            });
        }
        self.send(payload)?;
        self.awaiting_response = true;
        Ok(())
    }

    /// Take the next inbound message, if any.
    ///
    /// Returns `Ok(None)` once the socket is drained or closed; would-block
    /// conditions never surface as errors. Any other error leaves the socket
    /// unusable and the owner should close it.
    pub fn poll_next(&mut self) -> Result<Option<Inbound>, TransportError> {
        if self.closed {
            return Ok(None);
        }
        match self.link.try_recv() {
            Ok(payload) => {
                if self.awaiting_response {
                    self.awaiting_response = false;
                    Ok(Some(Inbound::Response(payload)))
                } else {
                    Ok(Some(Inbound::Message(payload)))
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => {
                warn!(endpoint = %self.endpoint, error = %e, "socket error");
                self.awaiting_response = false;
                Err(TransportError::IoError(e))
            }
        }
    }

    /// Release the connection. Returns `false` if it was already closed.
    pub fn close(&mut self) -> bool {
        if self.closed {
            return false;
        }
        self.closed = true;
        self.awaiting_response = false;
        self.link.close();
        debug!(endpoint = %self.endpoint, "socket closed");
        true
    }
}

impl<L: Link> Drop for TransportSocket<L> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimNetwork;

    fn rpc_socket(net: &SimNetwork) -> TransportSocket<crate::sim::SimLink> {
        let mut connector = net.connector();
        TransportSocket::connect(
            &mut connector,
            SocketKind::Request,
            "tcp://10.0.0.1:5000",
            SocketToken::Rpc,
        )
        .unwrap()
    }

    #[test]
    fn test_request_routes_next_message_as_response() {
        let net = SimNetwork::new();
        let mut socket = rpc_socket(&net);
        socket.request(Bytes::from_static(b"ping")).unwrap();
        assert!(socket.awaiting_response());

        net.deliver(SocketToken::Rpc, b"pong".to_vec());
        net.deliver(SocketToken::Rpc, b"extra".to_vec());

        assert_eq!(
            socket.poll_next().unwrap(),
            Some(Inbound::Response(Bytes::from_static(b"pong")))
        );
        assert_eq!(
            socket.poll_next().unwrap(),
            Some(Inbound::Message(Bytes::from_static(b"extra")))
        );
        assert_eq!(socket.poll_next().unwrap(), None);
    }

    #[test]
    fn test_second_request_while_in_flight_is_rejected() {
        let net = SimNetwork::new();
        let mut socket = rpc_socket(&net);
        socket.request(Bytes::from_static(b"a")).unwrap();
        let err = socket.request(Bytes::from_static(b"b")).unwrap_err();
        assert!(matches!(err, TransportError::RequestInFlight { .. }));
        assert_eq!(net.sent(SocketToken::Rpc).len(), 1);
    }

    #[test]
    fn test_close_is_idempotent() {
        let net = SimNetwork::new();
        let mut socket = rpc_socket(&net);
        assert!(socket.close());
        assert!(!socket.close());
        assert!(socket.is_closed());
        assert!(net.is_closed(SocketToken::Rpc));
    }

    #[test]
    fn test_closed_socket_rejects_send_and_yields_nothing() {
        let net = SimNetwork::new();
        let mut socket = rpc_socket(&net);
        net.deliver(SocketToken::Rpc, b"late".to_vec());
        socket.close();
        assert!(matches!(
            socket.send(Bytes::from_static(b"x")),
            Err(TransportError::Closed { .. })
        ));
        assert_eq!(socket.poll_next().unwrap(), None);
    }

    #[test]
    fn test_link_error_surfaces() {
        let net = SimNetwork::new();
        let mut socket = rpc_socket(&net);
        net.fail(SocketToken::Rpc, "connection refused");
        let err = socket.poll_next().unwrap_err();
        assert!(matches!(err, TransportError::IoError(_)));
    }
}
