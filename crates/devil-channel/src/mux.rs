//! Reference-counted stream subscriptions.
//!
//! Each stream the device publishes has its own endpoint. A subscriber
//! socket is open for a stream exactly while at least one consumer is
//! interested in it.

use std::collections::BTreeMap;

use bytes::Bytes;
use tracing::{debug, info};

use crate::error::{Error, TransportError};
use crate::socket::{Connector, Inbound, Link, SocketKind, SocketToken, TransportSocket};

/// Subscription state for one stream index.
#[derive(Debug)]
pub struct StreamSubscription<L: Link> {
    stream_idx: u16,
    socket: TransportSocket<L>,
    subscribers: usize,
}

impl<L: Link> StreamSubscription<L> {
    /// Stream index.
    pub fn stream_idx(&self) -> u16 {
        self.stream_idx
    }

    /// Number of interested consumers.
    pub fn subscribers(&self) -> usize {
        self.subscribers
    }
}

/// Opens and closes per-stream subscriber sockets on demand.
#[derive(Debug)]
pub struct StreamMux<L: Link> {
    endpoints: Vec<String>,
    subscriptions: BTreeMap<u16, StreamSubscription<L>>,
}

impl<L: Link> Default for StreamMux<L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: Link> StreamMux<L> {
    /// Creates a multiplexer that knows no streams yet.
    pub fn new() -> Self {
        Self {
            endpoints: Vec::new(),
            subscriptions: BTreeMap::new(),
        }
    }

    /// Set the published endpoint of every stream, indexed by stream.
    pub fn set_endpoints(&mut self, endpoints: Vec<String>) {
        self.endpoints = endpoints;
    }

    /// Number of streams the device publishes.
    pub fn stream_count(&self) -> usize {
        self.endpoints.len()
    }

    /// Register interest in `stream_idx`, opening its socket on the first
    /// subscriber. Returns `true` if a socket was opened.
    pub fn add_subscription<C>(&mut self, connector: &mut C, stream_idx: u16) -> Result<bool, Error>
    where
        C: Connector<Link = L>,
    {
        if let Some(sub) = self.subscriptions.get_mut(&stream_idx) {
            sub.subscribers += 1;
            debug!(stream = stream_idx, subscribers = sub.subscribers, "stream subscriber added");
            return Ok(false);
        }

        let endpoint = self
            .endpoints
            .get(usize::from(stream_idx))
            .ok_or(Error::UnknownStream(stream_idx))?;
        let socket = TransportSocket::connect(
            connector,
            SocketKind::Subscriber,
            endpoint,
            SocketToken::Stream(stream_idx),
        )?;
        info!(stream = stream_idx, endpoint = %endpoint, "stream subscription opened");
        self.subscriptions.insert(
            stream_idx,
            StreamSubscription {
                stream_idx,
                socket,
                subscribers: 1,
            },
        );
        Ok(true)
    }

    /// Drop one subscriber of `stream_idx`, closing its socket when none
    /// remain. Returns `true` if a socket was closed.
    ///
    /// Removing a subscription that is not open is a no-op, so consumers may
    /// unsubscribe after the channel already tore everything down.
    pub fn remove_subscription(&mut self, stream_idx: u16) -> bool {
        let Some(sub) = self.subscriptions.get_mut(&stream_idx) else {
            debug!(stream = stream_idx, "remove for stream without subscription ignored");
            return false;
        };
        sub.subscribers -= 1;
        if sub.subscribers > 0 {
            return false;
        }
        if let Some(mut sub) = self.subscriptions.remove(&stream_idx) {
            sub.socket.close();
        }
        info!(stream = stream_idx, "stream subscription closed");
        true
    }

    /// Close `stream_idx` regardless of how many consumers it has. Used when
    /// the stream's connection failed.
    pub fn drop_subscription(&mut self, stream_idx: u16) -> bool {
        match self.subscriptions.remove(&stream_idx) {
            Some(mut sub) => {
                sub.socket.close();
                info!(stream = stream_idx, subscribers = sub.subscribers, "stream subscription dropped");
                true
            }
            None => false,
        }
    }

    /// Whether a subscriber socket is open for `stream_idx`.
    pub fn is_open(&self, stream_idx: u16) -> bool {
        self.subscriptions
            .get(&stream_idx)
            .map(|s| !s.socket.is_closed())
            .unwrap_or(false)
    }

    /// Current subscriber count of `stream_idx`.
    pub fn ref_count(&self, stream_idx: u16) -> usize {
        self.subscriptions
            .get(&stream_idx)
            .map(|s| s.subscribers)
            .unwrap_or(0)
    }

    /// Indices of all open streams.
    pub fn open_streams(&self) -> Vec<u16> {
        self.subscriptions.keys().copied().collect()
    }

    /// Next message waiting on the socket of `stream_idx`.
    pub fn poll_next(&mut self, stream_idx: u16) -> Result<Option<Bytes>, TransportError> {
        let Some(sub) = self.subscriptions.get_mut(&stream_idx) else {
            return Ok(None);
        };
        match sub.socket.poll_next()? {
            Some(Inbound::Message(payload)) | Some(Inbound::Response(payload)) => Ok(Some(payload)),
            None => Ok(None),
        }
    }

    /// Close every open subscription and forget all subscriber counts.
    /// Returns the number of sockets closed.
    pub fn close_all(&mut self) -> usize {
        let closed = self.subscriptions.len();
        for (_, mut sub) in std::mem::take(&mut self.subscriptions) {
            sub.socket.close();
        }
        if closed > 0 {
            debug!(closed = closed, "closed all stream subscriptions");
        }
        closed
    }
}
