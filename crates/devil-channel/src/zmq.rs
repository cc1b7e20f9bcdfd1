//! ZeroMQ links on the tokio runtime.
//!
//! Each link runs a background task owning the actual `zeromq` socket. Inbound
//! messages are queued on an unbounded channel and announced on the shared
//! readiness channel, so the owner can poll every link without blocking.

use std::io;

use bytes::Bytes;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use zeromq::{ReqSocket, Socket, SocketRecv, SocketSend, SubSocket, ZmqMessage};

use crate::error::TransportError;
use crate::socket::{Connector, Link, SocketKind, SocketToken};

const SUPPORTED_SCHEMES: &[&str] = &["tcp://", "ipc://"];

/// Opens ZeroMQ links and reports their readiness on one channel.
#[derive(Debug, Clone)]
pub struct ZmqConnector {
    runtime: Handle,
    ready: mpsc::UnboundedSender<SocketToken>,
}

impl ZmqConnector {
    /// Creates a connector spawning its tasks on the current tokio runtime.
    pub fn new(ready: mpsc::UnboundedSender<SocketToken>) -> Result<Self, TransportError> {
        let runtime = Handle::try_current().map_err(|e| TransportError::IoError(io::Error::other(e)))?;
        Ok(Self { runtime, ready })
    }

    /// Creates a connector spawning its tasks on `runtime`.
    pub fn with_runtime(runtime: Handle, ready: mpsc::UnboundedSender<SocketToken>) -> Self {
        Self { runtime, ready }
    }
}

impl Connector for ZmqConnector {
    type Link = ZmqLink;

    fn open(
        &mut self,
        kind: SocketKind,
        endpoint: &str,
        token: SocketToken,
    ) -> Result<ZmqLink, TransportError> {
        if !SUPPORTED_SCHEMES.iter().any(|s| endpoint.starts_with(s)) {
            return Err(TransportError::ConnectFailed {
                endpoint: endpoint.to_string(),
                reason: "unsupported transport scheme".to_string(),
            });
        }

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let notifier = Notifier {
            token,
            inbound: inbound_tx,
            ready: self.ready.clone(),
        };
        let endpoint = endpoint.to_string();

        let (outbound, task) = match kind {
            SocketKind::Request => {
                let (out_tx, out_rx) = mpsc::unbounded_channel();
                let task = self.runtime.spawn(run_request(endpoint, out_rx, notifier));
                (Some(out_tx), task)
            }
            SocketKind::Subscriber => (None, self.runtime.spawn(run_subscriber(endpoint, notifier))),
        };

        Ok(ZmqLink {
            token,
            outbound,
            inbound: inbound_rx,
            task,
        })
    }
}

/// A link backed by a ZeroMQ socket task.
#[derive(Debug)]
pub struct ZmqLink {
    token: SocketToken,
    outbound: Option<mpsc::UnboundedSender<Bytes>>,
    inbound: mpsc::UnboundedReceiver<io::Result<Bytes>>,
    task: JoinHandle<()>,
}

impl Link for ZmqLink {
    fn send(&mut self, payload: Bytes) -> io::Result<()> {
        let Some(outbound) = &self.outbound else {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "subscriber sockets cannot send",
            ));
        };
        outbound
            .send(payload)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "socket task stopped"))
    }

    fn try_recv(&mut self) -> io::Result<Bytes> {
        match self.inbound.try_recv() {
            Ok(result) => result,
            Err(TryRecvError::Empty) => Err(io::Error::from(io::ErrorKind::WouldBlock)),
            Err(TryRecvError::Disconnected) => Err(io::Error::new(
                io::ErrorKind::ConnectionAborted,
                "socket task stopped",
            )),
        }
    }

    fn close(&mut self) {
        self.outbound = None;
        self.task.abort();
        debug!(token = %self.token, "zmq link closed");
    }
}

impl Drop for ZmqLink {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct Notifier {
    token: SocketToken,
    inbound: mpsc::UnboundedSender<io::Result<Bytes>>,
    ready: mpsc::UnboundedSender<SocketToken>,
}

impl Notifier {
    /// Queue an inbound item. Returns `false` once the link is gone.
    fn push(&self, item: io::Result<Bytes>) -> bool {
        if self.inbound.send(item).is_err() {
            return false;
        }
        self.ready.send(self.token).is_ok()
    }

    fn fail(&self, endpoint: &str, what: &str, err: zeromq::ZmqError) {
        warn!(token = %self.token, endpoint = endpoint, error = %err, "zmq {}", what);
        self.push(Err(io::Error::new(
            io::ErrorKind::ConnectionReset,
            format!("{what}: {err}"),
        )));
    }
}

fn flatten(message: ZmqMessage) -> Bytes {
    let mut frames = message.into_vec();
    if frames.len() == 1 {
        frames.remove(0)
    } else {
        Bytes::from(frames.concat())
    }
}

async fn run_request(endpoint: String, mut outbound: mpsc::UnboundedReceiver<Bytes>, notifier: Notifier) {
    let mut socket = ReqSocket::new();
    if let Err(e) = socket.connect(&endpoint).await {
        notifier.fail(&endpoint, "connect failed", e);
        return;
    }
    debug!(endpoint = %endpoint, "zmq request socket connected");

    while let Some(payload) = outbound.recv().await {
        if let Err(e) = socket.send(ZmqMessage::from(payload.to_vec())).await {
            notifier.fail(&endpoint, "send failed", e);
            return;
        }
        match socket.recv().await {
            Ok(message) => {
                if !notifier.push(Ok(flatten(message))) {
                    return;
                }
            }
            Err(e) => {
                notifier.fail(&endpoint, "receive failed", e);
                return;
            }
        }
    }
}

async fn run_subscriber(endpoint: String, notifier: Notifier) {
    let mut socket = SubSocket::new();
    if let Err(e) = socket.connect(&endpoint).await {
        notifier.fail(&endpoint, "connect failed", e);
        return;
    }
    if let Err(e) = socket.subscribe("").await {
        notifier.fail(&endpoint, "subscribe failed", e);
        return;
    }
    debug!(endpoint = %endpoint, "zmq subscriber connected");

    loop {
        match socket.recv().await {
            Ok(message) => {
                if !notifier.push(Ok(flatten(message))) {
                    return;
                }
            }
            Err(e) => {
                notifier.fail(&endpoint, "receive failed", e);
                return;
            }
        }
    }
}
