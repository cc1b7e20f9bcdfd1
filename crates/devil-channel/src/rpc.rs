//! Pipelined msgpack-rpc client.
//!
//! Calls are queued in order and sent one at a time over a single request
//! socket. The transport carries no usable request identifier, so the
//! response that arrives is always attributed to the head of the queue.

use std::collections::VecDeque;

use bytes::Bytes;
use rmpv::Value;
use tracing::{debug, warn};

use crate::error::{Error, ProtocolError, RpcError, TransportError};
use crate::protocol;
use crate::socket::{Inbound, Link, TransportSocket};

/// A queued call awaiting dispatch or its response.
#[derive(Debug)]
pub struct PendingCall<C> {
    method: String,
    request: Bytes,
    on_result: Option<C>,
}

impl<C> PendingCall<C> {
    /// Method name of the call.
    pub fn method(&self) -> &str {
        &self.method
    }
}

/// Outcome of the call at the head of the queue.
#[derive(Debug)]
pub struct Completion<C> {
    /// Method of the completed call.
    pub method: String,
    /// Continuation registered with [`RpcClient::invoke`].
    pub on_result: Option<C>,
    /// Result value, or the error the call failed with.
    pub outcome: Result<Value, Error>,
}

/// Request/response client over one [`TransportSocket`].
///
/// `C` is the continuation stored with each call; the owner interprets it
/// when the call completes.
pub struct RpcClient<L: Link, C> {
    socket: TransportSocket<L>,
    queue: VecDeque<PendingCall<C>>,
    in_flight: bool,
}

impl<L: Link, C> RpcClient<L, C> {
    /// Wrap an already connected request socket.
    pub fn new(socket: TransportSocket<L>) -> Self {
        Self {
            socket,
            queue: VecDeque::new(),
            in_flight: false,
        }
    }

    /// Queue a call. It is sent immediately if nothing is in flight.
    pub fn invoke(
        &mut self,
        method: &str,
        args: Vec<Value>,
        on_result: Option<C>,
    ) -> Result<(), Error> {
        if self.socket.is_closed() {
            return Err(TransportError::Closed {
                endpoint: self.socket.endpoint().to_string(),
            }
            .into());
        }
        let request = Bytes::from(protocol::encode_request(method, args)?);
        debug!(method = method, queued = self.queue.len(), "rpc invoke");
        self.queue.push_back(PendingCall {
            method: method.to_string(),
            request,
            on_result,
        });
        if !self.in_flight {
            self.dispatch_head()?;
        }
        Ok(())
    }

    fn dispatch_head(&mut self) -> Result<(), Error> {
        let Some(head) = self.queue.front() else {
            return Ok(());
        };
        self.socket.request(head.request.clone())?;
        self.in_flight = true;
        Ok(())
    }

    /// Read the next response from the socket, if one is available.
    ///
    /// Call repeatedly after a readiness signal until it returns `Ok(None)`.
    /// Any response, well-formed or not, completes the head call; the next
    /// queued call is dispatched before returning. Transport errors are
    /// returned as `Err` and leave the queue untouched.
    pub fn poll_completion(&mut self) -> Result<Option<Completion<C>>, TransportError> {
        loop {
            let payload = match self.socket.poll_next()? {
                None => return Ok(None),
                Some(Inbound::Response(payload)) => payload,
                Some(Inbound::Message(payload)) => {
                    warn!(
                        endpoint = %self.socket.endpoint(),
                        len = payload.len(),
                        "unhandled message on RPC socket"
                    );
                    continue;
                }
            };

            let Some(head) = self.queue.pop_front() else {
                warn!("RPC response with no pending call");
                self.in_flight = false;
                continue;
            };
            self.in_flight = false;

            let outcome = match protocol::decode_response(&payload) {
                Ok(resp) => match resp.error {
                    Some(message) => Err(Error::Rpc(RpcError {
                        method: head.method.clone(),
                        message,
                    })),
                    None => Ok(resp.result),
                },
                Err(e) => Err(Error::Protocol(e)),
            };
            if let Err(e) = &outcome {
                warn!(method = %head.method, error = %e, "RPC error");
            }

            if !self.queue.is_empty() {
                if let Err(e) = self.dispatch_head() {
                    warn!(error = %e, "failed to dispatch next RPC request");
                    return Err(match e {
                        Error::Transport(t) => t,
                        other => TransportError::IoError(std::io::Error::other(other.to_string())),
                    });
                }
            }

            return Ok(Some(Completion {
                method: head.method,
                on_result: head.on_result,
                outcome,
            }));
        }
    }

    /// Number of calls not yet completed, including the one in flight.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Whether a call is waiting for its response.
    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    /// Close the socket. Pending calls are abandoned without completion.
    pub fn close(&mut self) -> bool {
        let abandoned = self.queue.len();
        self.queue.clear();
        self.in_flight = false;
        let closed = self.socket.close();
        if closed && abandoned > 0 {
            debug!(abandoned = abandoned, "closed RPC socket with pending calls");
        }
        closed
    }

    /// Whether the socket has been closed.
    pub fn is_closed(&self) -> bool {
        self.socket.is_closed()
    }
}

/// Decode an RPC result that should be a protocol-level error instead.
pub(crate) fn malformed(what: &'static str, value: &Value) -> Error {
    Error::Protocol(ProtocolError::Malformed {
        what,
        reason: format!("unexpected value {value}"),
    })
}
