#![warn(missing_docs)]

//! DEVIL client core: pipelined msgpack-rpc over ZeroMQ, optimistic register
//! synchronization, reference-counted stream subscriptions

pub mod channel;
pub mod config;
pub mod discovery;
pub mod driver;
pub mod error;
pub mod mux;
pub mod profile;
pub mod protocol;
pub mod register;
pub mod rpc;
pub mod sim;
pub mod socket;
pub mod stream;
pub mod zmq;

pub use channel::{Channel, ChannelEvent, ChannelState, ChangeOrigin, ListenerId, StreamAcquisitionConfig};
pub use config::ChannelConfig;
pub use discovery::{Admission, DeviceDirectory, ResourceDescriptor, SemVer};
pub use driver::{connect_zmq, ChannelDriver, ChannelHandle};
pub use error::{Error, Result};
pub use profile::DeviceProfile;
pub use register::Register;
pub use socket::{Connector, Link, SocketKind, SocketToken};
pub use stream::StreamPacket;
