//! Async driver owning a [`Channel`].
//!
//! The channel itself is single-threaded and non-blocking. The driver runs it
//! on one task, feeding it readiness signals and commands from any number of
//! [`ChannelHandle`]s, and forwards channel events to an `mpsc` receiver.

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::channel::{Channel, ChannelEvent, ChannelState, StreamAcquisitionConfig};
use crate::config::ChannelConfig;
use crate::discovery::ResourceDescriptor;
use crate::error::{Error, Result};
use crate::profile::DeviceProfile;
use crate::socket::{Connector, SocketToken};
use crate::zmq::ZmqConnector;

#[derive(Debug)]
enum Command {
    SetRegister {
        index: u16,
        value: i32,
        reply: oneshot::Sender<Result<()>>,
    },
    SetStreamAcquisitionConfig {
        config: StreamAcquisitionConfig,
        reply: oneshot::Sender<Result<bool>>,
    },
    AddStreamSubscription {
        stream_idx: u16,
        reply: oneshot::Sender<Result<()>>,
    },
    RemoveStreamSubscription {
        stream_idx: u16,
    },
    Close,
}

/// Cloneable handle for controlling a driven channel from other tasks.
#[derive(Debug, Clone)]
pub struct ChannelHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl ChannelHandle {
    fn send(&self, command: Command) -> Result<()> {
        self.commands.send(command).map_err(|_| Error::ChannelClosed)
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<Result<T>>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.send(make(reply))?;
        rx.await.map_err(|_| Error::ChannelClosed)?
    }

    /// Write a register value.
    pub async fn set_register(&self, index: u16, value: i32) -> Result<()> {
        self.request(|reply| Command::SetRegister {
            index,
            value,
            reply,
        })
        .await
    }

    /// Request a new stream acquisition config. Returns `false` if it was
    /// already in effect.
    pub async fn set_stream_acquisition_config(&self, config: StreamAcquisitionConfig) -> Result<bool> {
        self.request(|reply| Command::SetStreamAcquisitionConfig { config, reply })
            .await
    }

    /// Subscribe to a stream.
    pub async fn add_stream_subscription(&self, stream_idx: u16) -> Result<()> {
        self.request(|reply| Command::AddStreamSubscription { stream_idx, reply })
            .await
    }

    /// Drop one subscription of a stream.
    pub fn remove_stream_subscription(&self, stream_idx: u16) -> Result<()> {
        self.send(Command::RemoveStreamSubscription { stream_idx })
    }

    /// Close the channel and stop the driver.
    pub fn close(&self) -> Result<()> {
        self.send(Command::Close)
    }
}

/// Runs one channel until it reaches a terminal state.
pub struct ChannelDriver<C: Connector> {
    channel: Channel<C>,
    ready: mpsc::UnboundedReceiver<SocketToken>,
    commands: mpsc::UnboundedReceiver<Command>,
}

impl<C: Connector> ChannelDriver<C> {
    /// Wrap `channel`. `ready` must receive the readiness signals of the
    /// connector the channel was built with.
    pub fn new(
        mut channel: Channel<C>,
        ready: mpsc::UnboundedReceiver<SocketToken>,
    ) -> (Self, ChannelHandle, mpsc::UnboundedReceiver<ChannelEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        channel.subscribe(move |event| {
            let _ = events_tx.send(event.clone());
        });
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let driver = Self {
            channel,
            ready,
            commands: commands_rx,
        };
        (
            driver,
            ChannelHandle {
                commands: commands_tx,
            },
            events_rx,
        )
    }

    /// The driven channel.
    pub fn channel(&self) -> &Channel<C> {
        &self.channel
    }

    /// Process readiness and commands until the channel shuts down, fails or
    /// is closed. Returns the final state.
    pub async fn run(mut self) -> ChannelState {
        while !self.channel.state().is_terminal() {
            tokio::select! {
                token = self.ready.recv() => match token {
                    Some(token) => self.channel.on_readable(token),
                    None => {
                        debug!("readiness channel closed");
                        self.channel.close();
                    }
                },
                command = self.commands.recv() => match command {
                    Some(command) => self.execute(command),
                    None => {
                        debug!("all channel handles dropped");
                        self.channel.close();
                    }
                },
            }
        }
        info!(
            dev_id = %self.channel.resource().dev_id,
            state = ?self.channel.state(),
            "channel driver stopped"
        );
        self.channel.state()
    }

    fn execute(&mut self, command: Command) {
        match command {
            Command::SetRegister {
                index,
                value,
                reply,
            } => {
                let _ = reply.send(self.channel.set_register(index, value));
            }
            Command::SetStreamAcquisitionConfig { config, reply } => {
                let _ = reply.send(self.channel.set_stream_acquisition_config(config));
            }
            Command::AddStreamSubscription { stream_idx, reply } => {
                let _ = reply.send(self.channel.add_stream_subscription(stream_idx));
            }
            Command::RemoveStreamSubscription { stream_idx } => {
                self.channel.remove_stream_subscription(stream_idx);
            }
            Command::Close => self.channel.close(),
        }
    }
}

/// Connect to a device over ZeroMQ on the current tokio runtime.
pub fn connect_zmq(
    host: &str,
    resource: ResourceDescriptor,
    profile: DeviceProfile,
    config: ChannelConfig,
) -> Result<(
    ChannelDriver<ZmqConnector>,
    ChannelHandle,
    mpsc::UnboundedReceiver<ChannelEvent>,
)> {
    let (ready_tx, ready_rx) = mpsc::unbounded_channel();
    let connector = ZmqConnector::new(ready_tx)?;
    let channel = Channel::connect(connector, host, resource, profile, config)?;
    Ok(ChannelDriver::new(channel, ready_rx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rmpv::Value;

    use crate::discovery::SemVer;
    use crate::profile::RegisterSpec;
    use crate::sim::{SimConnector, SimNetwork};

    fn start() -> (
        SimNetwork,
        mpsc::UnboundedSender<SocketToken>,
        ChannelDriver<SimConnector>,
        ChannelHandle,
        mpsc::UnboundedReceiver<ChannelEvent>,
    ) {
        let net = SimNetwork::new();
        let resource = ResourceDescriptor {
            dev_type: "tiqi.devil.channel".to_string(),
            dev_id: "dev-1".to_string(),
            display_name: "Laser 1".to_string(),
            version: SemVer::new(2, 0, 0),
            port: 5000,
        };
        let profile = DeviceProfile {
            name: "test".to_string(),
            registers: vec![RegisterSpec::new("gain", 1, false)],
            control_register: None,
            flags: Vec::new(),
            condition_register: None,
            error_conditions: Vec::new(),
            stream_names: Vec::new(),
        };
        let channel = Channel::connect(
            net.connector(),
            "10.0.0.2",
            resource,
            profile,
            ChannelConfig::default(),
        )
        .unwrap();
        let (ready_tx, ready_rx) = mpsc::unbounded_channel();
        let (driver, handle, events) = ChannelDriver::new(channel, ready_rx);
        (net, ready_tx, driver, handle, events)
    }

    fn forward(net: &SimNetwork, ready: &mpsc::UnboundedSender<SocketToken>) {
        while let Some(token) = net.take_ready() {
            ready.send(token).unwrap();
        }
    }

    fn handshake(net: &SimNetwork) {
        net.respond(Value::from(5001u16));
        net.respond(Value::Array(vec![Value::from(6000u16)]));
        net.respond(Value::from(3u32));
        net.respond(Value::Array(vec![Value::F64(0.01), Value::from(100u32)]));
    }

    #[tokio::test]
    async fn test_driver_forwards_events_and_commands() {
        let (net, ready, driver, handle, mut events) = start();
        let task = tokio::spawn(driver.run());

        handshake(&net);
        forward(&net, &ready);
        assert!(matches!(
            events.recv().await,
            Some(ChannelEvent::RegisterChanged { index: 1, value: 3, .. })
        ));
        assert!(matches!(events.recv().await, Some(ChannelEvent::ConnectionReady)));

        handle.add_stream_subscription(0).await.unwrap();
        assert!(net.is_open(SocketToken::Stream(0)));

        handle.set_register(1, 4).await.unwrap();
        assert_eq!(
            net.request_methods().last().map(String::as_str),
            Some("modifyRegister")
        );

        handle.remove_stream_subscription(0).unwrap();
        handle.close().unwrap();
        assert_eq!(task.await.unwrap(), ChannelState::Closed);
        assert!(net.is_closed(SocketToken::Stream(0)));
        assert!(net.is_closed(SocketToken::Rpc));
    }

    #[tokio::test]
    async fn test_driver_stops_on_remote_shutdown() {
        let (net, ready, driver, handle, mut events) = start();
        let task = tokio::spawn(driver.run());

        handshake(&net);
        forward(&net, &ready);
        while let Some(event) = events.recv().await {
            if matches!(event, ChannelEvent::ConnectionReady) {
                break;
            }
        }

        net.notify(SocketToken::Notification, "shutdown", vec![]);
        forward(&net, &ready);
        let mut saw_shutdown = false;
        while let Some(event) = events.recv().await {
            if matches!(event, ChannelEvent::ShuttingDown) {
                saw_shutdown = true;
            }
        }
        assert!(saw_shutdown);
        assert_eq!(task.await.unwrap(), ChannelState::ShuttingDown);
        assert!(matches!(
            handle.set_register(1, 1).await,
            Err(Error::ChannelClosed)
        ));
    }

    #[tokio::test]
    async fn test_command_errors_are_returned() {
        let (_net, _ready, driver, handle, _events) = start();
        let task = tokio::spawn(driver.run());
        assert!(matches!(
            handle.add_stream_subscription(0).await,
            Err(Error::NotReady(_))
        ));
        assert!(matches!(
            handle.set_register(42, 1).await,
            Err(Error::UnknownRegister(42))
        ));
        drop(handle);
        assert_eq!(task.await.unwrap(), ChannelState::Closed);
    }
}
