#![warn(missing_docs)]

//! Headless DEVIL channel monitor: logs register changes, error conditions
//! and per-window stream statistics of one device

mod config;
mod stats;

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use devil_channel::{
    ChannelEvent, ChannelHandle, ChannelState, DeviceProfile, ResourceDescriptor, SemVer,
};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::MonitorConfig;
use crate::stats::WindowStats;

#[derive(Parser, Debug)]
#[command(name = "devil-monitor")]
#[command(about = "Monitor a DEVIL channel", long_about = None)]
struct Cli {
    /// Config file (.toml or .json)
    #[arg(short, long, env = "DEVIL_MONITOR_CONFIG")]
    config: Option<PathBuf>,

    /// Device host
    #[arg(long)]
    host: Option<String>,

    /// Device RPC port
    #[arg(short, long)]
    port: Option<u16>,

    /// Stream to log statistics for; may be repeated
    #[arg(short, long = "stream")]
    streams: Vec<u16>,

    /// Samples per statistics window
    #[arg(short, long)]
    window: Option<usize>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long)]
    log_filter: Option<String>,
}

impl Cli {
    fn load_config(&self) -> Result<MonitorConfig> {
        let mut config = match &self.config {
            Some(path) => MonitorConfig::from_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => MonitorConfig::default(),
        };
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if !self.streams.is_empty() {
            config.streams = self.streams.clone();
        }
        if let Some(window) = self.window {
            config.window = window;
        }
        if let Some(filter) = &self.log_filter {
            config.log_filter = filter.clone();
        }
        config.validate()?;
        Ok(config)
    }
}

struct Monitor {
    handle: ChannelHandle,
    profile: DeviceProfile,
    streams: Vec<u16>,
    window: usize,
    stats: HashMap<u16, WindowStats>,
}

impl Monitor {
    fn register_name(&self, index: u16) -> &str {
        self.profile
            .registers
            .iter()
            .find(|r| r.index == index)
            .map(|r| r.name.as_str())
            .unwrap_or("?")
    }

    /// Handle one event. Returns `false` once the channel is gone.
    async fn on_event(&mut self, event: ChannelEvent) -> bool {
        match event {
            ChannelEvent::ConnectionReady => {
                tracing::info!("connection ready");
                for &stream in &self.streams {
                    match self.handle.add_stream_subscription(stream).await {
                        Ok(()) => tracing::info!(
                            stream = stream,
                            name = self.profile.stream_name(stream).unwrap_or("?"),
                            "subscribed"
                        ),
                        Err(e) => tracing::warn!(stream = stream, error = %e, "subscribe failed"),
                    }
                }
            }
            ChannelEvent::RegisterChanged {
                index,
                value,
                origin,
            } => {
                tracing::info!(
                    register = self.register_name(index),
                    index = index,
                    value = value,
                    origin = ?origin,
                    "register changed"
                );
            }
            ChannelEvent::RegisterDesynchronized { index } => {
                tracing::warn!(register = self.register_name(index), "register desynchronized");
            }
            ChannelEvent::StreamPacketReceived(packet) => {
                let window = self.window;
                let stats = self
                    .stats
                    .entry(packet.stream_idx())
                    .or_insert_with(|| WindowStats::new(window));
                for summary in stats.push(packet.samples()) {
                    tracing::info!(
                        stream = packet.stream_idx(),
                        interval_s = packet.sample_interval_seconds(),
                        "{}",
                        summary
                    );
                }
            }
            ChannelEvent::StreamFailed { stream_idx, reason } => {
                tracing::warn!(stream = stream_idx, reason = %reason, "stream failed");
                self.stats.remove(&stream_idx);
            }
            ChannelEvent::StreamAcquisitionConfigChanged(config) => {
                tracing::info!(
                    time_span_s = config.time_span_seconds,
                    points = config.points,
                    "stream acquisition config changed"
                );
            }
            ChannelEvent::ErrorConditionsChanged(conditions) => {
                if conditions.is_empty() {
                    tracing::info!("error conditions cleared");
                }
                for condition in conditions {
                    tracing::warn!(
                        condition = %condition.short_name,
                        "{}",
                        condition.long_name
                    );
                }
            }
            ChannelEvent::ShuttingDown => {
                tracing::info!("device shutting down");
                return false;
            }
            ChannelEvent::ConnectionFailed { reason } => {
                tracing::error!(reason = %reason, "connection failed");
                return false;
            }
        }
        true
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config()?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))
        .context("invalid log filter")?;
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    tracing::info!("DEVIL monitor starting...");

    let profile = config.device_profile()?;
    let label = config
        .dev_id
        .clone()
        .unwrap_or_else(|| format!("{}:{}", config.host, config.port));
    let resource = ResourceDescriptor {
        dev_type: config.channel.device_type.clone(),
        dev_id: label.clone(),
        display_name: label,
        version: SemVer::new(config.channel.supported_major_version, 0, 0),
        port: config.port,
    };

    let (driver, handle, mut events) = devil_channel::connect_zmq(
        &config.host,
        resource,
        profile.clone(),
        config.channel.clone(),
    )?;
    let driver_task = tokio::spawn(driver.run());

    let mut monitor = Monitor {
        handle: handle.clone(),
        profile,
        streams: config.streams.clone(),
        window: config.window,
        stats: HashMap::new(),
    };

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => {
                    if !monitor.on_event(event).await {
                        break;
                    }
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted, closing channel");
                if handle.close().is_err() {
                    break;
                }
            }
        }
    }

    match driver_task.await? {
        ChannelState::Failed => anyhow::bail!("connection to {} failed", config.host),
        state => {
            tracing::info!(state = ?state, "monitor stopped");
            Ok(())
        }
    }
}
