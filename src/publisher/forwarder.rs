//! Forwarder - samples an input source and sends frames over UDP
//!
//! Two-state machine:
//!
//! ```text
//! Idle ──connect()──► Forwarding ──run_until_cancelled()──► done
//!  (device + target      (socket connected,
//!   not validated)        frames on a fixed cadence)
//! ```
//!
//! Delivery is best effort. A failed sample or send is logged and the next
//! tick tries again.

use super::source::{DeviceDescriptor, InputSource};
use super::PublisherError;
use crate::config::PublisherConfig;
use chrono::Local;
use statum::{machine, state};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Publisher settings
#[derive(Clone, Debug)]
pub struct PublisherSettings {
    /// Index of the local device to forward
    pub device_index: usize,
    /// Sampling cadence
    pub interval: Duration,
}

impl Default for PublisherSettings {
    fn default() -> Self {
        Self {
            device_index: 0,
            interval: Duration::from_millis(20),
        }
    }
}

impl From<&PublisherConfig> for PublisherSettings {
    fn from(config: &PublisherConfig) -> Self {
        Self {
            device_index: config.index,
            interval: config.interval(),
        }
    }
}

#[state]
#[derive(Debug, Clone)]
pub enum PublisherState {
    Idle,
    Forwarding,
}

#[machine]
#[derive(Debug)]
pub struct Publisher<S: PublisherState> {
    // Local input API
    source: Box<dyn InputSource>,

    // Address frames are sent to
    target: String,

    settings: PublisherSettings,

    // Selected device, set by connect()
    device: Option<DeviceDescriptor>,

    // Connected socket, set by connect()
    socket: Option<UdpSocket>,

    frames_sent: u64,
}

impl<S: PublisherState> Publisher<S> {
    pub fn settings(&self) -> &PublisherSettings {
        &self.settings
    }

    pub fn target(&self) -> &str {
        &self.target
    }
}

impl Publisher<Idle> {
    pub fn create(
        source: Box<dyn InputSource>,
        target: impl Into<String>,
        settings: Option<PublisherSettings>,
    ) -> Self {
        let settings = settings.unwrap_or_default();
        let target = target.into();
        debug!(
            "Creating publisher for {} with settings: {:?}",
            target, settings
        );
        Self::new(source, target, settings, None, None, 0)
    }

    /// Selects the device and connects a socket to the target
    ///
    /// # Errors
    ///
    /// * [`PublisherError::NoDevices`] - the source has no device at all
    /// * [`PublisherError::IndexOutOfRange`] - the configured index does not exist
    /// * [`PublisherError::Resolve`] / [`PublisherError::Io`] - target unusable
    pub async fn connect(mut self) -> Result<Publisher<Forwarding>, PublisherError> {
        let devices = self.source.devices();
        if devices.is_empty() {
            warn!("No joystick available to forward");
            return Err(PublisherError::NoDevices);
        }

        info!("Found {} joystick(s):", devices.len());
        for device in &devices {
            info!("  [{}] {}", device.index, device.name);
        }

        let index = self.settings.device_index;
        let count = devices.len();
        let device = devices
            .into_iter()
            .find(|device| device.index == index)
            .ok_or(PublisherError::IndexOutOfRange { index, count })?;

        let target = tokio::net::lookup_host(self.target.as_str())
            .await?
            .next()
            .ok_or_else(|| PublisherError::Resolve(self.target.clone()))?;
        let local: SocketAddr = if target.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(local).await?;
        socket.connect(target).await?;

        info!(
            "Forwarding joystick {} ({}) -> {} (interval {:?})",
            device.index, device.name, target, self.settings.interval
        );
        self.device = Some(device);
        self.socket = Some(socket);
        Ok(self.transition())
    }
}

impl Publisher<Forwarding> {
    /// Device selected by `connect()`
    pub fn device(&self) -> Option<&DeviceDescriptor> {
        self.device.as_ref()
    }

    pub fn local_addr(&self) -> Result<SocketAddr, PublisherError> {
        let socket = self.socket.as_ref().ok_or(PublisherError::NotConnected)?;
        Ok(socket.local_addr()?)
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    /// Samples the device once and sends the full frame, returning the bytes sent
    pub async fn publish_frame(&mut self) -> Result<usize, PublisherError> {
        let index = self
            .device
            .as_ref()
            .map(|device| device.index)
            .ok_or(PublisherError::NotConnected)?;
        let payload = self.source.sample(index)?.to_packet().encode()?;
        let socket = self.socket.as_ref().ok_or(PublisherError::NotConnected)?;

        let sent = socket.send(&payload).await?;
        self.frames_sent += 1;
        Ok(sent)
    }

    /// Publishes on the configured cadence until `cancel` fires
    ///
    /// Returns the number of frames sent.
    pub async fn run_until_cancelled(mut self, cancel: CancellationToken) -> u64 {
        info!("Starting publisher loop");

        let mut ticker = tokio::time::interval(self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut sent_since_log: u64 = 0;
        let mut last_log_time = Local::now();
        let log_interval = chrono::Duration::seconds(10);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Shutdown signal received for publisher");
                    break;
                }
                _ = ticker.tick() => {
                    match self.publish_frame().await {
                        Ok(bytes) => {
                            sent_since_log += 1;
                            debug!("Sent frame of {} bytes", bytes);
                        }
                        Err(PublisherError::Io(e))
                            if e.kind() == std::io::ErrorKind::ConnectionRefused =>
                        {
                            debug!("Receiver not listening: {}", e);
                        }
                        Err(e) => warn!("Failed to publish frame: {}", e),
                    }
                }
            }

            let now = Local::now();
            if now - last_log_time > log_interval {
                info!(
                    "Publisher stats: sent {} frames in last {} seconds",
                    sent_since_log,
                    log_interval.num_seconds()
                );
                sent_since_log = 0;
                last_log_time = now;
            }
        }

        info!("Publisher stopped after {} frames", self.frames_sent);
        self.frames_sent
    }
}
