//! Receiver Handle - owns the remote devices of a process
//!
//! Opens one [`UdpGamepad`] per configured endpoint, registers each in the
//! [`DeviceRegistry`] and tears them down again on shutdown. The registry only
//! tracks references; this handle is the component that closes the devices.

use crate::config::RemoteDeviceConfig;
use crate::device::{
    DeviceError, DeviceRegistry, Gamepad, GamepadHandle, UdpGamepad, UdpGamepadSettings,
};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Handle for the set of remote devices opened from configuration
#[derive(Debug)]
pub struct ReceiverHandle {
    registry: DeviceRegistry,
    devices: Vec<Arc<UdpGamepad>>,
}

impl ReceiverHandle {
    /// Opens and registers every configured device
    ///
    /// All or nothing: if one endpoint fails to bind, the devices opened so far
    /// are unregistered and shut down before the error is returned.
    ///
    /// # Errors
    ///
    /// [`DeviceError::Bind`] from the first endpoint that could not be bound.
    pub async fn spawn(
        configs: &[RemoteDeviceConfig],
        settings: Option<UdpGamepadSettings>,
        registry: DeviceRegistry,
    ) -> Result<Self, DeviceError> {
        info!("Opening {} remote device(s)", configs.len());

        let mut handle = Self {
            registry,
            devices: Vec::with_capacity(configs.len()),
        };

        for config in configs {
            let opened = UdpGamepad::open(
                config.id.clone(),
                config.name.clone(),
                &config.bind,
                settings.clone(),
                handle.registry.notifier(),
            )
            .await;

            match opened {
                Ok(device) => {
                    let device = Arc::new(device);
                    handle.registry.register(config.id.clone(), device.clone());
                    handle.devices.push(device);
                }
                Err(e) => {
                    error!("Failed to open remote device {}: {}", config.id, e);
                    handle.shutdown().await;
                    return Err(e);
                }
            }
        }

        info!("Remote devices ready: {}", handle.devices.len());
        Ok(handle)
    }

    /// Devices owned by this handle, in configuration order
    pub fn devices(&self) -> &[Arc<UdpGamepad>] {
        &self.devices
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    /// Looks up an owned device by id
    pub fn device(&self, id: &str) -> Option<&Arc<UdpGamepad>> {
        self.devices.iter().find(|device| device.id() == id)
    }

    /// Unregisters and shuts down every owned device
    ///
    /// An id that was re-registered by someone else in the meantime keeps its
    /// newer entry.
    pub async fn shutdown(&mut self) {
        for device in self.devices.drain(..) {
            debug!("Shutting down remote device {}", device.id());
            let handle: GamepadHandle = device.clone();
            self.registry.unregister_handle(device.id(), &handle);
            device.shutdown().await;
        }
        info!("All remote devices shut down");
    }
}
