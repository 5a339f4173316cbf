use gamepad_bridge::config::{BridgeConfig, RemoteDeviceConfig};
use gamepad_bridge::device::{DeviceError, DeviceRegistry, Gamepad, GamepadHandle, UdpGamepad};
use gamepad_bridge::listener::ReceiverHandle;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;

fn remote(id: &str, bind: &str) -> RemoteDeviceConfig {
    RemoteDeviceConfig {
        id: id.to_string(),
        name: format!("Remote {}", id),
        bind: bind.to_string(),
    }
}

#[tokio::test]
async fn spawn_registers_every_device() {
    let registry = DeviceRegistry::new();
    let mut changes = registry.subscribe();
    let configs = [remote("left", "127.0.0.1:0"), remote("right", "127.0.0.1:0")];

    let mut receiver = ReceiverHandle::spawn(&configs, None, registry.clone())
        .await
        .expect("all endpoints bind");
    assert_eq!(registry.len(), 2);
    assert_eq!(receiver.devices().len(), 2);

    let right = receiver.devices()[1].local_addr();
    let socket = UdpSocket::bind("127.0.0.1:0").await.expect("sender binds");
    socket
        .send_to(br#"{"buttons":{"0":1}}"#, right)
        .await
        .expect("sent");

    let changed = timeout(Duration::from_secs(5), changes.recv())
        .await
        .expect("change signalled")
        .expect("registry alive");
    assert_eq!(changed.device_id, "right");

    let device = registry.get("right").expect("registered");
    assert_eq!(device.button(0), 1);
    assert_eq!(registry.get("left").map(|d| d.button_count()), Some(0));

    receiver.shutdown().await;
    assert!(registry.is_empty());
    assert!(receiver.devices().is_empty());
}

#[tokio::test]
async fn spawn_rolls_back_when_an_endpoint_fails() {
    let registry = DeviceRegistry::new();
    let mut first = ReceiverHandle::spawn(&[remote("taken", "127.0.0.1:0")], None, registry.clone())
        .await
        .expect("binds");
    let taken = first.devices()[0].local_addr().to_string();

    let other = DeviceRegistry::new();
    let configs = [remote("ok", "127.0.0.1:0"), remote("clash", &taken)];
    let result = ReceiverHandle::spawn(&configs, None, other.clone()).await;

    assert!(matches!(result, Err(DeviceError::Bind { .. })));
    assert!(other.is_empty());

    first.shutdown().await;
}

#[tokio::test]
async fn shutdown_keeps_ids_registered_by_others() {
    let registry = DeviceRegistry::new();
    let mut receiver = ReceiverHandle::spawn(&[remote("pad", "127.0.0.1:0")], None, registry.clone())
        .await
        .expect("binds");
    assert!(receiver.device("pad").is_some());
    assert!(receiver.device("other").is_none());

    let replacement = Arc::new(
        UdpGamepad::open("pad", "Replacement", "127.0.0.1:0", None, registry.notifier())
            .await
            .expect("binds"),
    );
    let handle: GamepadHandle = replacement.clone();
    registry.register("pad", handle);

    receiver.shutdown().await;

    let current = registry.get("pad").expect("replacement still registered");
    assert_eq!(current.name(), "Replacement");
    replacement.shutdown().await;
}

#[tokio::test]
async fn default_config_describes_one_device() {
    let config = BridgeConfig::default();
    assert_eq!(config.receiver.devices.len(), 1);
    assert_eq!(config.receiver.devices[0].id, "udp0");
}
