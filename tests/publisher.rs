use gamepad_bridge::device::{DeviceRegistry, Gamepad, UdpGamepad};
use gamepad_bridge::publisher::{
    DeviceDescriptor, InputFrame, InputSource, Publisher, PublisherError, PublisherSettings,
};
use gamepad_bridge::MAX_RAW;
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

const WAIT: Duration = Duration::from_secs(5);

#[derive(Debug)]
struct FixedSource {
    frame: InputFrame,
}

impl InputSource for FixedSource {
    fn devices(&mut self) -> Vec<DeviceDescriptor> {
        vec![
            DeviceDescriptor {
                index: 0,
                name: "Pad A".to_string(),
            },
            DeviceDescriptor {
                index: 1,
                name: "Pad B".to_string(),
            },
        ]
    }

    fn sample(&mut self, index: usize) -> Result<InputFrame, PublisherError> {
        match index {
            1 => Ok(self.frame.clone()),
            _ => Err(PublisherError::DeviceUnavailable(index)),
        }
    }
}

fn source() -> Box<FixedSource> {
    Box::new(FixedSource {
        frame: InputFrame {
            axes: vec![16384, -32767, 0],
            buttons: vec![1, 0],
            hats: vec![1],
        },
    })
}

#[tokio::test]
async fn published_frame_reaches_a_udp_gamepad() {
    let registry = DeviceRegistry::new();
    let mut changes = registry.subscribe();
    let device = UdpGamepad::open("udp0", "Remote", "127.0.0.1:0", None, registry.notifier())
        .await
        .expect("binds");

    let settings = PublisherSettings {
        device_index: 1,
        ..Default::default()
    };
    let mut publisher = Publisher::create(source(), device.local_addr().to_string(), Some(settings))
        .connect()
        .await
        .expect("connects");
    assert_eq!(publisher.device().map(|d| d.name.as_str()), Some("Pad B"));

    let sent = publisher.publish_frame().await.expect("frame sent");
    assert!(sent > 0);
    assert_eq!(publisher.frames_sent(), 1);

    timeout(WAIT, changes.recv()).await.expect("frame merged");
    assert_eq!(device.axis_count(), 3);
    assert_eq!(device.axis(0), 16384);
    assert_eq!(device.axis(1), -32767);
    assert_eq!(device.button(0), 1);
    assert_eq!(device.button(1), 0);
    assert_eq!(device.hat(0), MAX_RAW);

    device.shutdown().await;
}

#[tokio::test]
async fn sampling_failures_do_not_count_as_sent() {
    let settings = PublisherSettings {
        device_index: 0,
        ..Default::default()
    };
    let mut publisher = Publisher::create(source(), "127.0.0.1:9", Some(settings))
        .connect()
        .await
        .expect("connects");

    assert!(matches!(
        publisher.publish_frame().await,
        Err(PublisherError::DeviceUnavailable(0))
    ));
    assert_eq!(publisher.frames_sent(), 0);
}

#[tokio::test]
async fn publishing_loop_runs_until_cancelled() {
    let registry = DeviceRegistry::new();
    let mut changes = registry.subscribe();
    let device = UdpGamepad::open("udp0", "Remote", "127.0.0.1:0", None, registry.notifier())
        .await
        .expect("binds");

    let settings = PublisherSettings {
        device_index: 1,
        interval: Duration::from_millis(5),
    };
    let publisher = Publisher::create(source(), device.local_addr().to_string(), Some(settings))
        .connect()
        .await
        .expect("connects");

    let cancel = CancellationToken::new();
    let stopper = cancel.clone();
    let (frames, ()) = tokio::join!(publisher.run_until_cancelled(cancel), async move {
        for _ in 0..3 {
            timeout(WAIT, changes.recv()).await.expect("frame merged");
        }
        stopper.cancel();
    });

    assert!(frames >= 3);
    assert_eq!(device.axis(0), 16384);

    device.shutdown().await;
}

#[tokio::test]
async fn unresolvable_target_fails_to_connect() {
    let publisher = Publisher::create(source(), "no-port-given", None);
    assert!(publisher.connect().await.is_err());
}
