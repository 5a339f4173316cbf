use clap::{Parser, Subcommand};
use color_eyre::Result;
use gamepad_bridge::config::{BridgeConfig, RemoteDeviceConfig};
use gamepad_bridge::device::{DeviceChanged, DeviceRegistry, Gamepad};
use gamepad_bridge::listener::ReceiverHandle;
use gamepad_bridge::publisher::{GilrsSource, InputSource, Publisher, PublisherSettings};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(author, version, about = "Forward joysticks over UDP and track remote gamepad state")]
struct Cli {
    /// Config file (defaults to <config dir>/gamepad-bridge/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List available joysticks and exit
    List,

    /// Forward a local joystick to a UDP receiver
    Forward {
        /// UDP server address to send inputs to
        #[arg(long)]
        addr: Option<String>,

        /// Joystick index to forward (from `list` output)
        #[arg(long)]
        index: Option<usize>,

        /// Polling interval in milliseconds
        #[arg(long)]
        interval_ms: Option<u64>,

        /// Polling rate in Hz (if > 0 overrides the interval)
        #[arg(long)]
        hz: Option<u32>,
    },

    /// Receive remote gamepads and log their state on every change
    Listen {
        /// Address to listen on, one device per flag (defaults to the config file)
        #[arg(long = "bind")]
        binds: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup(cli.verbose)?;

    let mut config = BridgeConfig::load(cli.config.as_deref()).await?;

    match cli.command {
        Command::List => list_joysticks(),
        Command::Forward {
            addr,
            index,
            interval_ms,
            hz,
        } => {
            if let Some(addr) = addr {
                config.publisher.addr = addr;
            }
            if let Some(index) = index {
                config.publisher.index = index;
            }
            if let Some(interval_ms) = interval_ms {
                config.publisher.interval_ms = interval_ms;
                config.publisher.hz = 0;
            }
            if let Some(hz) = hz {
                config.publisher.hz = hz;
            }
            forward(config).await
        }
        Command::Listen { binds } => {
            if !binds.is_empty() {
                config.receiver.devices = binds
                    .into_iter()
                    .enumerate()
                    .map(|(i, bind)| RemoteDeviceConfig {
                        id: format!("udp{}", i),
                        name: format!("Remote Gamepad {}", i),
                        bind,
                    })
                    .collect();
            }
            listen(config).await
        }
    }
}

fn setup(verbose: bool) -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env(if verbose { Level::DEBUG } else { Level::INFO });
    Ok(())
}

fn setup_logging_env(level: Level) {
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}

fn list_joysticks() -> Result<()> {
    let mut source = GilrsSource::new()?;
    let devices = source.devices();

    println!("Found {} joystick(s)", devices.len());
    for device in devices {
        println!("{}: {}", device.index, device.name);
    }
    Ok(())
}

async fn forward(config: BridgeConfig) -> Result<()> {
    let source = GilrsSource::new()?;
    let settings = PublisherSettings::from(&config.publisher);
    let publisher = Publisher::create(Box::new(source), config.publisher.addr.clone(), Some(settings))
        .connect()
        .await?;

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Unable to listen for shutdown signal: {}", e);
        }
        info!("Shutting down");
        signal_cancel.cancel();
    });

    let frames = publisher.run_until_cancelled(cancel).await;
    debug!("Forwarded {} frames", frames);
    Ok(())
}

async fn listen(config: BridgeConfig) -> Result<()> {
    let registry = DeviceRegistry::with_subscriber_capacity(config.receiver.subscriber_capacity);
    let mut changes = registry.subscribe();
    let mut receiver = ReceiverHandle::spawn(
        &config.receiver.devices,
        Some(config.receiver.gamepad_settings()),
        registry.clone(),
    )
    .await?;

    for device in receiver.devices() {
        info!("Waiting for frames on {} ({})", device.local_addr(), device.id());
    }

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutting down");
                break;
            }
            changed = changes.recv() => match changed {
                Some(DeviceChanged { device_id }) => log_device_state(&receiver, &device_id),
                None => break,
            }
        }
    }

    receiver.shutdown().await;
    Ok(())
}

fn log_device_state(receiver: &ReceiverHandle, device_id: &str) {
    let Some(device) = receiver.device(device_id) else {
        debug!("Change from unknown device {}", device_id);
        return;
    };

    // Counts are remote-controlled, so only received entries are listed
    info!("{} | {}", device.info(), device.snapshot());
}
