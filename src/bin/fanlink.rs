//! fanlink - discover and control smart fans on the local network
//!
//! # Usage
//!
//! ```bash
//! # Watch devices come and go until Ctrl+C
//! fanlink listen
//!
//! # List devices seen within the next 3 seconds
//! fanlink devices
//! fanlink devices --wait 5 --json
//!
//! # Send a command once the device has beaconed
//! fanlink send AABBCCDDEEFF power on
//! fanlink send AABBCCDDEEFF speed 4
//! fanlink send AABBCCDDEEFF timer 2h
//! fanlink send AABBCCDDEEFF brightness-up 20
//!
//! # Enable debug logging
//! RUST_LOG=fanlinkd=debug fanlink listen
//! ```
//!
//! # Signal Handling
//!
//! - SIGTERM/SIGINT: stop discovery and exit

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use fanlink_core::{Command, DeviceKey, DeviceRecord, DomainResult, LightMode, TimerSetting};
use fanlinkd::{DeviceEvent, DiscoveryService, ServiceConfig};

/// How often `send` re-checks the registry while waiting for a beacon.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// fanlink - smart fan discovery and control
#[derive(Parser, Debug)]
#[command(name = "fanlink", version, about)]
struct Args {
    /// Config file (defaults to $FANLINK_CONFIG, then the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the beacon listen port
    #[arg(long, global = true)]
    listen_port: Option<u16>,

    /// Override the device command port
    #[arg(long, global = true)]
    command_port: Option<u16>,

    #[command(subcommand)]
    command: Cli,
}

#[derive(Subcommand, Debug)]
enum Cli {
    /// Print discovery events until interrupted
    Listen,

    /// List devices heard within a short listening window
    Devices {
        /// Seconds to listen before printing
        #[arg(short, long, default_value_t = 3)]
        wait: u64,

        /// Print records as JSON
        #[arg(long)]
        json: bool,
    },

    /// Send one command to a device
    Send {
        /// 12-character device key
        key: String,

        /// Seconds to wait for the device's beacon
        #[arg(short, long, default_value_t = 5)]
        wait: u64,

        #[command(subcommand)]
        intent: Intent,
    },
}

#[derive(Subcommand, Debug)]
enum Intent {
    /// Fan power
    Power { state: OnOff },
    /// Fan speed level (1-6)
    Speed { level: u8 },
    /// One speed level up
    SpeedUp,
    /// One speed level down
    SpeedDown,
    /// Sleep mode
    Sleep { state: OnOff },
    /// Auto-off timer
    Timer { setting: TimerArg },
    /// Light power
    Light { state: OnOff },
    /// Absolute brightness (clamped to 10-100)
    Brightness {
        #[arg(allow_negative_numbers = true)]
        value: i32,
    },
    /// Raise brightness (default step 10)
    BrightnessUp { delta: Option<i32> },
    /// Lower brightness (default step 10)
    BrightnessDown { delta: Option<i32> },
    /// Light color temperature
    Color { mode: ColorArg },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum OnOff {
    On,
    Off,
}

impl OnOff {
    fn is_on(self) -> bool {
        matches!(self, Self::On)
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum TimerArg {
    Off,
    #[value(name = "1h")]
    OneHour,
    #[value(name = "2h")]
    TwoHours,
    #[value(name = "3h")]
    ThreeHours,
    #[value(name = "6h")]
    SixHours,
}

impl From<TimerArg> for TimerSetting {
    fn from(arg: TimerArg) -> Self {
        match arg {
            TimerArg::Off => Self::Off,
            TimerArg::OneHour => Self::OneHour,
            TimerArg::TwoHours => Self::TwoHours,
            TimerArg::ThreeHours => Self::ThreeHours,
            TimerArg::SixHours => Self::SixHours,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ColorArg {
    Warm,
    Cool,
    Daylight,
}

impl From<ColorArg> for LightMode {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Warm => Self::Warm,
            ColorArg::Cool => Self::Cool,
            ColorArg::Daylight => Self::Daylight,
        }
    }
}

impl Intent {
    fn to_command(&self) -> DomainResult<Command> {
        let command = match *self {
            Self::Power { state } if state.is_on() => Command::power_on(),
            Self::Power { .. } => Command::power_off(),
            Self::Speed { level } => Command::speed(level)?,
            Self::SpeedUp => Command::speed_up(),
            Self::SpeedDown => Command::speed_down(),
            Self::Sleep { state } if state.is_on() => Command::sleep_on(),
            Self::Sleep { .. } => Command::sleep_off(),
            Self::Timer { setting } => Command::timer(setting.into()),
            Self::Light { state } if state.is_on() => Command::light_on(),
            Self::Light { .. } => Command::light_off(),
            Self::Brightness { value } => Command::brightness(value),
            Self::BrightnessUp { delta: None } => Command::brightness_up(),
            Self::BrightnessUp { delta: Some(d) } => Command::brightness_up_by(d),
            Self::BrightnessDown { delta: None } => Command::brightness_down(),
            Self::BrightnessDown { delta: Some(d) } => Command::brightness_down_by(d),
            Self::Color { mode } => Command::color(mode.into()),
        };
        Ok(command)
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    run(args)
}

#[tokio::main]
async fn run(args: Args) -> Result<()> {
    // Logs go to stderr; stdout is for command output.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("fanlinkd=info".parse()?)
                .add_directive("fanlink_core=info".parse()?)
                .add_directive("fanlink_protocol=info".parse()?),
        )
        .init();

    let mut config =
        ServiceConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(port) = args.listen_port {
        config.listen_port = port;
    }
    if let Some(port) = args.command_port {
        config.command_port = port;
    }

    // Validate before binding anything.
    let command = match args.command {
        Cli::Send { ref intent, .. } => Some(intent.to_command()?),
        _ => None,
    };

    let service = DiscoveryService::new(config);
    service
        .start()
        .await
        .context("Failed to start device discovery")?;

    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        shutdown_token.cancel();
    });

    let result = match (args.command, command) {
        (Cli::Listen, _) => listen(&service, &cancel_token).await,
        (Cli::Devices { wait, json }, _) => {
            list_devices(&service, Duration::from_secs(wait), json, &cancel_token).await
        }
        (Cli::Send { key, wait, .. }, Some(command)) => {
            send(&service, &key, &command, Duration::from_secs(wait), &cancel_token).await
        }
        (Cli::Send { .. }, None) => Ok(()),
    };

    service.stop().await;
    result
}

/// Prints discovery events until shutdown.
async fn listen(service: &DiscoveryService, cancel_token: &CancellationToken) -> Result<()> {
    let Some(mut events) = service.subscribe().await else {
        bail!("Discovery service is not running");
    };

    if let Some(addr) = service.local_addr().await {
        info!(addr = %addr, "Waiting for beacons (Ctrl+C to stop)");
    }

    loop {
        tokio::select! {
            biased;

            _ = cancel_token.cancelled() => break,

            event = events.recv() => match event {
                Ok(DeviceEvent::Discovered { device }) => {
                    println!("+ {}", format_device(&device));
                }
                Ok(DeviceEvent::Refreshed { .. }) => {}
                Ok(DeviceEvent::Evicted { key, reason }) => {
                    println!("- {key} ({reason})");
                }
                Err(RecvError::Lagged(missed)) => {
                    info!(missed, "Event stream lagged");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    Ok(())
}

/// Listens for `wait`, then prints every known device.
async fn list_devices(
    service: &DiscoveryService,
    wait: Duration,
    json: bool,
    cancel_token: &CancellationToken,
) -> Result<()> {
    tokio::select! {
        _ = cancel_token.cancelled() => {}
        _ = tokio::time::sleep(wait) => {}
    }

    let mut devices: Vec<DeviceRecord> = service.list_devices().await.into_values().collect();
    devices.sort_by(|a, b| a.key.cmp(&b.key));

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&devices).context("Failed to serialize devices")?
        );
        return Ok(());
    }

    if devices.is_empty() {
        println!("No devices found.");
        return Ok(());
    }

    println!("{:<14} {:<16} {:<8} LAST SEEN", "KEY", "ADDRESS", "SERIES");
    for device in &devices {
        println!("{}", format_device(device));
    }
    Ok(())
}

/// Waits up to `wait` for `key` to beacon, then sends `command` to it.
async fn send(
    service: &DiscoveryService,
    key: &str,
    command: &Command,
    wait: Duration,
    cancel_token: &CancellationToken,
) -> Result<()> {
    let device_key = DeviceKey::parse(key)?;

    let deadline = tokio::time::Instant::now() + wait;
    while !service.list_devices().await.contains_key(&device_key) {
        if tokio::time::Instant::now() >= deadline {
            bail!("Device {device_key} did not announce itself within {}s", wait.as_secs());
        }
        tokio::select! {
            _ = cancel_token.cancelled() => bail!("Interrupted"),
            _ = tokio::time::sleep(POLL_INTERVAL) => {}
        }
    }

    let delivery = service
        .send_command(device_key.as_str(), command)
        .await
        .with_context(|| format!("Failed to send '{command}' to {device_key}"))?;

    println!("Sent '{command}' to {device_key} at {}", delivery.target);
    Ok(())
}

fn format_device(device: &DeviceRecord) -> String {
    format!(
        "{:<14} {:<16} {:<8} {}",
        device.key.as_str(),
        device.address.to_string(),
        device.series.as_str(),
        device.last_seen_display
    )
}

/// Waits for a shutdown signal (SIGTERM or SIGINT).
async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
