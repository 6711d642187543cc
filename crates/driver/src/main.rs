//! hori-flightstick
//!
//! User-space driver for the Mitsubishi Hori/Namco flightstick. Claims the
//! device through libusb, keeps the interrupt stream and the vendor poll
//! chain running, and prints every input frame to stdout.

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use common::{ChannelSink, EventStream, create_event_bridge, setup_logging};
use driver::config::{self, DriverConfig, OutputFormat};
use driver::usb::{FlightstickDevice, UsbTransport};
use driver::{DeviceSession, capabilities};
use protocol::{InputEvent, InputFrame};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{debug, error, info, warn};

/// How often the main loop checks that the device is still being polled
const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Parser, Debug)]
#[command(name = "hori-flightstick")]
#[command(
    author,
    version,
    about = "User-space driver for the Hori/Namco flightstick"
)]
#[command(long_about = "
Polls a Mitsubishi Hori/Namco flightstick over libusb and prints its input
as one line per frame.

EXAMPLES:
    # Run with default config
    hori-flightstick

    # Print frames as JSON
    hori-flightstick --json

    # List attached flightsticks and exit
    hori-flightstick --list-devices

    # Reset the device once after opening it
    hori-flightstick --reset --log-level debug

CONFIGURATION:
    The driver looks for configuration files in the following order:
    1. Path specified with --config
    2. ~/.config/hori-flightstick/driver.toml
    3. /etc/hori-flightstick/driver.toml
    4. Built-in defaults
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<String>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// List matching USB devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Print frames as JSON lines
    #[arg(long)]
    json: bool,

    /// Run a pre-reset, port reset, post-reset cycle after opening
    #[arg(long)]
    reset: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Handle --save-config flag early (before loading config)
    if args.save_config {
        let config = DriverConfig::default();
        let path = DriverConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let config = if let Some(ref path) = args.config {
        config::load_config(path).context("Failed to load configuration")?
    } else {
        DriverConfig::load_or_default()
    };

    // Use CLI log level if specified, otherwise use config value
    let log_level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.driver.log_level);

    setup_logging(log_level, config.driver.log_format).context("Failed to setup logging")?;

    info!("hori-flightstick v{}", env!("CARGO_PKG_VERSION"));
    info!("Log level: {}", log_level);

    let context = rusb::Context::new().context("Failed to create USB context")?;

    if args.list_devices {
        return list_devices_mode(&context, &config);
    }

    let format = if args.json {
        OutputFormat::Json
    } else {
        config.output.format
    };

    run(context, config, format, args.reset).await
}

/// List matching devices and exit
fn list_devices_mode(context: &rusb::Context, config: &DriverConfig) -> Result<()> {
    let vendor_id = config.vendor_id()?;
    let product_id = config.product_id()?;
    let devices = FlightstickDevice::list_matching(context, vendor_id, product_id)
        .context("Failed to enumerate USB devices")?;

    if devices.is_empty() {
        println!("No {:04x}:{:04x} devices found.", vendor_id, product_id);
    } else {
        println!("Found {} device(s):\n", devices.len());
        for device in devices {
            println!(
                "  Bus {:03} Device {:03}: {:04x}:{:04x} {}",
                device.bus_number,
                device.address,
                device.vendor_id,
                device.product_id,
                device.product.as_deref().unwrap_or(protocol::PRODUCT_NAME)
            );
        }
    }

    Ok(())
}

async fn run(
    context: rusb::Context,
    config: DriverConfig,
    format: OutputFormat,
    reset: bool,
) -> Result<()> {
    let device = Arc::new(
        FlightstickDevice::open(
            &context,
            config.vendor_id()?,
            config.product_id()?,
            config.device.interface,
        )
        .context("Failed to open flightstick")?,
    );

    let transport = Arc::new(
        UsbTransport::new(device.handle(), config.transfers.timeouts())
            .context("Failed to start USB workers")?,
    );
    let (sink, events) = create_event_bridge(config.output.queue_capacity);
    let sink = Arc::new(sink);
    let session = Arc::new(DeviceSession::new(
        transport,
        sink.clone(),
        device.interrupt_endpoint(),
        config.mapping.clone(),
    ));

    let caps = capabilities(session.mapping());
    debug!("Buttons: {:?}", caps.buttons);
    debug!("Axes: {:?}", caps.axes);

    let opening = Arc::clone(&session);
    tokio::task::spawn_blocking(move || opening.open())
        .await
        .context("Open task panicked")?
        .context("Failed to open session")?;

    if reset {
        let resetting = Arc::clone(&session);
        let device = Arc::clone(&device);
        tokio::task::spawn_blocking(move || {
            let window = resetting.pre_reset();
            if let Err(e) = device.reset() {
                warn!("Device reset failed: {}", e);
            }
            resetting.post_reset(window)
        })
        .await
        .context("Reset task panicked")?
        .context("Failed to restart after reset")?;
        info!("Reset cycle complete");
    }

    info!("Press Ctrl+C to stop");
    let result = print_frames(&session, &events, format).await;

    let closing = Arc::clone(&session);
    tokio::task::spawn_blocking(move || closing.close())
        .await
        .context("Close task panicked")?;

    let (stream_stats, poll_stats) = session.stats();
    info!("Interrupt stream: {:?}", stream_stats);
    info!("Poll chain: {:?}", poll_stats);
    report_dropped(&sink);

    result
}

/// Print frames until Ctrl+C or until both transfer legs have stopped
async fn print_frames(
    session: &DeviceSession,
    events: &EventStream,
    format: OutputFormat,
) -> Result<()> {
    let mut health = tokio::time::interval(HEALTH_CHECK_INTERVAL);
    let stdout = std::io::stdout();

    loop {
        tokio::select! {
            frame = events.recv_frame() => {
                let frame = frame.map_err(|e| anyhow!("Event stream closed: {}", e))?;
                let line = render_frame(&frame, format)?;
                writeln!(stdout.lock(), "{}", line).context("Failed to write frame")?;
            }
            _ = health.tick() => {
                if !session.stream_armed() && !session.poll_running() {
                    return Err(anyhow!("Device stopped responding, replug it to continue"));
                }
            }
            result = signal::ctrl_c() => {
                match result {
                    Ok(()) => info!("Received Ctrl+C, shutting down..."),
                    Err(e) => error!("Error waiting for Ctrl+C: {}", e),
                }
                return Ok(());
            }
        }
    }
}

fn render_frame(frame: &InputFrame, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => {
            serde_json::to_string(frame).context("Failed to serialize frame")
        }
        OutputFormat::Text => {
            let events: Vec<String> = frame.events.iter().map(render_event).collect();
            Ok(format!("#{} {}", frame.seq, events.join(" ")))
        }
    }
}

fn render_event(event: &InputEvent) -> String {
    match event {
        InputEvent::Button { button, pressed } => format!("{:?}={}", button, u8::from(*pressed)),
        InputEvent::Axis { axis, value } => format!("{:?}={}", axis, value),
    }
}

fn report_dropped(sink: &ChannelSink) {
    let dropped = sink.dropped_frames();
    if dropped > 0 {
        warn!("{} frames dropped because output could not keep up", dropped);
    }
}
