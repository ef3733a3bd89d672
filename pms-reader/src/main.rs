use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre::bail;
use pms_reader::{Config, OperatingMode, PmsSensor, Reading, SensorConfig};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Parser)]
#[command(name = "pms-reader")]
#[command(about = "Particulate-matter sensor reader")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "pms-reader.toml")]
    config: PathBuf,

    /// Serial device, overriding the configuration file
    #[arg(short, long)]
    device: Option<PathBuf>,

    /// Print every record as a JSON line on stdout
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "pms_reader=info".to_owned());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = if cli.config.exists() {
        info!(path = ?cli.config, "Loading configuration");
        Config::load(&cli.config)?
    } else {
        info!("No configuration file found, using defaults");
        Config::default()
    };

    if let Some(device) = cli.device {
        config.serial.device = device;
    }

    info!(
        device = %config.serial.device.display(),
        mode = ?config.sensor.mode,
        "Starting pms-reader"
    );

    let cancel = CancellationToken::new();
    let mut sensor =
        PmsSensor::initialize(&config.serial, config.sensor.read_buffer_size, &cancel)?;

    let result = tokio::select! {
        result = run(&mut sensor, &config.sensor, cli.json) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
            Ok(())
        }
    };

    cancel.cancel();
    sensor.shutdown().await;

    let stats = sensor.stats().await;
    info!(
        frames_decoded = stats.frames_decoded,
        checksum_failures = stats.checksum_failures,
        resyncs = stats.resyncs,
        "pms-reader shut down complete"
    );

    result
}

async fn run<S>(
    sensor: &mut PmsSensor<S>,
    config: &SensorConfig,
    json: bool,
) -> color_eyre::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    sensor.wake_up().await?;
    sensor.set_mode(config.mode).await?;

    let mut requests = match config.mode {
        OperatingMode::Passive => Some(tokio::time::interval(config.request_interval())),
        OperatingMode::Active => None,
    };

    loop {
        if let Some(requests) = requests.as_mut() {
            requests.tick().await;
        }

        // Snapshot before the request; its reply must count as newer.
        let seen = sensor.sequence();
        if requests.is_some() {
            sensor.request_read().await?;
        }

        let Some(reading) = sensor.wait_newer_than(seen, config.poll_timeout()).await else {
            if !sensor.is_connected().await {
                bail!("serial device closed");
            }
            warn!(
                timeout_ms = config.poll_timeout_ms,
                "No frame received before timeout"
            );
            continue;
        };

        if sensor.is_stabilizing() {
            debug!("Skipping record while the sensor stabilizes after wake-up");
            continue;
        }

        report(&reading, json)?;
    }
}

fn report(reading: &Reading, json: bool) -> color_eyre::Result<()> {
    let record = &reading.record;

    if json {
        println!("{}", serde_json::to_string(reading)?);
    }

    info!(
        sequence = reading.sequence,
        pm1_0 = record.pm1_0_atmospheric,
        pm2_5 = record.pm2_5_atmospheric,
        pm10 = record.pm10_0_atmospheric,
        particles_0_3 = record.particles_0_3,
        "Measurement"
    );

    Ok(())
}
