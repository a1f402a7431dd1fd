use std::path::PathBuf;
use std::process;

use clap::Parser;

use grbl_streamer::{GcodeSource, SerialChannel, StreamConfig, StreamError, StreamSession};

/// Streams a G-code file to a motion controller over a serial link.
#[derive(Parser, Debug)]
#[command(name = "grbl-stream", version)]
struct Cli {
    /// G-code file to stream
    gcode_file: PathBuf,
    /// Serial device the controller is attached to
    device: PathBuf,
    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Override the configured baud rate
    #[arg(long)]
    baud: Option<u32>,
    /// Log every command and response
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();
    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    if let Err(e) = run(cli) {
        tracing::error!("{}", e);
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), StreamError> {
    let mut config = match &cli.config {
        Some(path) => StreamConfig::load(path)?,
        None => StreamConfig::default(),
    };
    if let Some(baud) = cli.baud {
        config.baud = baud;
    }
    config.validate()?;

    tracing::info!(
        "Streaming {} to {}",
        cli.gcode_file.display(),
        cli.device.display()
    );
    let source = GcodeSource::open(&cli.gcode_file)?;
    let mut channel = SerialChannel::open(&cli.device, &config)?;
    let mut session = StreamSession::new(config);
    session.wake(&mut channel)?;
    session.stream(&mut channel, source)
}
