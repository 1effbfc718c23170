//! Teeflow - Concurrent Tee
//!
//! Copies standard input to standard output and to every named file at the
//! same time. Each chunk is written to all destinations concurrently.
//!
//! # Usage
//!
//! ```bash
//! # Mirror a build log into two files
//! make 2>&1 | teeflow build.log latest.log
//!
//! # Append instead of truncating
//! dmesg | teeflow -a kernel.log
//!
//! # Only write files
//! cat image.iso | teeflow --no-stdout copy1.iso copy2.iso
//!
//! # Verbose logging (goes to stderr)
//! RUST_LOG=debug teeflow out.txt
//! ```
//!
//! # Signals
//!
//! - `SIGINT`: Stop copying, close every destination and exit

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::fs::OpenOptions;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use teeflow_core::{
    default_config_path, load_config_from_path, AsyncReadSource, AsyncWriteSink, ConfigOverrides,
    SinkSpec, TeeConfig, TeeError, TeeStream,
};

/// Teeflow - copy stdin to stdout and files concurrently
#[derive(Parser, Debug)]
#[command(name = "teeflow")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Files to write to
    #[arg(value_name = "FILE")]
    files: Vec<PathBuf>,

    /// Append to files instead of truncating them
    #[arg(short = 'a', long)]
    append: bool,

    /// Do not copy to standard output
    #[arg(long)]
    no_stdout: bool,

    /// Tee buffer size in bytes (minimum 1024)
    #[arg(long, value_name = "BYTES")]
    buffer_size: Option<usize>,

    /// Copy pump staging size in bytes
    #[arg(long, value_name = "BYTES")]
    pump_buffer_size: Option<usize>,

    /// Configuration file path
    #[arg(short = 'c', long, env = "TEEFLOW_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "TEEFLOW_LOG_LEVEL", default_value = "warn")]
    log_level: String,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides::new();
        if let Some(size) = self.buffer_size {
            overrides = overrides.with_buffer_size(size);
        }
        if let Some(size) = self.pump_buffer_size {
            overrides = overrides.with_pump_buffer_size(size);
        }
        overrides
    }
}

/// Initialize logging with the specified level
///
/// Logs go to stderr; stdout carries the copied data.
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("teeflow={level},teeflow_core={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();
}

/// Resolve configuration: CLI > env > file > defaults
fn resolve_config(args: &Args) -> Result<TeeConfig> {
    let path = args.config.clone().or_else(default_config_path);
    let mut config = load_config_from_path(path).context("Failed to load configuration")?;
    args.overrides()
        .apply(&mut config)
        .context("Invalid command-line override")?;

    info!(
        source = %config.source(),
        buffer_size = config.buffer_size,
        pump_buffer_size = config.pump.buffer_size,
        "Configuration resolved"
    );
    Ok(config)
}

/// Open one file sink
async fn open_file(path: &Path, append: bool) -> Result<SinkSpec> {
    let mut options = OpenOptions::new();
    options.create(true);
    if append {
        options.append(true);
    } else {
        options.write(true).truncate(true);
    }

    let file = options
        .open(path)
        .await
        .with_context(|| format!("Failed to open {}", path.display()))?;
    Ok(SinkSpec::external(AsyncWriteSink::new(
        path.display().to_string(),
        file,
    )))
}

/// Build the sink list: stdout first (unless disabled), then files in order
async fn open_sinks(args: &Args) -> Result<Vec<SinkSpec>> {
    let mut sinks = Vec::with_capacity(args.files.len() + 1);
    if !args.no_stdout {
        sinks.push(SinkSpec::external(AsyncWriteSink::new(
            "stdout",
            tokio::io::stdout(),
        )));
    }
    for path in &args.files {
        sinks.push(open_file(path, args.append).await?);
    }
    Ok(sinks)
}

/// Cancel `token` on Ctrl-C
fn spawn_interrupt_handler(token: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received SIGINT, stopping copy");
                token.cancel();
            }
            Err(e) => warn!(error = %e, "Failed to install SIGINT handler"),
        }
    });
}

/// Copy stdin through the tee, always closing it afterwards
async fn run(args: &Args, cancel: &CancellationToken) -> Result<()> {
    let config = resolve_config(args)?;
    let sinks = open_sinks(args).await?;
    let tee = TeeStream::with_config(&config, sinks).context("Failed to create tee")?;

    let mut stdin = AsyncReadSource::new(tokio::io::stdin());
    let copied = tee.copy_from(&mut stdin, cancel).await;
    let flushed = if copied.is_ok() {
        tee.flush(cancel).await
    } else {
        Ok(())
    };
    let closed = tee.close().await;

    match copied {
        Ok(report) => info!(
            bytes = report.bytes_copied,
            reads = report.reads,
            writes = report.writes,
            "Copy complete"
        ),
        Err(TeeError::Cancelled) => {
            info!("Copy interrupted");
            return Ok(());
        }
        Err(e) => return Err(e).context("Copy failed"),
    }
    flushed.context("Flush failed")?;
    closed.context("Close failed")?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());

    let result = run(&args, &cancel).await;
    if let Err(ref e) = result {
        error!(error = %format!("{e:#}"), "teeflow stopped with error");
    }
    result
}
