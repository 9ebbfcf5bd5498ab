//! shapewire - EventStream capture tool
//!
//! Dumps, verifies and writes EventStream message captures.

mod commands;

use clap::{Parser, Subcommand};
use colored::Colorize;
use commands::EncodeOptions;
use shapewire_stream::StreamConfig;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "shapewire")]
#[command(about = "Inspect and produce EventStream message captures")]
#[command(version)]
struct Cli {
    /// YAML stream configuration
    #[arg(short, long, env = "SHAPEWIRE_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print every message of a capture as JSON
    Dump {
        /// Capture file
        file: PathBuf,

        /// Pretty-print each message
        #[arg(long)]
        pretty: bool,
    },

    /// Check the checksums of every message in a capture
    Verify {
        /// Capture file
        file: PathBuf,
    },

    /// Write one event message
    Encode {
        /// Value of the :event-type header
        #[arg(short, long)]
        event_type: String,

        /// Extra string header (repeatable)
        #[arg(short = 'H', long = "header", value_name = "NAME=VALUE")]
        headers: Vec<String>,

        /// Payload text (or @file to read from file)
        #[arg(short, long)]
        payload: Option<String>,

        /// Hex signing key; wraps the message in a signed envelope
        #[arg(long, env = "SHAPEWIRE_SIGN_KEY")]
        sign_key: Option<String>,

        /// Output file (defaults to stdout)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<StreamConfig, shapewire_stream::ConfigError> {
    match path {
        Some(path) => {
            let mut config = StreamConfig::from_file(path)?;
            config.apply_overrides(|key| std::env::var(key).ok());
            tracing::debug!("Loaded config from {}", path.display());
            Ok(config)
        }
        None => Ok(StreamConfig::from_env()),
    }
}

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = match load_config(cli.config.as_ref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(cli.command, &config) {
        eprintln!("{}: {}", "Error".red(), e);
        std::process::exit(1);
    }
}

fn run(command: Commands, config: &StreamConfig) -> Result<(), commands::CliError> {
    match command {
        Commands::Dump { file, pretty } => {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            let count = commands::dump(&file, pretty, config, &mut out)?;
            out.flush()?;
            tracing::info!("dumped {} message(s) from {}", count, file.display());
        }
        Commands::Verify { file } => {
            let count = commands::verify(&file, config)?;
            println!(
                "{} {} ({} message(s))",
                "OK".green(),
                file.display().to_string().cyan(),
                count
            );
        }
        Commands::Encode {
            event_type,
            headers,
            payload,
            sign_key,
            out,
        } => {
            let opts = EncodeOptions {
                event_type,
                headers,
                payload,
                sign_key,
            };
            let len = match out {
                Some(path) => {
                    let file = File::create(&path)
                        .map_err(|e| commands::CliError::Open(path.clone(), e))?;
                    let mut writer = BufWriter::new(file);
                    let len = commands::encode(&opts, &mut writer)?;
                    writer.flush()?;
                    len
                }
                None => {
                    let stdout = io::stdout();
                    let mut lock = stdout.lock();
                    let len = commands::encode(&opts, &mut lock)?;
                    lock.flush()?;
                    len
                }
            };
            tracing::info!("wrote {} byte message", len);
        }
    }
    Ok(())
}
