use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use narrator_core::settings::config::narrator_home;
use narrator_core::SettingsManager;

mod speak;
mod voices;

use crate::speak::SpeakArgs;
use crate::voices::VoicesArgs;

#[derive(Parser, Debug)]
#[command(name = "narrator")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Narrator - speech synthesis with word-level timelines")]
struct Args {
    /// Settings file to read default options from
    #[arg(long, global = true, value_name = "PATH")]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Synthesize text into a WAV file
    Speak(SpeakArgs),
    /// List the voices an engine offers
    Voices(VoicesArgs),
}

fn main() -> Result<()> {
    setup_tracing()?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async_main())
}

async fn async_main() -> Result<()> {
    let args = Args::parse();
    info!("CLI startup: settings={:?}", args.settings);

    let settings = match args.settings {
        Some(path) => SettingsManager::from_path(path)?,
        None => SettingsManager::new()?,
    };

    match args.command {
        Command::Speak(speak) => speak::run(speak, settings.settings()).await,
        Command::Voices(voices) => voices::run(voices, settings.settings()).await,
    }
}

fn setup_tracing() -> Result<()> {
    use std::fs;
    use tracing_subscriber::fmt;

    let trace_dir = narrator_home().join("trace");
    fs::create_dir_all(&trace_dir)?;

    let log_file = trace_dir.join("narrator.log");
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_file)?;

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(file)
                .with_ansi(false)
                .with_target(true)
                .with_file(true)
                .with_line_number(true),
        )
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Tracing initialized to {:?}", log_file);
    Ok(())
}
