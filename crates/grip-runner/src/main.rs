//! Grip Runner - headless EMG to robotic arm session
//!
//! Runs the gesture pipeline against a simulated EMG stream or a recorded
//! sample file, driving a mock arm or a serial-over-TCP bridge.

mod session;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use grip_core::{ConfigProfile, GripConfig};
use grip_simulation::SignalPattern;
use session::LiveOptions;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ProfileArg {
    Standard,
    Sensitive,
}

impl From<ProfileArg> for ConfigProfile {
    fn from(profile: ProfileArg) -> Self {
        match profile {
            ProfileArg::Standard => ConfigProfile::Standard,
            ProfileArg::Sensitive => ConfigProfile::Sensitive,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "grip-runner", about = "EMG gesture control of a robotic arm")]
struct Cli {
    /// JSON configuration file (overrides --profile)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Built-in configuration preset
    #[arg(long, value_enum, default_value = "standard")]
    profile: ProfileArg,

    /// Live session length in seconds
    #[arg(long, default_value_t = 10.0)]
    duration: f64,

    /// Simulated activation pattern (rest, hold, grip-cycles, quick-grips, warmup, fatigue, natural)
    #[arg(long, default_value = "grip-cycles")]
    pattern: String,

    /// Simulator seed for reproducible runs
    #[arg(long)]
    seed: Option<u64>,

    /// Replay a recorded file (one sample per line) instead of simulating
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Serial-over-TCP bridge address (host:port); disables mock mode
    #[arg(long)]
    endpoint: Option<String>,

    /// Seconds between status log lines in live sessions
    #[arg(long, default_value_t = 2.0)]
    status_interval: f64,
}

fn load_config(cli: &Cli) -> anyhow::Result<GripConfig> {
    let mut config = match &cli.config {
        Some(path) => GripConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => GripConfig::for_profile(cli.profile.into()),
    };
    if let Some(endpoint) = &cli.endpoint {
        config.dispatcher.mock_mode = false;
        config.dispatcher.endpoint = Some(endpoint.clone());
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn seconds(value: f64, what: &str) -> anyhow::Result<Duration> {
    Duration::try_from_secs_f64(value).with_context(|| format!("invalid {} {}", what, value))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    info!(
        name = %config.name,
        profile = ?config.profile,
        mock = config.dispatcher.mock_mode,
        "grip runner starting"
    );

    let result = match &cli.replay {
        Some(path) => {
            let path = path.clone();
            tokio::task::spawn_blocking(move || session::replay_file(config, &path))
                .await
                .context("replay task failed")?
        }
        None => {
            let options = LiveOptions {
                duration: seconds(cli.duration, "duration")?,
                pattern: cli.pattern.parse::<SignalPattern>()?,
                seed: cli.seed,
                status_interval: seconds(cli.status_interval, "status interval")?,
            };
            session::run_live(config, options).await
        }
    };

    match result {
        Ok(status) => {
            println!("{}", serde_json::to_string_pretty(&status)?);
            Ok(())
        }
        Err(e) => {
            error!(error = %format!("{:#}", e), "session failed");
            Err(e)
        }
    }
}
