//! Live and replayed sessions

use anyhow::{bail, Context};
use grip_control::{transport_from_settings, GripSystem, SystemStatus};
use grip_core::{GripConfig, ManualClock};
use grip_simulation::{start_emg_stream, SignalPattern, SimulatorConfig, StreamCommand, StreamConfig};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{info, warn};

/// Longest wait for queued commands to reach the arm after a replay
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct LiveOptions {
    pub duration: Duration,
    pub pattern: SignalPattern,
    pub seed: Option<u64>,
    pub status_interval: Duration,
}

/// Feed a paced simulated stream through the system until the duration
/// elapses or Ctrl-C is pressed
pub async fn run_live(config: GripConfig, options: LiveOptions) -> anyhow::Result<SystemStatus> {
    if options.status_interval.is_zero() {
        bail!("status interval must be positive");
    }

    let stream_config = StreamConfig {
        simulator: SimulatorConfig {
            sampling_rate: config.sampling_rate,
            pattern: options.pattern,
            seed: options.seed,
            ..SimulatorConfig::default()
        },
        ..StreamConfig::default()
    };

    let system = Arc::new(GripSystem::from_config(config)?);
    let connecting = system.clone();
    tokio::task::spawn_blocking(move || connecting.connect())
        .await
        .context("connect task failed")?
        .context("connecting to the arm")?;

    let (mut samples, control, _stream_stats) = start_emg_stream(stream_config)?;
    control.send(StreamCommand::Start).await.context("starting the EMG stream")?;
    system.start_detection();
    info!(
        pattern = options.pattern.description(),
        duration_s = options.duration.as_secs_f64(),
        "live session running"
    );

    let deadline = sleep(options.duration);
    tokio::pin!(deadline);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut status_ticker = interval(options.status_interval);
    status_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            chunk = samples.recv() => {
                match chunk {
                    Ok(chunk) => {
                        for sample in chunk.samples {
                            system.add_sample(sample);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "session lagged behind the EMG stream");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        warn!("EMG stream closed");
                        break;
                    }
                }
            }

            _ = status_ticker.tick() => log_status(&system.status()),

            _ = &mut deadline => {
                info!("session duration reached");
                break;
            }

            _ = &mut ctrl_c => {
                info!("interrupted, shutting down");
                break;
            }
        }
    }

    let _ = control.send(StreamCommand::Stop).await;
    drop(control);

    let stopping = system.clone();
    tokio::task::spawn_blocking(move || stopping.shutdown())
        .await
        .context("shutdown task failed")?;
    Ok(system.status())
}

/// Replay a recorded file as fast as possible on a sample-derived clock
pub fn replay_file(config: GripConfig, path: &Path) -> anyhow::Result<SystemStatus> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let samples = parse_samples(&text).with_context(|| format!("parsing {}", path.display()))?;
    info!(samples = samples.len(), file = %path.display(), "replaying recording");
    replay_samples(config, &samples)
}

/// Replay samples; sample `i` is stamped `(i + 1) / sampling_rate` seconds
pub fn replay_samples(config: GripConfig, samples: &[f64]) -> anyhow::Result<SystemStatus> {
    let clock = Arc::new(ManualClock::new());
    let transport = transport_from_settings(&config.dispatcher)?;
    let sampling_rate = config.sampling_rate;
    let system = GripSystem::new(config, transport, clock.clone())?;
    system.connect().context("connecting to the arm")?;
    system.start_detection();

    for (i, &sample) in samples.iter().enumerate() {
        clock.set(Duration::from_secs_f64((i + 1) as f64 / sampling_rate));
        system.add_sample(sample);
    }

    let started = Instant::now();
    while system.dispatcher().queue_len() > 0 && started.elapsed() < DRAIN_TIMEOUT {
        std::thread::sleep(Duration::from_millis(5));
    }
    // The worker may still be executing the last dequeued command
    std::thread::sleep(Duration::from_millis(20));

    system.shutdown();
    let status = system.status();
    log_status(&status);
    Ok(status)
}

/// One sample per line; blank lines and `#` comments are skipped
pub fn parse_samples(text: &str) -> anyhow::Result<Vec<f64>> {
    let mut samples = Vec::new();
    for (number, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let value: f64 = line
            .parse()
            .with_context(|| format!("line {}: '{}' is not a number", number + 1, line))?;
        samples.push(value);
    }
    Ok(samples)
}

fn log_status(status: &SystemStatus) {
    info!(
        gestures = status.detector.total_gestures,
        false_positives = status.detector.false_positives,
        baseline = status.detector.baseline_rms,
        threshold = status.detector.adaptive_threshold,
        cycle = status.controller.cycle_count,
        sent = status.dispatcher.commands_sent,
        failed = status.dispatcher.commands_failed,
        "status"
    );
}
