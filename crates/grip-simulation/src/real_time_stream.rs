//! Real-time EMG sample stream
//!
//! Emits simulator chunks on a tokio interval through a `broadcast` channel,
//! controlled by [`StreamCommand`]s sent over an `mpsc` channel. The stream
//! task ends when every control sender has been dropped.

use crate::emg_simulator::{EmgSimulator, SampleChunk, SimulatorConfig};
use crate::signal_patterns::SignalPattern;
use grip_core::{GripError, GripResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::time::{interval, Duration, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Configuration for real-time streaming
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub simulator: SimulatorConfig,
    /// Chunk duration in seconds
    pub chunk_duration: f64,
    /// Chunks buffered per subscriber before it starts lagging
    pub buffer_size: usize,
    /// Chunks emitted per second
    pub update_rate: f64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            simulator: SimulatorConfig::default(),
            chunk_duration: 0.1,
            buffer_size: 50,
            update_rate: 10.0,
        }
    }
}

impl StreamConfig {
    pub fn validate(&self) -> GripResult<()> {
        self.simulator.validate()?;
        if !(self.chunk_duration.is_finite() && self.chunk_duration > 0.0) {
            return Err(stream_error(format!("invalid chunk duration {}", self.chunk_duration)));
        }
        if !(self.update_rate.is_finite() && self.update_rate > 0.0) {
            return Err(stream_error(format!("invalid update rate {}", self.update_rate)));
        }
        if self.buffer_size == 0 {
            return Err(stream_error("buffer size must be at least 1".to_string()));
        }
        Ok(())
    }

    fn tick_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.update_rate)
    }
}

/// Commands for controlling the stream
#[derive(Debug, Clone)]
pub enum StreamCommand {
    Start,
    /// Stop and rewind simulation time
    Stop,
    Pause,
    Resume,
    SetPattern(SignalPattern),
    /// Shortcut for a constant pattern at this level
    SetActivationLevel(f64),
}

/// Stream statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamStats {
    pub is_running: bool,
    pub chunks_generated: u64,
    /// Seconds of signal emitted since the last start
    pub total_duration: f64,
    pub current_activation: f64,
    /// Generation time of the last chunk, in seconds
    pub last_chunk_time: f64,
    /// Chunks whose generation took longer than the chunk itself
    pub slow_chunks: u64,
}

/// Real-time EMG sample stream
pub struct RealTimeEmgStream {
    config: StreamConfig,
    simulator: EmgSimulator,
    data_sender: broadcast::Sender<SampleChunk>,
    control_receiver: mpsc::Receiver<StreamCommand>,
    control_sender: mpsc::Sender<StreamCommand>,
    stats: Arc<Mutex<StreamStats>>,
}

impl RealTimeEmgStream {
    pub fn new(config: StreamConfig) -> GripResult<Self> {
        config.validate()?;
        let simulator = EmgSimulator::new(config.simulator.clone())?;
        let (data_sender, _) = broadcast::channel(config.buffer_size);
        let (control_sender, control_receiver) = mpsc::channel(32);

        Ok(Self {
            config,
            simulator,
            data_sender,
            control_receiver,
            control_sender,
            stats: Arc::new(Mutex::new(StreamStats::default())),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SampleChunk> {
        self.data_sender.subscribe()
    }

    pub fn control_handle(&self) -> mpsc::Sender<StreamCommand> {
        self.control_sender.clone()
    }

    /// Shared statistics, readable while the stream runs
    pub fn stats_handle(&self) -> Arc<Mutex<StreamStats>> {
        self.stats.clone()
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Run until every control sender is dropped
    pub async fn run(mut self) -> GripResult<()> {
        // Only external handles should keep the stream alive
        let (closed, _) = mpsc::channel(1);
        self.control_sender = closed;

        let mut ticker = interval(self.config.tick_period());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut running = false;

        info!(
            update_rate = self.config.update_rate,
            chunk_ms = self.config.chunk_duration * 1000.0,
            pattern = self.simulator.config().pattern.description(),
            "EMG stream ready"
        );

        loop {
            tokio::select! {
                _ = ticker.tick(), if running => {
                    self.emit_chunk().await?;
                }

                command = self.control_receiver.recv() => {
                    let Some(command) = command else {
                        debug!("stream control channel closed");
                        break;
                    };
                    running = self.apply(command, running).await;
                }
            }
        }

        self.stats.lock().await.is_running = false;
        Ok(())
    }

    async fn emit_chunk(&mut self) -> GripResult<()> {
        let started = Instant::now();
        let chunk = self.simulator.generate_chunk(self.config.chunk_duration)?;
        let generation_time = started.elapsed();
        let slow = generation_time.as_secs_f64() > self.config.chunk_duration;

        {
            let mut stats = self.stats.lock().await;
            stats.chunks_generated += 1;
            stats.total_duration += chunk.duration();
            stats.current_activation = chunk.activation;
            stats.last_chunk_time = generation_time.as_secs_f64();
            if slow {
                stats.slow_chunks += 1;
            }
        }

        if slow {
            warn!(
                generation_ms = generation_time.as_secs_f64() * 1000.0,
                chunk_ms = self.config.chunk_duration * 1000.0,
                "chunk generation slower than real time"
            );
        }

        // No subscribers is not an error
        let _ = self.data_sender.send(chunk);
        Ok(())
    }

    /// Apply a control command; returns the new running flag
    async fn apply(&mut self, command: StreamCommand, running: bool) -> bool {
        let mut stats = self.stats.lock().await;
        let running = match command {
            StreamCommand::Start | StreamCommand::Resume => {
                info!(?command, "EMG stream running");
                true
            }
            StreamCommand::Pause => {
                info!("EMG stream paused");
                false
            }
            StreamCommand::Stop => {
                self.simulator.reset_time();
                stats.chunks_generated = 0;
                stats.total_duration = 0.0;
                info!("EMG stream stopped");
                false
            }
            StreamCommand::SetPattern(pattern) => {
                self.simulator.set_pattern(pattern);
                info!(pattern = pattern.description(), "EMG stream pattern updated");
                running
            }
            StreamCommand::SetActivationLevel(level) => {
                let level = level.clamp(0.0, 1.0);
                self.simulator.set_pattern(SignalPattern::Constant { level });
                info!(level, "EMG stream activation level set");
                running
            }
        };
        stats.is_running = running;
        running
    }
}

/// Spawn a stream task; returns its chunk receiver, control sender and stats
pub fn start_emg_stream(
    config: StreamConfig,
) -> GripResult<(broadcast::Receiver<SampleChunk>, mpsc::Sender<StreamCommand>, Arc<Mutex<StreamStats>>)> {
    let stream = RealTimeEmgStream::new(config)?;
    let data_receiver = stream.subscribe();
    let control_sender = stream.control_handle();
    let stats = stream.stats_handle();

    tokio::spawn(async move {
        if let Err(e) = stream.run().await {
            warn!(error = %e, "EMG stream terminated");
        }
    });

    Ok((data_receiver, control_sender, stats))
}

fn stream_error(message: String) -> GripError {
    GripError::SimulationError { message }
}
