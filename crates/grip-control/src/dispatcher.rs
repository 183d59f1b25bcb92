//! Command dispatcher
//!
//! A FIFO command queue drained by one worker thread that executes commands
//! against an [`ActuatorTransport`]. Enqueue never blocks on the link; the
//! worker sleeps on a condition variable until work arrives. Emergency stop
//! bypasses the queue: it clears pending commands under the queue lock and
//! sends `EMERGENCY_STOP` synchronously from the caller's thread.

use crate::actuator::ActuatorState;
use crate::transport::{transport_from_settings, ActuatorTransport};
use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, Sender};
use grip_core::{ActuatorPosition, Command, CommandKind, DispatcherSettings, GripError, GripResult};
use grip_processing::call_isolated;
use parking_lot::{Condvar, Mutex, RwLock};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

/// Result of executing one command
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    Sent,
    /// `STATUS` was sent; carries the response line if one arrived in time
    StatusResponse(Option<String>),
    Failed(GripError),
    /// Discarded because an emergency stop happened after it was dequeued
    Cancelled,
}

impl CommandOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, CommandOutcome::Sent | CommandOutcome::StatusResponse(_))
    }
}

/// Notified on the dispatcher thread after every executed command
pub trait CommandObserver: Send + Sync {
    fn on_command(&self, command: &Command, outcome: &CommandOutcome) -> anyhow::Result<()>;
}

impl<F> CommandObserver for F
where
    F: Fn(&Command, &CommandOutcome) -> anyhow::Result<()> + Send + Sync,
{
    fn on_command(&self, command: &Command, outcome: &CommandOutcome) -> anyhow::Result<()> {
        self(command, outcome)
    }
}

/// What an emergency stop did
#[derive(Debug)]
pub struct EmergencyStopReport {
    /// Pending commands removed from the queue
    pub cleared: usize,
    /// Whether `EMERGENCY_STOP` reached the link
    pub delivery: GripResult<()>,
}

/// Dispatcher statistics snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatcherStatus {
    pub connected: bool,
    pub transport: String,
    pub position: ActuatorPosition,
    pub commands_sent: u64,
    pub commands_failed: u64,
    pub queue_size: usize,
    pub last_command_time: Option<SystemTime>,
    pub emergency_stops: u64,
    pub observer_failures: u64,
}

struct Shared {
    queue: Mutex<VecDeque<Command>>,
    wake: Condvar,
    connected: AtomicBool,
    /// Bumped by every emergency stop while the queue lock is held
    generation: AtomicU64,
    transport: Mutex<Box<dyn ActuatorTransport>>,
    state: RwLock<ActuatorState>,
    commands_sent: AtomicU64,
    commands_failed: AtomicU64,
    emergency_stops: AtomicU64,
    observer_failures: AtomicU64,
    last_command_time: Mutex<Option<SystemTime>>,
    observer: RwLock<Option<Arc<dyn CommandObserver>>>,
    status_timeout: Duration,
}

struct Worker {
    handle: JoinHandle<()>,
    /// Owned by this worker alone, so a detached worker stays stopped
    running: Arc<AtomicBool>,
    /// Disconnected once the worker loop has returned
    exited: Receiver<()>,
}

/// Queue plus single consumer thread in front of the arm
pub struct CommandDispatcher {
    shared: Arc<Shared>,
    worker: Mutex<Option<Worker>>,
    transport_name: String,
    join_timeout: Duration,
}

impl CommandDispatcher {
    pub fn new(transport: Box<dyn ActuatorTransport>, settings: &DispatcherSettings) -> GripResult<Self> {
        settings.validate()?;
        let transport_name = transport.describe();
        Ok(Self {
            shared: Arc::new(Shared {
                queue: Mutex::new(VecDeque::new()),
                wake: Condvar::new(),
                connected: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                transport: Mutex::new(transport),
                state: RwLock::new(ActuatorState::new()),
                commands_sent: AtomicU64::new(0),
                commands_failed: AtomicU64::new(0),
                emergency_stops: AtomicU64::new(0),
                observer_failures: AtomicU64::new(0),
                last_command_time: Mutex::new(None),
                observer: RwLock::new(None),
                status_timeout: settings.status_timeout(),
            }),
            worker: Mutex::new(None),
            transport_name,
            join_timeout: settings.join_timeout(),
        })
    }

    /// Dispatcher over the transport selected by `settings`
    pub fn from_settings(settings: &DispatcherSettings) -> GripResult<Self> {
        Self::new(transport_from_settings(settings)?, settings)
    }

    pub fn set_observer(&self, observer: Arc<dyn CommandObserver>) {
        *self.shared.observer.write() = Some(observer);
    }

    /// Open the link and start the worker thread
    ///
    /// Failure leaves the dispatcher disconnected; retrying is up to the caller.
    pub fn connect(&self) -> GripResult<()> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Ok(());
        }

        self.shared.transport.lock().connect()?;

        let running = Arc::new(AtomicBool::new(true));
        let (exit_tx, exit_rx) = bounded::<()>(1);
        let shared = self.shared.clone();
        let worker_running = running.clone();
        let handle = thread::Builder::new()
            .name("grip-dispatcher".to_string())
            .spawn(move || worker_loop(shared, worker_running, exit_tx))
            .map_err(|e| {
                self.shared.transport.lock().disconnect();
                GripError::ConnectionFailed {
                    reason: format!("cannot start dispatcher thread: {}", e),
                }
            })?;

        *worker = Some(Worker {
            handle,
            running,
            exited: exit_rx,
        });
        self.shared.connected.store(true, Ordering::SeqCst);
        info!(transport = %self.transport_name, "command dispatcher connected");
        Ok(())
    }

    /// Stop the worker within the join timeout and close the link
    ///
    /// Commands still queued stay queued and run after the next `connect`.
    pub fn disconnect(&self) {
        let Some(worker) = self.worker.lock().take() else {
            return;
        };
        self.shared.connected.store(false, Ordering::SeqCst);

        {
            let _queue = self.shared.queue.lock();
            worker.running.store(false, Ordering::SeqCst);
            self.shared.wake.notify_all();
        }

        match worker.exited.recv_timeout(self.join_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if worker.handle.join().is_err() {
                    warn!("dispatcher thread panicked");
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    timeout_ms = self.join_timeout.as_millis() as u64,
                    "dispatcher thread did not stop in time, detaching it"
                );
            }
        }

        match self.shared.transport.try_lock_for(self.join_timeout) {
            Some(mut transport) => transport.disconnect(),
            None => warn!("transport busy, link left open"),
        }

        let pending = self.queue_len();
        info!(pending, "command dispatcher disconnected");
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    /// Validate and append a command; never blocks on the link
    ///
    /// `EmergencyStop` does not queue and is handled by [`Self::emergency_stop`].
    pub fn enqueue(&self, command: Command) -> GripResult<()> {
        if command.kind == CommandKind::EmergencyStop {
            self.emergency_stop();
            return Ok(());
        }
        command.kind.validate()?;

        let mut queue = self.shared.queue.lock();
        debug!(id = %command.id, command = %command.kind, depth = queue.len() + 1, "command queued");
        queue.push_back(command);
        self.shared.wake.notify_one();
        Ok(())
    }

    pub fn grab(&self) -> GripResult<()> {
        self.enqueue(Command::grab())
    }

    pub fn release(&self) -> GripResult<()> {
        self.enqueue(Command::release())
    }

    pub fn home(&self) -> GripResult<()> {
        self.enqueue(Command::home())
    }

    pub fn request_status(&self) -> GripResult<()> {
        self.enqueue(Command::status())
    }

    /// Queue a joint move by name; unknown joints and angles outside 0..=180
    /// are rejected here and never queued
    pub fn move_joint(&self, joint: &str, angle: i32) -> GripResult<()> {
        let kind = ActuatorState::validate_move(joint, angle)?;
        self.enqueue(Command::new(kind))
    }

    /// Clear the queue and send `EMERGENCY_STOP` immediately
    ///
    /// Always succeeds locally; the link result is reported, not returned as
    /// an error.
    pub fn emergency_stop(&self) -> EmergencyStopReport {
        let cleared = {
            let mut queue = self.shared.queue.lock();
            let cleared = queue.len();
            queue.clear();
            self.shared.generation.fetch_add(1, Ordering::SeqCst);
            cleared
        };
        self.shared.emergency_stops.fetch_add(1, Ordering::Relaxed);
        warn!(cleared, "emergency stop: queue cleared");

        let command = Command::emergency_stop();
        let delivery = {
            let mut transport = self.shared.transport.lock();
            if transport.is_connected() {
                transport.send_line(&command.kind.wire_text())
            } else {
                Err(GripError::NotConnected)
            }
        };

        let outcome = match &delivery {
            Ok(()) => CommandOutcome::Sent,
            Err(e) => {
                warn!(error = %e, "emergency stop not delivered to the arm");
                CommandOutcome::Failed(e.clone())
            }
        };
        self.shared.record(&command, &outcome);

        EmergencyStopReport { cleared, delivery }
    }

    pub fn queue_len(&self) -> usize {
        self.shared.queue.lock().len()
    }

    pub fn position(&self) -> ActuatorPosition {
        self.shared.state.read().position()
    }

    pub fn status(&self) -> DispatcherStatus {
        DispatcherStatus {
            connected: self.is_connected(),
            transport: self.transport_name.clone(),
            position: self.position(),
            commands_sent: self.shared.commands_sent.load(Ordering::Relaxed),
            commands_failed: self.shared.commands_failed.load(Ordering::Relaxed),
            queue_size: self.queue_len(),
            last_command_time: *self.shared.last_command_time.lock(),
            emergency_stops: self.shared.emergency_stops.load(Ordering::Relaxed),
            observer_failures: self.shared.observer_failures.load(Ordering::Relaxed),
        }
    }
}

impl Drop for CommandDispatcher {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl std::fmt::Debug for CommandDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandDispatcher")
            .field("transport", &self.transport_name)
            .field("connected", &self.is_connected())
            .field("queue_size", &self.queue_len())
            .finish()
    }
}

fn worker_loop(shared: Arc<Shared>, running: Arc<AtomicBool>, exited: Sender<()>) {
    debug!("dispatcher worker started");
    loop {
        let (command, generation) = {
            let mut queue = shared.queue.lock();
            loop {
                if !running.load(Ordering::SeqCst) {
                    debug!("dispatcher worker stopping");
                    drop(exited);
                    return;
                }
                if let Some(command) = queue.pop_front() {
                    break (command, shared.generation.load(Ordering::SeqCst));
                }
                shared.wake.wait(&mut queue);
            }
        };
        shared.execute(command, generation);
    }
}

impl Shared {
    fn execute(&self, command: Command, generation: u64) {
        let outcome = {
            let mut transport = self.transport.lock();
            if self.generation.load(Ordering::SeqCst) != generation {
                CommandOutcome::Cancelled
            } else {
                let line = command.kind.wire_text();
                let result = match command.kind {
                    CommandKind::Status => transport
                        .query(&line, self.status_timeout)
                        .map(CommandOutcome::StatusResponse),
                    _ => transport.send_line(&line).map(|()| CommandOutcome::Sent),
                };
                result.unwrap_or_else(CommandOutcome::Failed)
            }
        };

        match &outcome {
            CommandOutcome::Sent => {
                self.state.write().apply(&command.kind);
                info!(id = %command.id, command = %command.kind, "command executed");
            }
            CommandOutcome::StatusResponse(Some(response)) => {
                info!(id = %command.id, response = %response, "arm status");
            }
            CommandOutcome::StatusResponse(None) => {
                debug!(id = %command.id, "no status response");
            }
            CommandOutcome::Failed(e) => {
                warn!(id = %command.id, command = %command.kind, error = %e, "command failed");
            }
            CommandOutcome::Cancelled => {
                debug!(id = %command.id, command = %command.kind, "command cancelled by emergency stop");
                return;
            }
        }
        self.record(&command, &outcome);
    }

    /// Update counters and notify the observer
    fn record(&self, command: &Command, outcome: &CommandOutcome) {
        if outcome.is_success() {
            self.commands_sent.fetch_add(1, Ordering::Relaxed);
            *self.last_command_time.lock() = Some(SystemTime::now());
        } else {
            self.commands_failed.fetch_add(1, Ordering::Relaxed);
        }

        let observer = self.observer.read().clone();
        if let Some(observer) = observer {
            if let Err(e) = call_isolated("command observer", || observer.on_command(command, outcome)) {
                self.observer_failures.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "command observer failed");
            }
        }
    }
}
