//! Actuator links
//!
//! The arm speaks newline-terminated ASCII. [`LineTransport`] frames commands
//! over any byte stream opened by a [`Connector`]; [`TcpConnector`] reaches a
//! serial-over-TCP bridge. [`MockTransport`] logs instead of sending and is used
//! for hardware-free runs and tests.

use grip_core::{DispatcherSettings, GripError, GripResult};
use parking_lot::Mutex;
use std::io::{self, BufRead, BufReader, ErrorKind, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How long to wait for a TCP connection to the bridge
const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// A link to the arm that carries one command per line
pub trait ActuatorTransport: Send {
    /// Human-readable link description for logs and status
    fn describe(&self) -> String;

    /// Open the link and verify the arm answers
    fn connect(&mut self) -> GripResult<()>;

    /// Send one command line (terminator added by the transport)
    fn send_line(&mut self, line: &str) -> GripResult<()>;

    /// Send a line and read back at most one response line
    ///
    /// `Ok(None)` means no response arrived within `timeout`.
    fn query(&mut self, line: &str, timeout: Duration) -> GripResult<Option<String>>;

    fn disconnect(&mut self);

    fn is_connected(&self) -> bool;
}

/// Build the transport selected by the dispatcher settings
pub fn transport_from_settings(settings: &DispatcherSettings) -> GripResult<Box<dyn ActuatorTransport>> {
    settings.validate()?;
    if settings.mock_mode {
        return Ok(Box::new(MockTransport::new()));
    }
    let endpoint = settings
        .endpoint
        .clone()
        .ok_or_else(|| GripError::config("an endpoint is required when mock mode is off"))?;
    Ok(Box::new(LineTransport::new(
        TcpConnector::new(endpoint),
        settings.handshake_delay(),
        settings.status_timeout(),
    )))
}

/// Shared record of lines written by a [`MockTransport`]
#[derive(Debug, Clone, Default)]
pub struct SentLog {
    lines: Arc<Mutex<Vec<String>>>,
}

impl SentLog {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lines.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.lock().is_empty()
    }

    fn push(&self, line: &str) {
        self.lines.lock().push(line.to_string());
    }
}

/// Logging no-op link
#[derive(Debug, Default)]
pub struct MockTransport {
    connected: bool,
    log: SentLog,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for inspecting what was sent, usable after the transport is boxed
    pub fn sent_log(&self) -> SentLog {
        self.log.clone()
    }
}

impl ActuatorTransport for MockTransport {
    fn describe(&self) -> String {
        "mock".to_string()
    }

    fn connect(&mut self) -> GripResult<()> {
        self.connected = true;
        info!("mock actuator connected");
        Ok(())
    }

    fn send_line(&mut self, line: &str) -> GripResult<()> {
        info!(command = line, "mock send");
        self.log.push(line);
        Ok(())
    }

    fn query(&mut self, line: &str, _timeout: Duration) -> GripResult<Option<String>> {
        self.send_line(line)?;
        Ok(None)
    }

    fn disconnect(&mut self) {
        self.connected = false;
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

/// Byte stream whose reads can time out
pub trait LinkStream: Read + Write + Send {
    fn set_response_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()>;

    /// Non-blocking reads return `WouldBlock` instead of waiting
    fn set_nonblocking(&mut self, nonblocking: bool) -> io::Result<()>;
}

impl LinkStream for TcpStream {
    fn set_response_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.set_read_timeout(timeout)
    }

    fn set_nonblocking(&mut self, nonblocking: bool) -> io::Result<()> {
        TcpStream::set_nonblocking(self, nonblocking)
    }
}

/// Opens the underlying byte stream
pub trait Connector: Send {
    type Link: LinkStream;

    fn open(&mut self) -> io::Result<Self::Link>;

    fn describe(&self) -> String;
}

/// Connects to a serial-over-TCP bridge at `host:port`
#[derive(Debug, Clone)]
pub struct TcpConnector {
    endpoint: String,
}

impl TcpConnector {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }
}

impl Connector for TcpConnector {
    type Link = TcpStream;

    fn open(&mut self) -> io::Result<TcpStream> {
        let mut last_error = io::Error::new(ErrorKind::NotFound, "endpoint resolved to no address");
        for addr in self.endpoint.to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT) {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    return Ok(stream);
                }
                Err(e) => last_error = e,
            }
        }
        Err(last_error)
    }

    fn describe(&self) -> String {
        format!("tcp://{}", self.endpoint)
    }
}

/// Newline-framed ASCII link over a [`Connector`]
pub struct LineTransport<C: Connector> {
    connector: C,
    link: Option<BufReader<C::Link>>,
    handshake_delay: Duration,
    handshake_timeout: Duration,
}

impl<C: Connector> LineTransport<C> {
    pub fn new(connector: C, handshake_delay: Duration, handshake_timeout: Duration) -> Self {
        Self {
            connector,
            link: None,
            handshake_delay,
            handshake_timeout,
        }
    }

    fn link(&mut self) -> GripResult<&mut BufReader<C::Link>> {
        self.link.as_mut().ok_or(GripError::NotConnected)
    }

    /// Drop input nobody asked for, such as the reply to a query that
    /// already timed out, so it is not read as the answer to the next one
    fn discard_pending(&mut self) -> GripResult<()> {
        let reader = self.link()?;
        let mut discarded = reader.buffer().len();
        reader.consume(discarded);

        let stream = reader.get_mut();
        stream.set_nonblocking(true)?;
        let mut scratch = [0u8; 256];
        let drained = loop {
            match stream.read(&mut scratch) {
                // A closed link is reported by the read that follows
                Ok(0) => break Ok(()),
                Ok(n) => discarded += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) if e.kind() == ErrorKind::WouldBlock => break Ok(()),
                Err(e) => break Err(e),
            }
        };
        stream.set_nonblocking(false)?;
        drained?;

        if discarded > 0 {
            warn!(bytes = discarded, "discarded stale input from the arm");
        }
        Ok(())
    }

    fn write_line(&mut self, line: &str) -> GripResult<()> {
        let stream = self.link()?.get_mut();
        stream.write_all(line.as_bytes())?;
        stream.write_all(b"\n")?;
        stream.flush()?;
        Ok(())
    }
}

impl<C: Connector> ActuatorTransport for LineTransport<C> {
    fn describe(&self) -> String {
        self.connector.describe()
    }

    fn connect(&mut self) -> GripResult<()> {
        let target = self.connector.describe();
        let stream = self.connector.open().map_err(|e| GripError::ConnectionFailed {
            reason: format!("cannot open {}: {}", target, e),
        })?;
        self.link = Some(BufReader::new(stream));

        // Arduino-style boards reset when the port opens
        if !self.handshake_delay.is_zero() {
            debug!(delay_ms = self.handshake_delay.as_millis() as u64, "waiting for arm to settle");
            std::thread::sleep(self.handshake_delay);
        }

        let timeout = self.handshake_timeout;
        match self.query("STATUS", timeout) {
            Ok(Some(response)) => {
                info!(link = %target, response = %response, "actuator connected");
                Ok(())
            }
            Ok(None) => {
                self.link = None;
                Err(GripError::ConnectionFailed {
                    reason: format!("{} did not answer STATUS within {:?}", target, timeout),
                })
            }
            Err(e) => {
                self.link = None;
                Err(GripError::ConnectionFailed {
                    reason: format!("handshake with {} failed: {}", target, e),
                })
            }
        }
    }

    fn send_line(&mut self, line: &str) -> GripResult<()> {
        self.write_line(line)?;
        debug!(command = line, "sent");
        Ok(())
    }

    fn query(&mut self, line: &str, timeout: Duration) -> GripResult<Option<String>> {
        self.discard_pending()?;
        self.write_line(line)?;
        let reader = self.link()?;
        reader.get_mut().set_response_timeout(Some(timeout))?;

        let mut response = String::new();
        match reader.read_line(&mut response) {
            Ok(0) => Err(GripError::TransportError {
                message: "link closed by the arm".to_string(),
            }),
            Ok(_) => Ok(Some(response.trim_end().to_string())),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                warn!(command = line, "no response within {:?}", timeout);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn disconnect(&mut self) {
        if self.link.take().is_some() {
            info!(link = %self.connector.describe(), "actuator disconnected");
        }
    }

    fn is_connected(&self) -> bool {
        self.link.is_some()
    }
}
