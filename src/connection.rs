//! TCP connection to the controller.
//!
//! [`Connection`] owns the byte stream and performs one request/response
//! exchange at a time. It knows nothing about 1E frames beyond a completion
//! predicate supplied by the caller.
//!
//! # Reconnection
//!
//! The connection is a two-state machine:
//!
//! ```text
//! Disconnected --connect ok--> Connected
//! Connected --I/O error--> Disconnected --reconnect--> Connected --retry once--> ok | ConnectionLost
//! ```
//!
//! An exchange that fails on I/O drops the socket, reconnects once and
//! retries the same request once. A second failure, or a failed connect, is
//! reported as [`McError::ConnectionLost`]. Longer retry policies belong to
//! the caller (the poller simply tries again next cycle).

use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{McError, Result};

/// Default TCP port for MC protocol communication.
pub const DEFAULT_PORT: u16 = 5000;

/// Default timeout for connect, read and write.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Size of a single socket read.
pub const READ_CHUNK_SIZE: usize = 4096;

/// Number of reconnect-and-retry rounds after a failed exchange.
const MAX_RECONNECTS: usize = 1;

/// Connection state.
#[derive(Debug)]
pub enum ConnectionState {
    /// No socket is open.
    Disconnected,
    /// A socket is open.
    Connected(TcpStream),
}

impl ConnectionState {
    /// Returns whether a socket is open.
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected(_))
    }
}

/// Transition inputs of the connection state machine.
enum Transition {
    Connected(TcpStream),
    IoFailed,
}

fn next_state(transition: Transition) -> ConnectionState {
    match transition {
        Transition::Connected(stream) => ConnectionState::Connected(stream),
        Transition::IoFailed => ConnectionState::Disconnected,
    }
}

/// A serialized byte-stream connection with single-retry reconnection.
pub struct Connection {
    host: String,
    port: u16,
    timeout: Duration,
    state: Mutex<ConnectionState>,
    // Clone of the live socket, used by `close` to interrupt an exchange
    // without waiting for the state lock.
    interrupt: Mutex<Option<TcpStream>>,
    closed: AtomicBool,
    connects: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Connection {
    /// Creates a connection in the `Disconnected` state without touching the network.
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            timeout,
            state: Mutex::new(ConnectionState::Disconnected),
            interrupt: Mutex::new(None),
            closed: AtomicBool::new(false),
            connects: AtomicUsize::new(0),
        }
    }

    /// Opens the socket if it is not already open.
    ///
    /// # Errors
    ///
    /// Returns [`McError::ConnectionLost`] if the host cannot be resolved or
    /// does not accept the connection within the timeout. The state stays
    /// `Disconnected`.
    pub fn connect(&self) -> Result<()> {
        let mut state = lock(&self.state);
        if state.is_connected() {
            return Ok(());
        }
        *state = self.open()?;
        Ok(())
    }

    fn resolve_addr(&self) -> Result<SocketAddr> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| McError::connection_lost(format!("cannot resolve {}: {}", self.host, e)))?
            .next()
            .ok_or_else(|| McError::connection_lost(format!("no address for {}", self.host)))
    }

    fn open(&self) -> Result<ConnectionState> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(McError::connection_lost("connection closed"));
        }

        let addr = self.resolve_addr()?;
        self.connects.fetch_add(1, Ordering::SeqCst);
        debug!(%addr, "connecting to PLC");

        let stream = TcpStream::connect_timeout(&addr, self.timeout)
            .and_then(|stream| {
                stream.set_read_timeout(Some(self.timeout))?;
                stream.set_write_timeout(Some(self.timeout))?;
                stream.set_nodelay(true)?;
                Ok(stream)
            })
            .map_err(|e| {
                warn!(%addr, error = %e, "connection failed");
                McError::connection_lost(format!("cannot connect to {}: {}", addr, e))
            })?;

        *lock(&self.interrupt) = stream.try_clone().ok();
        // `close` may have run while connecting and found no socket to shut down.
        if self.closed.load(Ordering::SeqCst) {
            lock(&self.interrupt).take();
            let _ = stream.shutdown(Shutdown::Both);
            return Err(McError::connection_lost("connection closed"));
        }
        info!(%addr, "connected to PLC");
        Ok(next_state(Transition::Connected(stream)))
    }

    /// Sends `request` and collects the reply until `is_complete` accepts it.
    ///
    /// Only one exchange runs at a time; concurrent callers queue on an
    /// internal lock. A missing socket is opened first.
    ///
    /// # Errors
    ///
    /// Returns [`McError::ConnectionLost`] if the connection cannot be
    /// established, or if the exchange fails again after one reconnect.
    pub fn exchange<F>(&self, request: &[u8], is_complete: F) -> Result<Vec<u8>>
    where
        F: Fn(&[u8]) -> bool,
    {
        let mut state = lock(&self.state);
        let mut last_error = None;

        for attempt in 0..=MAX_RECONNECTS {
            if self.closed.load(Ordering::SeqCst) {
                *state = next_state(Transition::IoFailed);
                return Err(McError::connection_lost("connection closed"));
            }
            if !state.is_connected() {
                if attempt > 0 {
                    warn!(host = %self.host, port = self.port, "reconnecting");
                }
                *state = self.open()?;
            }

            let ConnectionState::Connected(stream) = &mut *state else {
                continue;
            };

            match send_receive(stream, request, &is_complete) {
                Ok(response) => {
                    debug!(
                        tx = %String::from_utf8_lossy(request),
                        rx = %String::from_utf8_lossy(&response),
                        "exchange"
                    );
                    return Ok(response);
                }
                Err(e) => {
                    warn!(attempt, error = %e, "socket error");
                    *state = next_state(Transition::IoFailed);
                    *lock(&self.interrupt) = None;
                    last_error = Some(e);
                    if self.closed.load(Ordering::SeqCst) {
                        break;
                    }
                }
            }
        }

        Err(McError::connection_lost(match last_error {
            Some(e) => format!("lost connection to PLC: {}", e),
            None => "lost connection to PLC".to_string(),
        }))
    }

    /// Shuts the socket down and refuses further connects.
    ///
    /// An exchange blocked on the socket fails immediately.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(stream) = lock(&self.interrupt).take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        info!(host = %self.host, port = self.port, "connection closed");
    }

    /// Returns whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Returns whether a socket is currently open.
    ///
    /// Blocks while an exchange is in flight.
    pub fn is_connected(&self) -> bool {
        lock(&self.state).is_connected()
    }

    /// Number of connect attempts made so far, including failed ones.
    pub fn connect_attempts(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Returns the configured host.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the configured port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns the configured timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

fn send_receive<F>(stream: &mut TcpStream, request: &[u8], is_complete: &F) -> std::io::Result<Vec<u8>>
where
    F: Fn(&[u8]) -> bool,
{
    stream.write_all(request)?;

    let mut response = Vec::new();
    let mut buffer = [0u8; READ_CHUNK_SIZE];
    loop {
        let size = stream.read(&mut buffer)?;
        if size == 0 {
            if response.is_empty() {
                return Err(std::io::Error::new(
                    ErrorKind::UnexpectedEof,
                    "connection closed by peer",
                ));
            }
            // Peer closed after a partial reply; let the decoder report it.
            return Ok(response);
        }
        response.extend_from_slice(&buffer[..size]);
        if is_complete(&response) {
            return Ok(response);
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("timeout", &self.timeout)
            .field("closed", &self.is_closed())
            .finish()
    }
}
