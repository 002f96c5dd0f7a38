//! High-level MELSEC client.
//!
//! This module provides the [`Client`] struct, the public entry point for
//! reading and writing controller devices, registering tags, polling them in
//! the background and subscribing to their changes.
//!
//! # Example
//!
//! ```no_run
//! use melsec_mc::{Client, ClientConfig};
//! use std::time::Duration;
//!
//! let config = ClientConfig::new("192.168.3.254", 5000).with_timeout(Duration::from_secs(1));
//! let client = Client::new(config)?;
//!
//! // Read four outputs starting at Y0
//! let outputs = client.read("Y0", 4)?;
//!
//! // Write two data registers
//! client.write("D100", &[1234, 5678])?;
//! # Ok::<(), melsec_mc::McError>(())
//! ```
//!
//! # Thread Safety
//!
//! `Client` is a cheap handle around shared state and can be cloned into
//! other threads. Exchanges on the wire are serialized by the connection, so
//! manual reads and writes never interleave with poll reads.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::connection::{Connection, DEFAULT_PORT, DEFAULT_TIMEOUT};
use crate::correlator::Dispatcher;
use crate::device::{resolve, DeviceAddress};
use crate::error::{McError, Result};
use crate::event::{Event, Events, Predicate};
use crate::frame::{self, Command};
use crate::poller::{poll_cycle, Poller, DEFAULT_POLL_INTERVAL};
use crate::tag::{Tag, TagHandle, TagTable};
use crate::utils;

/// Configuration for creating a client.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClientConfig {
    /// Controller host name or IP address.
    pub host: String,
    /// Controller TCP port.
    pub port: u16,
    /// Timeout for connect, send and receive.
    pub timeout: Duration,
    /// Interval used by [`Client::start_polling_default`].
    pub poll_interval: Duration,
    /// Skip the initial connect; the first exchange connects instead.
    pub lazy_connect: bool,
}

impl ClientConfig {
    /// Creates a configuration with the default timeout and poll interval.
    ///
    /// # Example
    ///
    /// ```
    /// use melsec_mc::ClientConfig;
    ///
    /// let config = ClientConfig::new("192.168.3.254", 5000);
    /// assert_eq!(config.timeout, std::time::Duration::from_secs(2));
    /// ```
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            timeout: DEFAULT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            lazy_connect: false,
        }
    }

    /// Sets a custom timeout (default is 2 seconds).
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the default poll interval (default is 100 ms).
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Defers connecting until the first exchange.
    pub fn with_lazy_connect(mut self, lazy: bool) -> Self {
        self.lazy_connect = lazy;
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new("127.0.0.1", DEFAULT_PORT)
    }
}

/// State shared between client handles and the poll thread.
pub(crate) struct Shared {
    pub(crate) config: ClientConfig,
    pub(crate) connection: Connection,
    pub(crate) dispatcher: Mutex<Dispatcher>,
    pub(crate) cycle: Mutex<()>,
    tags: RwLock<TagTable>,
    poller: Mutex<Option<Poller>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    pub(crate) fn tags(&self) -> RwLockReadGuard<'_, TagTable> {
        self.tags.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn tags_mut(&self) -> RwLockWriteGuard<'_, TagTable> {
        self.tags.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn execute(&self, command: Command, request: &[u8], points: usize) -> Result<frame::Response> {
        let expected = frame::expected_response_len(command, points);
        let raw = self
            .connection
            .exchange(request, |received| frame::is_complete(received, expected))?;
        frame::decode_response(&raw)
    }

    pub(crate) fn read_device(&self, device: &DeviceAddress, count: usize) -> Result<Vec<u16>> {
        let command = Command::read_for(device);
        let request = frame::encode_read(device, count)?;
        let response = self.execute(command, &request, count).map_err(|e| {
            debug!(%device, error = %e, "read failed");
            e
        })?;

        if device.is_bit() {
            frame::decode_bits(&response.payload, count)
        } else {
            frame::decode_words(&response.payload, count)
        }
    }

    pub(crate) fn write_device(&self, device: &DeviceAddress, values: &[u16]) -> Result<()> {
        let command = Command::write_for(device);
        let request = frame::encode_write(device, values)?;
        self.execute(command, &request, values.len()).map_err(|e| {
            debug!(%device, error = %e, "write failed");
            e
        })?;
        Ok(())
    }

    fn shutdown(&self) {
        self.connection.close();
        // Release the lock before joining; callbacks on the poll thread may take it.
        let poller = lock(&self.poller).take();
        if let Some(poller) = poller {
            poller.stop();
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// MELSEC 1E client.
///
/// Combines address resolution, frame encoding and the connection into
/// typed read/write operations, and owns the tag cache, the poll loop and
/// the change subscribers.
///
/// # Example
///
/// ```no_run
/// use melsec_mc::{Client, Predicate};
/// use std::time::Duration;
///
/// let client = Client::connect("192.168.3.254", 5000)?;
/// client.add_tag("X0", Some("Left"))?;
/// client.add_tag("X1", Some("Right"))?;
///
/// client.on_change(|event| println!("{}", event));
/// client.on_simultaneous(
///     Predicate::all(["Left", "Right"], 1),
///     Duration::from_millis(400),
///     |events| println!("both pressed: {} events", events.len()),
/// );
///
/// client.start_polling(Duration::from_millis(50))?;
/// # Ok::<(), melsec_mc::McError>(())
/// ```
#[derive(Clone)]
pub struct Client {
    shared: Arc<Shared>,
}

impl Client {
    /// Creates a client from `config`.
    ///
    /// Unless `lazy_connect` is set, the connection is opened immediately.
    ///
    /// # Errors
    ///
    /// Returns [`McError::ConnectionLost`] if the controller cannot be reached.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let connection = Connection::new(config.host.clone(), config.port, config.timeout);
        if !config.lazy_connect {
            connection.connect()?;
        }

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                connection,
                dispatcher: Mutex::new(Dispatcher::default()),
                cycle: Mutex::new(()),
                tags: RwLock::new(TagTable::default()),
                poller: Mutex::new(None),
            }),
        })
    }

    /// Connects to `host:port` with default settings.
    pub fn connect(host: impl Into<String>, port: u16) -> Result<Self> {
        Self::new(ClientConfig::new(host, port))
    }

    /// Returns the configuration the client was built with.
    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    /// Returns the underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.shared.connection
    }

    /// Reads `count` points starting at `address`.
    ///
    /// Bit devices yield `0`/`1` per point; word devices yield the raw 16-bit value.
    ///
    /// # Errors
    ///
    /// - [`McError::InvalidAddress`] for a malformed or unsupported address.
    /// - [`McError::InvalidParameter`] if `count` is 0 or above 256.
    /// - [`McError::ConnectionLost`], [`McError::ShortResponse`] or
    ///   [`McError::DeviceError`] from the exchange.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # let client = melsec_mc::Client::connect("192.168.3.254", 5000)?;
    /// let inputs = client.read("X0", 8)?;
    /// let speed = client.read("D100", 1)?[0];
    /// # Ok::<(), melsec_mc::McError>(())
    /// ```
    pub fn read(&self, address: &str, count: usize) -> Result<Vec<u16>> {
        let device = resolve(address)?;
        self.shared.read_device(&device, count)
    }

    /// Writes `values` starting at `address`.
    ///
    /// For bit devices any non-zero value is written as ON.
    ///
    /// # Errors
    ///
    /// Same as [`read`](Self::read); `InvalidParameter` if `values` is empty
    /// or longer than 256.
    pub fn write(&self, address: &str, values: &[u16]) -> Result<()> {
        let device = resolve(address)?;
        self.shared.write_device(&device, values)
    }

    /// Reads a single point.
    pub fn read_value(&self, address: &str) -> Result<u16> {
        let values = self.read(address, 1)?;
        values
            .first()
            .copied()
            .ok_or_else(|| McError::short_response("no value returned"))
    }

    /// Writes a single point.
    pub fn write_value(&self, address: &str, value: u16) -> Result<()> {
        self.write(address, &[value])
    }

    /// Reads a single bit device.
    pub fn read_bit(&self, address: &str) -> Result<bool> {
        Ok(self.read_value(address)? != 0)
    }

    /// Writes a single bit device.
    pub fn write_bit(&self, address: &str, value: bool) -> Result<()> {
        self.write_value(address, u16::from(value))
    }

    fn word_device(address: &str) -> Result<DeviceAddress> {
        let device = resolve(address)?;
        if device.is_bit() {
            return Err(McError::invalid_address(
                address,
                "32-bit and text access need a word device",
            ));
        }
        Ok(device)
    }

    fn read_pair(&self, address: &str) -> Result<[u16; 2]> {
        let device = Self::word_device(address)?;
        let words = self.shared.read_device(&device, 2)?;
        Ok([words[0], words[1]])
    }

    /// Reads a signed 32-bit value from two consecutive word devices (low word first).
    pub fn read_i32(&self, address: &str) -> Result<i32> {
        self.read_pair(address).map(utils::words_to_i32)
    }

    /// Writes a signed 32-bit value to two consecutive word devices (low word first).
    pub fn write_i32(&self, address: &str, value: i32) -> Result<()> {
        let device = Self::word_device(address)?;
        self.shared.write_device(&device, &utils::i32_to_words(value))
    }

    /// Reads a 32-bit float from two consecutive word devices (low word first).
    pub fn read_f32(&self, address: &str) -> Result<f32> {
        self.read_pair(address).map(utils::words_to_f32)
    }

    /// Writes a 32-bit float to two consecutive word devices (low word first).
    pub fn write_f32(&self, address: &str, value: f32) -> Result<()> {
        let device = Self::word_device(address)?;
        self.shared.write_device(&device, &utils::f32_to_words(value))
    }

    /// Reads ASCII text stored two characters per word, trimming trailing NULs.
    pub fn read_string(&self, address: &str, word_count: usize) -> Result<String> {
        let device = Self::word_device(address)?;
        let words = self.shared.read_device(&device, word_count)?;
        Ok(utils::words_to_string(&words))
    }

    /// Writes ASCII text two characters per word.
    ///
    /// # Errors
    ///
    /// Returns [`McError::InvalidParameter`] if `value` is empty or not ASCII.
    pub fn write_string(&self, address: &str, value: &str) -> Result<()> {
        if value.is_empty() {
            return Err(McError::invalid_parameter("value", "string cannot be empty"));
        }
        if !value.is_ascii() {
            return Err(McError::invalid_parameter("value", "string must be ASCII"));
        }
        let device = Self::word_device(address)?;
        self.shared
            .write_device(&device, &utils::string_to_words(value))
    }

    /// Registers a tag for `address`, named `name` or the address itself.
    ///
    /// Registering an address again only renames its tag.
    ///
    /// # Errors
    ///
    /// Returns [`McError::InvalidAddress`] for a malformed or unsupported address.
    pub fn add_tag(&self, address: &str, name: Option<&str>) -> Result<Tag> {
        let tag = self.shared.tags_mut().insert(address, name)?;
        debug!(address = %tag.address, name = %tag.name, "tag registered");
        Ok(tag)
    }

    /// Returns a snapshot of the tag registered under `name_or_address`.
    ///
    /// Names take precedence over addresses.
    pub fn get_tag(&self, name_or_address: &str) -> Option<Tag> {
        self.shared.tags().get(name_or_address).cloned()
    }

    /// Returns a handle to the tag registered under `name_or_address`.
    ///
    /// # Errors
    ///
    /// Returns [`McError::TagNotFound`] if no such tag is registered.
    pub fn tag(&self, name_or_address: &str) -> Result<TagHandle<'_>> {
        let tag = self
            .get_tag(name_or_address)
            .ok_or_else(|| McError::TagNotFound {
                name: name_or_address.to_string(),
            })?;
        Ok(TagHandle::new(self, tag.address))
    }

    /// Returns snapshots of all tags in registration order.
    pub fn tags(&self) -> Vec<Tag> {
        self.shared.tags().snapshot()
    }

    /// Subscribes `callback` to every change event.
    ///
    /// Subscribers live as long as the client. One that captures a `Client`
    /// clone keeps the client alive after every other handle is dropped, so
    /// such clients must be shut down with [`close`](Self::close).
    pub fn on_change<F>(&self, callback: F)
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        lock(&self.shared.dispatcher).add_observer(Arc::new(callback));
    }

    /// Subscribes `callback` to occurrences of `predicate` within `duration`.
    ///
    /// The callback receives the events inside the window. It fires only when
    /// the newest change is one of the predicate's pairs and all pairs are
    /// present in the window.
    pub fn on_simultaneous<F>(&self, predicate: Predicate, duration: Duration, callback: F)
    where
        F: Fn(&Events) + Send + Sync + 'static,
    {
        lock(&self.shared.dispatcher)
            .correlator_mut()
            .add_listener(predicate, duration, callback);
    }

    /// Subscribes `callback` to every change, with the events of the last `duration`.
    pub fn on_window<F>(&self, duration: Duration, callback: F)
    where
        F: Fn(&Events) + Send + Sync + 'static,
    {
        lock(&self.shared.dispatcher)
            .correlator_mut()
            .add_window_listener(duration, callback);
    }

    /// Returns the correlation history currently retained.
    pub fn history(&self) -> Events {
        lock(&self.shared.dispatcher).correlator().history()
    }

    /// Runs one poll cycle on the calling thread and returns the changes found.
    ///
    /// Each change is also dispatched to the subscribers. Cycles never
    /// overlap with the background loop.
    pub fn poll_once(&self) -> Vec<Event> {
        poll_cycle(&self.shared)
    }

    /// Starts the background poll loop.
    ///
    /// A zero `interval` runs cycles back to back, yielding between them.
    ///
    /// # Errors
    ///
    /// - [`McError::AlreadyPolling`] if a loop is running.
    /// - [`McError::ConnectionLost`] if the client has been closed.
    /// - [`McError::Io`] if the thread cannot be spawned.
    pub fn start_polling(&self, interval: Duration) -> Result<()> {
        if self.shared.connection.is_closed() {
            return Err(McError::connection_lost("client closed"));
        }

        let mut poller = lock(&self.shared.poller);
        if poller.as_ref().is_some_and(Poller::is_running) {
            return Err(McError::AlreadyPolling);
        }

        *poller = Some(Poller::spawn(Arc::downgrade(&self.shared), interval)?);
        Ok(())
    }

    /// Starts the background poll loop with the configured interval.
    pub fn start_polling_default(&self) -> Result<()> {
        self.start_polling(self.shared.config.poll_interval)
    }

    /// Stops the background poll loop, waiting for the current cycle to end.
    pub fn stop_polling(&self) {
        let poller = lock(&self.shared.poller).take();
        if let Some(poller) = poller {
            poller.stop();
        }
    }

    /// Returns whether the background poll loop is running.
    pub fn is_polling(&self) -> bool {
        lock(&self.shared.poller)
            .as_ref()
            .is_some_and(Poller::is_running)
    }

    /// Returns whether the connection currently has an open socket.
    pub fn is_connected(&self) -> bool {
        self.shared.connection.is_connected()
    }

    /// Stops polling and closes the connection.
    ///
    /// An exchange in flight fails with [`McError::ConnectionLost`], as does
    /// every later read or write.
    pub fn close(&self) {
        if self.shared.connection.is_closed() {
            warn!("client already closed");
        }
        self.shared.shutdown();
        info!(host = %self.shared.config.host, "client closed");
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.shared.config)
            .field("tags", &self.shared.tags().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline() -> Client {
        Client::new(
            ClientConfig::new("127.0.0.1", 1)
                .with_timeout(Duration::from_millis(100))
                .with_lazy_connect(true),
        )
        .unwrap()
    }

    #[test]
    fn test_client_config_new() {
        let config = ClientConfig::new("192.168.3.254", 5000);
        assert_eq!(config.host, "192.168.3.254");
        assert_eq!(config.port, 5000);
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
        assert_eq!(config.poll_interval, DEFAULT_POLL_INTERVAL);
        assert!(!config.lazy_connect);
    }

    #[test]
    fn test_client_config_builders() {
        let config = ClientConfig::new("plc", 5001)
            .with_timeout(Duration::from_secs(5))
            .with_poll_interval(Duration::ZERO)
            .with_lazy_connect(true);
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.poll_interval, Duration::ZERO);
        assert!(config.lazy_connect);
    }

    #[test]
    fn test_invalid_address_before_io() {
        let client = offline();
        assert!(matches!(
            client.read("Q0", 1),
            Err(McError::InvalidAddress { .. })
        ));
        assert!(matches!(
            client.write("Z9", &[1]),
            Err(McError::InvalidAddress { .. })
        ));
        assert_eq!(client.connection().connect_attempts(), 0);
    }

    #[test]
    fn test_word_helpers_reject_bit_devices() {
        let client = offline();
        assert!(matches!(
            client.read_i32("X0"),
            Err(McError::InvalidAddress { .. })
        ));
        assert!(matches!(
            client.write_string("M0", "AB"),
            Err(McError::InvalidAddress { .. })
        ));
        assert!(matches!(
            client.write_string("D0", ""),
            Err(McError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_tag_lookup() {
        let client = offline();
        client.add_tag("X0", Some("Start")).unwrap();
        assert_eq!(client.get_tag("Start").unwrap().address, "X0");
        assert_eq!(client.tag("X0").unwrap().name(), "Start");
        assert!(matches!(
            client.tag("Missing"),
            Err(McError::TagNotFound { .. })
        ));
    }

    #[test]
    fn test_add_tag_any_address_spelling() {
        let client = offline();
        client.add_tag("x0", Some("Start")).unwrap();
        let tag = client.add_tag("X0", None).unwrap();
        assert_eq!(tag.address, "X0");
        assert_eq!(tag.name, "X0");
        assert_eq!(client.tags().len(), 1);
    }

    #[test]
    fn test_closed_client_refuses_polling() {
        let client = offline();
        client.close();
        assert!(matches!(
            client.start_polling(Duration::ZERO),
            Err(McError::ConnectionLost { .. })
        ));
        assert!(matches!(
            client.read("D0", 1),
            Err(McError::ConnectionLost { .. })
        ));
    }

    #[test]
    fn test_client_debug() {
        let client = offline();
        let debug_str = format!("{:?}", client);
        assert!(debug_str.contains("Client"));
        assert!(debug_str.contains("127.0.0.1"));
    }
}
