//! Named, cached bindings to device addresses.
//!
//! A [`Tag`] is a passive value holder: it is updated by the poll loop and
//! never performs I/O itself. [`TagHandle`] adds write helpers that go
//! through the owning [`Client`](crate::Client).

use std::time::SystemTime;

use crate::client::Client;
use crate::device::{resolve, DeviceAddress};
use crate::error::{McError, Result};

/// Snapshot of a registered tag.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Tag {
    /// Device address as registered, e.g. `"X0"`.
    pub address: String,
    /// Logical name.
    pub name: String,
    /// Last observed value, `0` until the first change is seen.
    pub value: u16,
    /// Time of the last observed value change.
    pub last_update: Option<SystemTime>,
    /// Time of the last successful read, changed or not.
    pub last_read: Option<SystemTime>,
}

impl Tag {
    fn new(address: String, name: String) -> Self {
        Self {
            address,
            name,
            value: 0,
            last_update: None,
            last_read: None,
        }
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<Tag {} ({}): {}>", self.name, self.address, self.value)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct TagEntry {
    pub(crate) tag: Tag,
    pub(crate) device: DeviceAddress,
}

/// Tags in registration order, one per distinct address.
#[derive(Debug, Default)]
pub(crate) struct TagTable {
    entries: Vec<TagEntry>,
}

impl TagTable {
    /// Registers `address` under `name`, or renames it if already present.
    ///
    /// Addresses are keyed on the resolved device and stored in canonical
    /// form, so `x0` and `X0` are the same tag.
    pub(crate) fn insert(&mut self, address: &str, name: Option<&str>) -> Result<Tag> {
        let device = resolve(address)?;
        let address = device.to_string();
        let name = name.map(str::to_string).unwrap_or_else(|| address.clone());

        if let Some(entry) = self.entries.iter_mut().find(|e| e.device == device) {
            entry.tag.name = name;
            return Ok(entry.tag.clone());
        }

        let tag = Tag::new(address, name);
        self.entries.push(TagEntry {
            tag: tag.clone(),
            device,
        });
        Ok(tag)
    }

    /// Looks a tag up by name first, then by address in any accepted spelling.
    pub(crate) fn get(&self, name_or_address: &str) -> Option<&Tag> {
        self.entries
            .iter()
            .find(|e| e.tag.name == name_or_address)
            .or_else(|| {
                let device = resolve(name_or_address).ok()?;
                self.entries.iter().find(|e| e.device == device)
            })
            .map(|e| &e.tag)
    }

    pub(crate) fn get_mut_by_address(&mut self, address: &str) -> Option<&mut Tag> {
        self.entries
            .iter_mut()
            .find(|e| e.tag.address == address)
            .map(|e| &mut e.tag)
    }

    /// Addresses to poll, in registration order.
    pub(crate) fn targets(&self) -> Vec<(String, DeviceAddress)> {
        self.entries
            .iter()
            .map(|e| (e.tag.address.clone(), e.device))
            .collect()
    }

    pub(crate) fn snapshot(&self) -> Vec<Tag> {
        self.entries.iter().map(|e| e.tag.clone()).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

/// A tag bound to its client, for reading the cache and writing the device.
///
/// ```no_run
/// use melsec_mc::Client;
///
/// let client = Client::connect("192.168.3.254", 5000)?;
/// client.add_tag("Y0", Some("Lamp"))?;
///
/// let lamp = client.tag("Lamp")?;
/// lamp.on()?;
/// lamp.toggle()?;
/// println!("Lamp = {}", lamp.value());
/// # Ok::<(), melsec_mc::McError>(())
/// ```
#[derive(Debug, Clone)]
pub struct TagHandle<'c> {
    client: &'c Client,
    address: String,
}

impl<'c> TagHandle<'c> {
    pub(crate) fn new(client: &'c Client, address: String) -> Self {
        Self { client, address }
    }

    fn snapshot(&self) -> Result<Tag> {
        self.client
            .get_tag(&self.address)
            .ok_or_else(|| McError::TagNotFound {
                name: self.address.clone(),
            })
    }

    /// Returns the tag's address.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Returns the tag's name.
    pub fn name(&self) -> String {
        self.snapshot().map(|t| t.name).unwrap_or_default()
    }

    /// Returns the cached value.
    pub fn value(&self) -> u16 {
        self.snapshot().map(|t| t.value).unwrap_or_default()
    }

    /// Returns the time of the last observed change.
    pub fn last_update(&self) -> Option<SystemTime> {
        self.snapshot().ok().and_then(|t| t.last_update)
    }

    /// Returns the time of the last successful read.
    pub fn last_read(&self) -> Option<SystemTime> {
        self.snapshot().ok().and_then(|t| t.last_read)
    }

    /// Writes `value` to the device. The cache is updated by the next poll.
    pub fn set(&self, value: u16) -> Result<()> {
        self.client.write(&self.address, &[value])
    }

    /// Writes `1`.
    pub fn on(&self) -> Result<()> {
        self.set(1)
    }

    /// Writes `0`.
    pub fn off(&self) -> Result<()> {
        self.set(0)
    }

    /// Writes the inverse of the cached value (`0` when non-zero, else `1`).
    pub fn toggle(&self) -> Result<()> {
        let next = if self.snapshot()?.value != 0 { 0 } else { 1 };
        self.set(next)
    }
}
