//! Device classes and address parsing for the MELSEC 1E protocol.
//!
//! This module defines the [`DeviceClass`] enum, which represents the device
//! memories reachable through 1E frames, and [`DeviceAddress`], the parsed form
//! of a human-readable address such as `X10`, `M100` or `D500`.
//!
//! # Device Classes
//!
//! | Prefix | Description | Storage | Offset radix | Wire code |
//! |--------|-------------|---------|:------------:|-----------|
//! | X  | Input | Bit | 8 | `5820` |
//! | Y  | Output | Bit | 8 | `5920` |
//! | M  | Internal relay | Bit | 10 | `4D20` |
//! | S  | State relay | Bit | 10 | `5320` |
//! | T  | Timer contact | Bit | 10 | `5453` |
//! | C  | Counter contact | Bit | 10 | `4353` |
//! | D  | Data register | Word | 10 | `4420` |
//! | TN | Timer current value | Word | 10 | `544E` |
//! | CN | Counter current value | Word | 10 | `434E` |
//!
//! # Example
//!
//! ```
//! use melsec_mc::{resolve, DeviceClass};
//!
//! let addr = resolve("X10").unwrap();
//! assert_eq!(addr.class, DeviceClass::X);
//! assert_eq!(addr.offset, 8); // X/Y offsets are octal
//! assert!(addr.is_bit());
//!
//! let addr = resolve("D10").unwrap();
//! assert_eq!(addr.offset, 10);
//! assert!(!addr.is_bit());
//! ```

use std::str::FromStr;

use crate::error::{McError, Result};

/// Device classes supported by the 1E ASCII frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DeviceClass {
    /// Input relay (bit, octal numbering).
    X,
    /// Output relay (bit, octal numbering).
    Y,
    /// Internal relay (bit).
    M,
    /// State relay (bit).
    S,
    /// Timer contact (bit).
    T,
    /// Counter contact (bit).
    C,
    /// Data register (word).
    D,
    /// Timer current value (word).
    TN,
    /// Counter current value (word).
    CN,
}

impl DeviceClass {
    /// All supported classes.
    pub const ALL: [DeviceClass; 9] = [
        DeviceClass::X,
        DeviceClass::Y,
        DeviceClass::M,
        DeviceClass::S,
        DeviceClass::T,
        DeviceClass::C,
        DeviceClass::D,
        DeviceClass::TN,
        DeviceClass::CN,
    ];

    /// Returns the 4-character device code sent on the wire.
    ///
    /// The code is the ASCII hex of the two-letter device mnemonic, with a
    /// space filling the second letter of single-letter devices.
    pub fn code(self) -> &'static str {
        match self {
            DeviceClass::X => "5820",
            DeviceClass::Y => "5920",
            DeviceClass::M => "4D20",
            DeviceClass::S => "5320",
            DeviceClass::T => "5453",
            DeviceClass::C => "4353",
            DeviceClass::D => "4420",
            DeviceClass::TN => "544E",
            DeviceClass::CN => "434E",
        }
    }

    /// Returns whether the class is bit-addressed.
    pub fn is_bit(self) -> bool {
        !matches!(self, DeviceClass::D | DeviceClass::TN | DeviceClass::CN)
    }

    /// Returns the radix used for the numeric part of an address.
    pub fn radix(self) -> u32 {
        match self {
            DeviceClass::X | DeviceClass::Y => 8,
            _ => 10,
        }
    }

    /// Returns the address prefix, e.g. `"TN"`.
    pub fn prefix(self) -> &'static str {
        match self {
            DeviceClass::X => "X",
            DeviceClass::Y => "Y",
            DeviceClass::M => "M",
            DeviceClass::S => "S",
            DeviceClass::T => "T",
            DeviceClass::C => "C",
            DeviceClass::D => "D",
            DeviceClass::TN => "TN",
            DeviceClass::CN => "CN",
        }
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|class| class.prefix() == prefix)
    }
}

impl std::fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.prefix())
    }
}

/// A parsed device address.
///
/// `offset` is always the decimal value of the head device number. For `X`
/// and `Y` the text form is octal, so `X10` has offset 8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceAddress {
    /// Device class.
    pub class: DeviceClass,
    /// Head device number.
    pub offset: u32,
}

impl DeviceAddress {
    /// Creates an address from its parts.
    pub fn new(class: DeviceClass, offset: u32) -> Self {
        Self { class, offset }
    }

    /// Returns whether the address refers to bit storage.
    pub fn is_bit(&self) -> bool {
        self.class.is_bit()
    }
}

impl FromStr for DeviceAddress {
    type Err = McError;

    fn from_str(s: &str) -> Result<Self> {
        resolve(s)
    }
}

impl std::fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.class.radix() == 8 {
            write!(f, "{}{:o}", self.class, self.offset)
        } else {
            write!(f, "{}{}", self.class, self.offset)
        }
    }
}

/// Parses an address string such as `X0`, `D500` or `TN1`.
///
/// The prefix is matched case-insensitively and surrounding whitespace is
/// ignored. The whole string must be `<letters><digits>`.
///
/// # Errors
///
/// Returns [`McError::InvalidAddress`] if the string is not of that form, the
/// prefix is not a supported class, or the number is not valid in the radix of
/// the class (octal for `X`/`Y`).
pub fn resolve(address: &str) -> Result<DeviceAddress> {
    let normalized = address.trim().to_ascii_uppercase();
    let split = normalized
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(normalized.len());
    let (prefix, digits) = normalized.split_at(split);

    if prefix.is_empty() || digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(McError::invalid_address(
            address,
            "expected <letters><digits>",
        ));
    }

    let class = DeviceClass::from_prefix(prefix).ok_or_else(|| {
        McError::invalid_address(address, format!("device {} not supported", prefix))
    })?;

    let offset = u32::from_str_radix(digits, class.radix()).map_err(|e| {
        McError::invalid_address(
            address,
            format!("bad offset '{}' for {} (radix {}): {}", digits, class, class.radix(), e),
        )
    })?;

    Ok(DeviceAddress { class, offset })
}
