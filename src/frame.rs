//! 1E ASCII frame encoding and decoding.
//!
//! # Request Layout
//!
//! All fields are upper-case ASCII hex.
//!
//! | Field | Size | Description |
//! |-------|------|-------------|
//! | Command | 2 chars | `00` bit read, `01` word read, `02` bit write, `03` word write |
//! | Station | 2 chars | fixed `FF` |
//! | Timer | 4 chars | fixed `000A` |
//! | Device code | 4 chars | see [`DeviceClass::code`](crate::DeviceClass::code) |
//! | Head offset | 8 chars | big-endian |
//! | Point count | 4 chars | low byte first, then high byte |
//! | Data | variable | writes only |
//!
//! # Response Layout
//!
//! `<subheader (2 chars)><status (2 chars)><payload>`. A status of `00` means
//! success; anything else is reported as [`McError::DeviceError`].
//!
//! # Example
//!
//! ```
//! use melsec_mc::{frame, resolve};
//!
//! let request = frame::encode_read(&resolve("D0").unwrap(), 10).unwrap();
//! assert_eq!(request, b"01FF000A4420000000000A00");
//!
//! let response = frame::decode_response(b"81000001002A").unwrap();
//! assert_eq!(frame::decode_words(&response.payload, 2).unwrap(), vec![1, 42]);
//! ```

use crate::device::DeviceAddress;
use crate::error::{McError, Result};

/// Fixed station number field.
pub const STATION: &str = "FF";

/// Fixed monitoring timer field.
pub const MONITORING_TIMER: &str = "000A";

/// Maximum number of points in a single read or write command.
pub const MAX_POINTS_PER_COMMAND: usize = 256;

/// Length of the subheader plus status field in a response.
pub const RESPONSE_HEADER_LEN: usize = 4;

/// 1E command codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Batch read in bit units.
    BitRead,
    /// Batch read in word units.
    WordRead,
    /// Batch write in bit units.
    BitWrite,
    /// Batch write in word units.
    WordWrite,
}

impl Command {
    /// Returns the command byte.
    pub fn code(self) -> u8 {
        match self {
            Command::BitRead => 0x00,
            Command::WordRead => 0x01,
            Command::BitWrite => 0x02,
            Command::WordWrite => 0x03,
        }
    }

    /// Picks the read command matching the storage kind of `address`.
    pub fn read_for(address: &DeviceAddress) -> Self {
        if address.is_bit() {
            Command::BitRead
        } else {
            Command::WordRead
        }
    }

    /// Picks the write command matching the storage kind of `address`.
    pub fn write_for(address: &DeviceAddress) -> Self {
        if address.is_bit() {
            Command::BitWrite
        } else {
            Command::WordWrite
        }
    }
}

fn check_points(parameter: &str, count: usize) -> Result<()> {
    if count == 0 {
        return Err(McError::invalid_parameter(parameter, "must be greater than 0"));
    }
    if count > MAX_POINTS_PER_COMMAND {
        return Err(McError::invalid_parameter(
            parameter,
            format!("must not exceed {}", MAX_POINTS_PER_COMMAND),
        ));
    }
    Ok(())
}

fn encode(command: Command, address: &DeviceAddress, points: usize, data: &str) -> Vec<u8> {
    format!(
        "{:02X}{}{}{}{:08X}{:02X}{:02X}{}",
        command.code(),
        STATION,
        MONITORING_TIMER,
        address.class.code(),
        address.offset,
        points & 0xFF,
        (points >> 8) & 0xFF,
        data
    )
    .into_bytes()
}

/// Builds a batch read request for `count` points starting at `address`.
///
/// # Errors
///
/// Returns [`McError::InvalidParameter`] if `count` is 0 or exceeds
/// [`MAX_POINTS_PER_COMMAND`].
pub fn encode_read(address: &DeviceAddress, count: usize) -> Result<Vec<u8>> {
    check_points("count", count)?;
    Ok(encode(Command::read_for(address), address, count, ""))
}

/// Builds a batch write request for `values` starting at `address`.
///
/// Bit devices take one `'0'`/`'1'` character per value (any non-zero value
/// is ON), padded with a trailing `'0'` to an even length. Word devices take
/// four hex characters per value.
///
/// # Errors
///
/// Returns [`McError::InvalidParameter`] if `values` is empty or longer than
/// [`MAX_POINTS_PER_COMMAND`].
pub fn encode_write(address: &DeviceAddress, values: &[u16]) -> Result<Vec<u8>> {
    check_points("values", values.len())?;

    let data = if address.is_bit() {
        let mut bits: String = values
            .iter()
            .map(|&v| if v != 0 { '1' } else { '0' })
            .collect();
        if bits.len() % 2 == 1 {
            bits.push('0');
        }
        bits
    } else {
        values.iter().map(|v| format!("{:04X}", v)).collect()
    };

    Ok(encode(Command::write_for(address), address, values.len(), &data))
}

/// Number of characters a successful reply to `command` carries.
pub fn expected_response_len(command: Command, points: usize) -> usize {
    match command {
        Command::BitRead => RESPONSE_HEADER_LEN + points + points % 2,
        Command::WordRead => RESPONSE_HEADER_LEN + points * 4,
        Command::BitWrite | Command::WordWrite => RESPONSE_HEADER_LEN,
    }
}

/// Returns whether `received` holds a whole reply.
///
/// An error reply is complete as soon as its status field has arrived.
pub fn is_complete(received: &[u8], expected_len: usize) -> bool {
    if received.len() < RESPONSE_HEADER_LEN {
        return false;
    }
    &received[2..4] != b"00" || received.len() >= expected_len
}

/// A decoded 1E reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Subheader echoed by the controller (command code with the high bit set).
    pub subheader: String,
    /// Status field, `"00"` on success.
    pub status: String,
    /// Remaining characters after the status field.
    pub payload: String,
}

/// Splits a raw reply into its fields and checks the status.
///
/// Non-ASCII bytes are replaced and surrounding whitespace is trimmed before
/// parsing.
///
/// # Errors
///
/// - [`McError::ShortResponse`] if fewer than 4 characters were received.
/// - [`McError::DeviceError`] if the status field is not `"00"`.
pub fn decode_response(raw: &[u8]) -> Result<Response> {
    let text = String::from_utf8_lossy(raw);
    let text = text.trim();

    let (subheader, status, payload) = match (text.get(..2), text.get(2..4), text.get(4..)) {
        (Some(subheader), Some(status), Some(payload)) => (subheader, status, payload),
        _ => {
            return Err(McError::short_response(format!(
                "expected at least {} characters, got {:?}",
                RESPONSE_HEADER_LEN, text
            )))
        }
    };

    if status != "00" {
        return Err(McError::device_error(status));
    }

    Ok(Response {
        subheader: subheader.to_string(),
        status: status.to_string(),
        payload: payload.to_string(),
    })
}

/// Decodes a bit payload: `'1'` is ON, any other character is OFF.
///
/// # Errors
///
/// Returns [`McError::ShortResponse`] if fewer than `count` characters are present.
pub fn decode_bits(payload: &str, count: usize) -> Result<Vec<u16>> {
    let available = payload.chars().count();
    if available < count {
        return Err(McError::short_response(format!(
            "expected {} bit characters, got {}",
            count, available
        )));
    }
    Ok(payload
        .chars()
        .take(count)
        .map(|c| u16::from(c == '1'))
        .collect())
}

/// Decodes a word payload: every 4 hex characters form one big-endian value.
///
/// # Errors
///
/// Returns [`McError::ShortResponse`] if the payload holds fewer than `count`
/// words or a word is not valid hex.
pub fn decode_words(payload: &str, count: usize) -> Result<Vec<u16>> {
    if payload.len() < count * 4 {
        return Err(McError::short_response(format!(
            "expected {} word characters, got {}",
            count * 4,
            payload.len()
        )));
    }
    (0..count)
        .map(|i| {
            let chunk = payload.get(i * 4..i * 4 + 4).unwrap_or_default();
            u16::from_str_radix(chunk, 16)
                .map_err(|_| McError::short_response(format!("invalid word {:?}", chunk)))
        })
        .collect()
}
