//! Conversion helpers for word-device data.
//!
//! MELSEC controllers store 32-bit values in two consecutive word devices
//! with the low word at the lower address, and ASCII text two characters per
//! word with the first character in the low byte.
//!
//! # Example
//!
//! ```
//! use melsec_mc::utils::{i32_to_words, words_to_i32, get_bit, format_hex};
//!
//! let words = i32_to_words(-2);
//! assert_eq!(words, [0xFFFE, 0xFFFF]);
//! assert_eq!(words_to_i32(words), -2);
//!
//! assert!(get_bit(0b0100, 2));
//! assert_eq!(format_hex(0x00A5), "0x00A5");
//! ```

/// Gets a single bit from a 16-bit word (bit 0 is the LSB).
#[inline]
pub fn get_bit(value: u16, bit: u8) -> bool {
    (value & (1 << bit)) != 0
}

/// Returns `value` with `bit` set to `state`.
#[inline]
pub fn set_bit(value: u16, bit: u8, state: bool) -> u16 {
    if state {
        value | (1 << bit)
    } else {
        value & !(1 << bit)
    }
}

/// Expands a word into its 16 bits, LSB first.
pub fn word_to_bits(value: u16) -> [bool; 16] {
    std::array::from_fn(|i| get_bit(value, i as u8))
}

/// Formats a word as `0xHHHH`.
pub fn format_hex(value: u16) -> String {
    format!("0x{:04X}", value)
}

/// Formats a word as `0bhhhh_hhhh_hhhh_hhhh`, most significant nibble first.
pub fn format_binary(value: u16) -> String {
    let bits = format!("{:016b}", value);
    let nibbles: Vec<&str> = (0..4).map(|i| &bits[i * 4..i * 4 + 4]).collect();
    format!("0b{}", nibbles.join("_"))
}

/// Joins a low/high word pair into an unsigned 32-bit value.
#[inline]
pub fn words_to_u32(words: [u16; 2]) -> u32 {
    u32::from(words[0]) | (u32::from(words[1]) << 16)
}

/// Splits an unsigned 32-bit value into a low/high word pair.
#[inline]
pub fn u32_to_words(value: u32) -> [u16; 2] {
    [(value & 0xFFFF) as u16, (value >> 16) as u16]
}

/// Joins a low/high word pair into a signed 32-bit value.
#[inline]
pub fn words_to_i32(words: [u16; 2]) -> i32 {
    words_to_u32(words) as i32
}

/// Splits a signed 32-bit value into a low/high word pair.
#[inline]
pub fn i32_to_words(value: i32) -> [u16; 2] {
    u32_to_words(value as u32)
}

/// Joins a low/high word pair into an IEEE-754 single.
#[inline]
pub fn words_to_f32(words: [u16; 2]) -> f32 {
    f32::from_bits(words_to_u32(words))
}

/// Splits an IEEE-754 single into a low/high word pair.
#[inline]
pub fn f32_to_words(value: f32) -> [u16; 2] {
    u32_to_words(value.to_bits())
}

/// Packs ASCII text two characters per word, first character in the low byte.
///
/// An odd trailing character gets a NUL high byte.
pub fn string_to_words(value: &str) -> Vec<u16> {
    value
        .as_bytes()
        .chunks(2)
        .map(|chunk| {
            let low = u16::from(chunk[0]);
            let high = chunk.get(1).copied().map(u16::from).unwrap_or(0);
            (high << 8) | low
        })
        .collect()
}

/// Unpacks text stored by [`string_to_words`], trimming trailing NULs.
pub fn words_to_string(words: &[u16]) -> String {
    let mut bytes: Vec<u8> = words
        .iter()
        .flat_map(|w| [(w & 0xFF) as u8, (w >> 8) as u8])
        .collect();
    while bytes.last() == Some(&0) {
        bytes.pop();
    }
    String::from_utf8_lossy(&bytes).into_owned()
}
