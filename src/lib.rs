//! # MELSEC 1E Client Library
//!
//! A Rust library for talking to Mitsubishi PLCs over the MELSEC communication
//! protocol using 1E ASCII frames, with tag polling and change correlation on
//! top.
//!
//! ## Features
//!
//! - **Address parsing**: `X10`, `M100`, `D500`, `TN1`... with octal X/Y numbering
//! - **1E ASCII frames**: batch bit/word read and write
//! - **Reconnection**: a failed exchange reconnects once and retries once
//! - **Tags**: named, cached bindings refreshed by a background poll loop
//! - **Change events**: plain callbacks plus time-window correlation of
//!   combinations of changes
//! - **No panics**: all errors returned as `Result<T, McError>`
//!
//! ## Quick Start
//!
//! ```no_run
//! use melsec_mc::Client;
//!
//! fn main() -> melsec_mc::Result<()> {
//!     let client = Client::connect("192.168.3.254", 5000)?;
//!
//!     // Read 4 inputs from X0
//!     let inputs = client.read("X0", 4)?;
//!     println!("X0-X3 = {:?}", inputs);
//!
//!     // Read D100
//!     let value = client.read_value("D100")?;
//!     println!("D100 = {}", value);
//!
//!     // Switch Y0 and Y2 on, Y1 and Y3 off
//!     client.write("Y0", &[1, 0, 1, 0])?;
//!
//!     client.close();
//!     Ok(())
//! }
//! ```
//!
//! ## Device Classes
//!
//! | Prefix | Description | Storage | Numbering |
//! |--------|-------------|:-------:|:---------:|
//! | `X` | Inputs | bit | octal |
//! | `Y` | Outputs | bit | octal |
//! | `M` | Internal relays | bit | decimal |
//! | `S` | State relays | bit | decimal |
//! | `T` | Timer contacts | bit | decimal |
//! | `C` | Counter contacts | bit | decimal |
//! | `D` | Data registers | word | decimal |
//! | `TN` | Timer current values | word | decimal |
//! | `CN` | Counter current values | word | decimal |
//!
//! ## Tags and Events
//!
//! ```no_run
//! use melsec_mc::{Client, Predicate};
//! use std::time::Duration;
//!
//! let client = Client::connect("192.168.3.254", 5000)?;
//! client.add_tag("X0", Some("Left Button"))?;
//! client.add_tag("X1", Some("Right Button"))?;
//! client.add_tag("Y0", Some("Press"))?;
//!
//! client.on_change(|event| println!("changed: {}", event));
//!
//! // Both buttons pressed within 400 ms
//! let press = client.clone();
//! client.on_simultaneous(
//!     Predicate::all(["Left Button", "Right Button"], 1),
//!     Duration::from_millis(400),
//!     move |_events| {
//!         if let Err(e) = press.write_bit("Y0", true) {
//!             eprintln!("cannot start press: {}", e);
//!         }
//!     },
//! );
//!
//! client.start_polling(Duration::from_millis(20))?;
//!
//! // The callback above holds a `Client` handle, so dropping `client` alone
//! // does not end the poll loop.
//! client.close();
//! # Ok::<(), melsec_mc::McError>(())
//! ```
//!
//! The poll loop ends when the client is closed, or when the last `Client`
//! handle is dropped. A subscriber that captures a `Client` clone keeps the
//! client alive, so call [`Client::close`] explicitly in that case.
//!
//! ## Error Handling
//!
//! ```no_run
//! use melsec_mc::{Client, McError};
//!
//! let client = Client::connect("192.168.3.254", 5000)?;
//!
//! match client.read("D100", 10) {
//!     Ok(data) => println!("Data: {:?}", data),
//!     Err(McError::DeviceError { code }) => println!("PLC rejected request: 0x{}", code),
//!     Err(McError::InvalidAddress { address, reason }) => println!("{}: {}", address, reason),
//!     Err(e) if e.is_transient() => println!("Communication problem: {}", e),
//!     Err(e) => println!("Error: {}", e),
//! }
//! # Ok::<(), McError>(())
//! ```
//!
//! ## Logging
//!
//! The crate logs through [`tracing`]: frames at `debug`, connects and
//! closes at `info`, socket errors, reconnects and failed poll reads at
//! `warn`, panicking subscribers at `error`. Install any subscriber to see
//! them.

#![warn(clippy::all)]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

mod client;
mod connection;
mod correlator;
mod device;
mod error;
mod event;
pub mod frame;
mod poller;
mod tag;
pub mod utils;

// Public re-exports
pub use client::{Client, ClientConfig};
pub use connection::{Connection, ConnectionState, DEFAULT_PORT, DEFAULT_TIMEOUT, READ_CHUNK_SIZE};
pub use correlator::{ChangeCallback, EventCorrelator, Firing, WindowCallback};
pub use device::{resolve, DeviceAddress, DeviceClass};
pub use error::{McError, Result};
pub use event::{Event, Events, Match, Predicate};
pub use frame::MAX_POINTS_PER_COMMAND;
pub use poller::DEFAULT_POLL_INTERVAL;
pub use tag::{Tag, TagHandle};
