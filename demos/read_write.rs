//! Example: Reading and writing PLC devices
//!
//! Run with: cargo run --example read_write -- 192.168.3.254 5000
//!
//! This example demonstrates:
//! - Reading bit and word devices
//! - Writing outputs and data registers
//! - 32-bit, float and text helpers
//! - Handling device errors

use melsec_mc::utils::{format_binary, format_hex};
use melsec_mc::{Client, ClientConfig, McError};
use std::time::Duration;

fn main() -> melsec_mc::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let host = args.next().unwrap_or_else(|| "192.168.3.254".to_string());
    let port = args
        .next()
        .and_then(|p| p.parse().ok())
        .unwrap_or(melsec_mc::DEFAULT_PORT);

    // =========================================================================
    // Connect to PLC
    // =========================================================================

    let config = ClientConfig::new(host, port).with_timeout(Duration::from_secs(1));
    let client = Client::new(config)?;

    // =========================================================================
    // Reading Bits
    // =========================================================================

    println!("=== Reading Bits ===\n");

    // X and Y are numbered in octal: X10 is the ninth input
    let inputs = client.read("X0", 16)?;
    println!("X0-X17: {:?}", inputs);

    let relay = client.read_bit("M100")?;
    println!("M100 = {}", relay);

    // =========================================================================
    // Reading Words
    // =========================================================================

    println!("\n=== Reading Words ===\n");

    let registers = client.read("D100", 5)?;
    println!("D100-D104: {:?}", registers);

    let value = registers[0];
    println!("D100 = {} ({})", value, format_hex(value));
    println!("Binary: {}", format_binary(value));

    let timer = client.read_value("TN0")?;
    let counter = client.read_value("CN0")?;
    println!("TN0 = {}, CN0 = {}", timer, counter);

    // =========================================================================
    // Writing
    // =========================================================================

    println!("\n=== Writing ===\n");

    client.write("Y0", &[1, 0, 1, 0])?;
    println!("Y0-Y3 <- [1, 0, 1, 0]");

    client.write("D200", &[1234, 5678])?;
    println!("D200-D201 <- [1234, 5678]");

    // =========================================================================
    // Type Conversions
    // =========================================================================

    println!("\n=== Type Conversions ===\n");

    client.write_i32("D300", -100_000)?;
    println!("Counter (i32 from D300-D301): {}", client.read_i32("D300")?);

    client.write_f32("D310", 21.5)?;
    println!("Temperature (f32 from D310-D311): {:.2}", client.read_f32("D310")?);

    client.write_string("D320", "LOT-0042")?;
    println!("Lot code (D320, 4 words): \"{}\"", client.read_string("D320", 4)?);

    // =========================================================================
    // Error Handling
    // =========================================================================

    println!("\n=== Error Handling ===\n");

    match client.read("D99999", 1) {
        Ok(data) => println!("D99999 = {:?}", data),
        Err(McError::DeviceError { code }) => println!("PLC rejected D99999: 0x{}", code),
        Err(e) => println!("Error: {}", e),
    }

    match client.read("Q0", 1) {
        Err(McError::InvalidAddress { address, reason }) => println!("{}: {}", address, reason),
        other => println!("Unexpected: {:?}", other),
    }

    client.close();
    println!("\nRead/write example completed!");
    Ok(())
}
