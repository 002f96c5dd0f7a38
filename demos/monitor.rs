//! Example: Monitoring tags and reacting to combined changes
//!
//! Run with: cargo run --example monitor -- 192.168.3.254 5000
//!
//! A two-hand press guard: Y0 is switched on only when both buttons go ON
//! within 400 ms of each other, and off again when either is released.

use melsec_mc::{Client, ClientConfig, Event, Events, Predicate};
use std::time::Duration;

fn main() -> melsec_mc::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,melsec_mc=debug")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let host = args.next().unwrap_or_else(|| "192.168.3.254".to_string());
    let port = args
        .next()
        .and_then(|p| p.parse().ok())
        .unwrap_or(melsec_mc::DEFAULT_PORT);

    let config = ClientConfig::new(host, port).with_poll_interval(Duration::from_millis(20));
    let client = Client::new(config)?;

    // =========================================================================
    // Tags
    // =========================================================================

    client.add_tag("X0", Some("Left Button"))?;
    client.add_tag("X1", Some("Right Button"))?;
    client.add_tag("Y0", Some("Press"))?;
    client.add_tag("D100", None)?;

    for tag in client.tags() {
        println!("registered {}", tag);
    }

    // =========================================================================
    // Subscribers
    // =========================================================================

    client.on_change(|event: &Event| println!("changed: {}", event));

    let press = client.clone();
    client.on_simultaneous(
        Predicate::all(["Left Button", "Right Button"], 1),
        Duration::from_millis(400),
        move |events: &Events| {
            println!("both buttons within window: {} events", events.len());
            if let Err(e) = press.write_bit("Y0", true) {
                eprintln!("cannot start press: {}", e);
            }
        },
    );

    let release = client.clone();
    client.on_change(move |event: &Event| {
        let button = event.refers_to("Left Button") || event.refers_to("Right Button");
        if button && event.value == 0 {
            if let Err(e) = release.tag("Press").and_then(|press| press.off()) {
                eprintln!("cannot stop press: {}", e);
            }
        }
    });

    // =========================================================================
    // Poll
    // =========================================================================

    client.start_polling_default()?;
    println!("monitoring for 60 seconds...");
    std::thread::sleep(Duration::from_secs(60));

    client.stop_polling();
    println!("\nrecent history:");
    for event in &client.history() {
        println!("  {}", event);
    }

    client.close();
    Ok(())
}
