mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use common::FakePlc;
use melsec_mc::{Client, ClientConfig, Event, McError};

fn client(plc: &FakePlc) -> Client {
    Client::new(
        ClientConfig::new("127.0.0.1", plc.port()).with_timeout(Duration::from_millis(500)),
    )
    .unwrap()
}

#[test]
fn change_produces_exactly_one_event() {
    let plc = FakePlc::start();
    let client = client(&plc);
    client.add_tag("X0", Some("Start")).unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    client.on_change(move |event: &Event| sink.lock().unwrap().push(event.clone()));

    // Reading the initial 0 is not a change.
    assert!(client.poll_once().is_empty());

    plc.set("5820", 0, 1);
    let events = client.poll_once();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].address, "X0");
    assert_eq!(events[0].name, "Start");
    assert_eq!(events[0].value, 1);

    for _ in 0..5 {
        assert!(client.poll_once().is_empty());
    }

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].value, 1);
}

#[test]
fn cache_tracks_reads_and_changes() {
    let plc = FakePlc::start();
    let client = client(&plc);
    client.add_tag("D100", Some("Speed")).unwrap();

    client.poll_once();
    let tag = client.get_tag("Speed").unwrap();
    assert_eq!(tag.value, 0);
    assert!(tag.last_read.is_some());
    assert!(tag.last_update.is_none());

    plc.set("4420", 100, 1500);
    client.poll_once();
    let tag = client.get_tag("D100").unwrap();
    assert_eq!(tag.value, 1500);
    assert!(tag.last_update.is_some());
}

#[test]
fn failing_tag_does_not_stop_the_cycle() {
    let plc = FakePlc::start();
    let client = client(&plc);
    client.add_tag("M0", Some("Broken")).unwrap();
    client.add_tag("X0", Some("Start")).unwrap();

    plc.reject("4D20", "56");
    plc.set("4D20", 0, 1);
    plc.set("5820", 0, 1);

    let events = client.poll_once();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].name, "Start");
    assert_eq!(client.get_tag("Broken").unwrap().value, 0);
    assert!(client.get_tag("Broken").unwrap().last_read.is_none());
}

#[test]
fn subscribers_run_in_order_and_panics_are_contained() {
    let plc = FakePlc::start();
    let client = client(&plc);
    client.add_tag("X0", None).unwrap();

    let order = Arc::new(Mutex::new(Vec::new()));
    let first = Arc::clone(&order);
    client.on_change(move |_: &Event| first.lock().unwrap().push(1));
    client.on_change(|_: &Event| panic!("subscriber failure"));
    let third = Arc::clone(&order);
    client.on_change(move |_: &Event| third.lock().unwrap().push(3));

    plc.set("5820", 0, 1);
    assert_eq!(client.poll_once().len(), 1);
    assert_eq!(*order.lock().unwrap(), vec![1, 3]);

    plc.set("5820", 0, 0);
    assert_eq!(client.poll_once().len(), 1);
    assert_eq!(*order.lock().unwrap(), vec![1, 3, 1, 3]);
}

#[test]
fn callbacks_may_use_the_client() {
    let plc = FakePlc::start();
    let client = client(&plc);
    client.add_tag("X0", Some("Sensor")).unwrap();

    let writer = client.clone();
    client.on_change(move |event: &Event| {
        writer.write_value("Y0", event.value).unwrap();
    });

    plc.set("5820", 0, 1);
    client.poll_once();
    assert_eq!(plc.get("5920", 0), 1);
}

#[test]
fn background_loop_reports_changes() {
    let plc = FakePlc::start();
    let client = client(&plc);
    client.add_tag("X1", Some("Door")).unwrap();

    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    client.on_change(move |event: &Event| {
        let _ = tx.lock().unwrap().send(event.clone());
    });

    client.start_polling(Duration::from_millis(10)).unwrap();
    assert!(client.is_polling());

    plc.set("5820", 1, 1);
    let event = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(event.name, "Door");
    assert_eq!(event.value, 1);

    client.close();
    assert!(!client.is_polling());
}

#[test]
fn second_start_is_rejected() {
    let plc = FakePlc::start();
    let client = client(&plc);

    client.start_polling(Duration::from_millis(20)).unwrap();
    assert!(matches!(
        client.start_polling(Duration::from_millis(20)),
        Err(McError::AlreadyPolling)
    ));

    client.stop_polling();
    assert!(!client.is_polling());
    client.start_polling_default().unwrap();
    client.stop_polling();
}

#[test]
fn zero_interval_runs_back_to_back() {
    let plc = FakePlc::start();
    let client = client(&plc);
    client.add_tag("D0", None).unwrap();

    let cycles = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&cycles);
    client.on_change(move |_: &Event| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    client.start_polling(Duration::ZERO).unwrap();
    std::thread::sleep(Duration::from_millis(50));
    plc.set("4420", 0, 9);
    std::thread::sleep(Duration::from_millis(200));
    client.stop_polling();

    assert_eq!(cycles.load(Ordering::SeqCst), 1);
    assert!(plc.requests().len() > 2);
    assert_eq!(client.get_tag("D0").unwrap().value, 9);
}

#[test]
fn tag_handle_writes_through() {
    let plc = FakePlc::start();
    let client = client(&plc);
    client.add_tag("Y0", Some("Lamp")).unwrap();

    let lamp = client.tag("Lamp").unwrap();
    lamp.on().unwrap();
    assert_eq!(plc.get("5920", 0), 1);
    // The cache only moves on the next poll.
    assert_eq!(lamp.value(), 0);

    client.poll_once();
    assert_eq!(lamp.value(), 1);

    lamp.toggle().unwrap();
    assert_eq!(plc.get("5920", 0), 0);

    lamp.set(1).unwrap();
    lamp.off().unwrap();
    assert_eq!(plc.get("5920", 0), 0);
}

#[test]
fn close_while_callback_queries_polling_state() {
    let plc = FakePlc::start();
    let client = client(&plc);
    client.add_tag("X0", Some("Start")).unwrap();

    let (entered_tx, entered_rx) = mpsc::channel();
    let entered_tx = Mutex::new(entered_tx);
    let inner = client.clone();
    client.on_change(move |_: &Event| {
        let _ = entered_tx.lock().unwrap().send(());
        std::thread::sleep(Duration::from_millis(200));
        let _ = inner.is_polling();
    });

    client.start_polling(Duration::from_millis(10)).unwrap();
    plc.set("5820", 0, 1);
    entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();

    let (done_tx, done_rx) = mpsc::channel();
    let closer = client.clone();
    std::thread::spawn(move || {
        closer.close();
        let _ = done_tx.send(());
    });

    assert!(
        done_rx.recv_timeout(Duration::from_secs(3)).is_ok(),
        "close() did not return"
    );
    assert!(!client.is_polling());
}

#[test]
fn dropping_last_handle_ends_the_loop() {
    let plc = FakePlc::start();
    let client = client(&plc);
    client.add_tag("D0", None).unwrap();
    client.on_change(|_: &Event| {});

    client.start_polling(Duration::from_millis(5)).unwrap();
    std::thread::sleep(Duration::from_millis(50));
    drop(client);
    std::thread::sleep(Duration::from_millis(20));

    let settled = plc.requests().len();
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(plc.requests().len(), settled);
}
