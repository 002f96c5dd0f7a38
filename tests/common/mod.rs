//! In-process 1E ASCII controller used by the integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::thread;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Initialize test logging once per test binary.
pub fn init_test_logging() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new("warn,melsec_mc=debug")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// How the simulated controller answers requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Behavior {
    /// Serve reads and writes from memory.
    Normal,
    /// Reply with the given status code and no payload.
    Status(String),
    /// Read the request, then close the connection without replying.
    DropConnection,
    /// Like `DropConnection` for the next `n` requests, then `Normal`.
    DropNext(usize),
}

#[derive(Debug, Default)]
struct Memory {
    cells: HashMap<(String, u32), u16>,
}

/// A simulated controller listening on a loopback port.
#[derive(Clone)]
pub struct FakePlc {
    port: u16,
    memory: Arc<Mutex<Memory>>,
    behavior: Arc<Mutex<Behavior>>,
    accepts: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<String>>>,
    rejects: Arc<Mutex<HashMap<String, String>>>,
}

impl FakePlc {
    pub fn start() -> Self {
        init_test_logging();

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let plc = FakePlc {
            port: listener.local_addr().unwrap().port(),
            memory: Arc::new(Mutex::new(Memory::default())),
            behavior: Arc::new(Mutex::new(Behavior::Normal)),
            accepts: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
            rejects: Arc::new(Mutex::new(HashMap::new())),
        };

        let server = plc.clone();
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                server.accepts.fetch_add(1, Ordering::SeqCst);
                let session = server.clone();
                thread::spawn(move || session.serve(stream));
            }
        });

        plc
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn accepts(&self) -> usize {
        self.accepts.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn set_behavior(&self, behavior: Behavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    /// Answers every request for device `code` with `status`.
    pub fn reject(&self, code: &str, status: &str) {
        self.rejects
            .lock()
            .unwrap()
            .insert(code.to_string(), status.to_string());
    }

    /// Sets a device value directly, e.g. `plc.set("5820", 0, 1)` for X0.
    pub fn set(&self, code: &str, offset: u32, value: u16) {
        self.memory
            .lock()
            .unwrap()
            .cells
            .insert((code.to_string(), offset), value);
    }

    pub fn get(&self, code: &str, offset: u32) -> u16 {
        self.memory
            .lock()
            .unwrap()
            .cells
            .get(&(code.to_string(), offset))
            .copied()
            .unwrap_or(0)
    }

    fn serve(&self, mut stream: TcpStream) {
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let mut pending = String::new();
        let mut buf = [0u8; 4096];

        loop {
            let n = match stream.read(&mut buf) {
                Ok(0) | Err(_) => return,
                Ok(n) => n,
            };
            pending.push_str(&String::from_utf8_lossy(&buf[..n]));

            while let Some(len) = request_len(&pending) {
                let request: String = pending.drain(..len).collect();
                self.requests.lock().unwrap().push(request.clone());

                let behavior = {
                    let mut current = self.behavior.lock().unwrap();
                    let behavior = current.clone();
                    if let Behavior::DropNext(n) = behavior {
                        *current = if n > 1 {
                            Behavior::DropNext(n - 1)
                        } else {
                            Behavior::Normal
                        };
                    }
                    behavior
                };
                let rejected = self.rejects.lock().unwrap().get(&request[8..12]).cloned();
                let reply = match (behavior, rejected) {
                    (Behavior::DropConnection, _) | (Behavior::DropNext(_), _) => return,
                    (Behavior::Status(code), _) | (Behavior::Normal, Some(code)) => {
                        format!("{}{}", subheader(&request), code)
                    }
                    (Behavior::Normal, None) => self.handle(&request),
                };
                if stream.write_all(reply.as_bytes()).is_err() {
                    return;
                }
            }
        }
    }

    fn handle(&self, request: &str) -> String {
        let command = u8::from_str_radix(&request[0..2], 16).unwrap();
        let code = &request[8..12];
        let head = u32::from_str_radix(&request[12..20], 16).unwrap();
        let points = points(request);
        let data = &request[24..];

        let mut memory = self.memory.lock().unwrap();
        let mut payload = String::new();
        match command {
            0x00 => {
                for i in 0..points {
                    let v = memory.cells.get(&(code.to_string(), head + i as u32)).copied();
                    payload.push(if v.unwrap_or(0) != 0 { '1' } else { '0' });
                }
                if points % 2 == 1 {
                    payload.push('0');
                }
            }
            0x01 => {
                for i in 0..points {
                    let v = memory.cells.get(&(code.to_string(), head + i as u32)).copied();
                    payload.push_str(&format!("{:04X}", v.unwrap_or(0)));
                }
            }
            0x02 => {
                for (i, c) in data.chars().take(points).enumerate() {
                    memory
                        .cells
                        .insert((code.to_string(), head + i as u32), u16::from(c == '1'));
                }
            }
            0x03 => {
                for i in 0..points {
                    let v = u16::from_str_radix(&data[i * 4..i * 4 + 4], 16).unwrap();
                    memory.cells.insert((code.to_string(), head + i as u32), v);
                }
            }
            other => panic!("unexpected command {:02X}", other),
        }

        format!("{}00{}", subheader(request), payload)
    }
}

fn subheader(request: &str) -> String {
    let command = u8::from_str_radix(&request[0..2], 16).unwrap();
    format!("{:02X}", command | 0x80)
}

fn points(request: &str) -> usize {
    let low = usize::from_str_radix(&request[20..22], 16).unwrap();
    let high = usize::from_str_radix(&request[22..24], 16).unwrap();
    low | (high << 8)
}

/// Length of the first complete request in `pending`, if any.
fn request_len(pending: &str) -> Option<usize> {
    if pending.len() < 24 {
        return None;
    }
    let command = u8::from_str_radix(&pending[0..2], 16).ok()?;
    let points = points(pending);
    let len = match command {
        0x02 => 24 + points + points % 2,
        0x03 => 24 + points * 4,
        _ => 24,
    };
    (pending.len() >= len).then_some(len)
}
