//! Background polling of registered tags.
//!
//! One poll cycle reads every tag once, in registration order, with a
//! single-point read. Only an actual value change updates the cache and
//! produces an [`Event`], which is dispatched before the next tag is read.
//! A failed read is logged and the cycle moves on to the next tag.
//!
//! The loop thread holds a weak reference to the client state and checks its
//! stop flag at the top of every cycle, so dropping or closing the client ends
//! it without interrupting a cycle midway.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime};

use tracing::{debug, info, warn};

use crate::client::Shared;
use crate::correlator::Dispatcher;
use crate::error::Result;
use crate::event::Event;

/// Default interval between poll cycles.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Handle to a running poll loop.
pub(crate) struct Poller {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

impl Poller {
    /// Starts the loop on a dedicated thread.
    pub(crate) fn spawn(shared: Weak<Shared>, interval: Duration) -> Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let thread = thread::Builder::new()
            .name("melsec-poller".to_string())
            .spawn(move || run(shared, flag, interval))?;
        Ok(Self { stop, thread })
    }

    /// Returns whether the loop thread is still alive.
    pub(crate) fn is_running(&self) -> bool {
        !self.thread.is_finished()
    }

    /// Signals the loop to stop and waits for it.
    ///
    /// When called from the loop thread itself (for example from a change
    /// callback) it only signals; the loop exits after the current cycle.
    pub(crate) fn stop(self) {
        self.stop.store(true, Ordering::SeqCst);
        self.thread.thread().unpark();
        if self.thread.thread().id() == thread::current().id() {
            return;
        }
        if self.thread.join().is_err() {
            warn!("poll thread panicked");
        }
    }
}

fn run(shared: Weak<Shared>, stop: Arc<AtomicBool>, interval: Duration) {
    info!(?interval, "polling started");
    while !stop.load(Ordering::SeqCst) {
        let Some(state) = shared.upgrade() else {
            break;
        };
        if state.connection.is_closed() {
            break;
        }
        poll_cycle(&state);
        drop(state);

        if interval.is_zero() {
            thread::yield_now();
        } else {
            thread::park_timeout(interval);
        }
    }
    info!("polling stopped");
}

/// Runs one cycle over all registered tags and returns the events it produced.
pub(crate) fn poll_cycle(shared: &Shared) -> Vec<Event> {
    let _cycle = shared.cycle.lock().unwrap_or_else(PoisonError::into_inner);
    let targets = shared.tags().targets();
    let mut events = Vec::new();

    for (address, device) in targets {
        let value = match shared.read_device(&device, 1) {
            Ok(values) => match values.first() {
                Some(&value) => value,
                None => continue,
            },
            Err(e) => {
                warn!(%address, error = %e, transient = e.is_transient(), "poll read failed");
                continue;
            }
        };

        let now = SystemTime::now();
        let event = {
            let mut tags = shared.tags_mut();
            let Some(tag) = tags.get_mut_by_address(&address) else {
                continue;
            };
            tag.last_read = Some(now);
            if tag.value == value {
                None
            } else {
                tag.value = value;
                tag.last_update = Some(now);
                Some(Event {
                    address: tag.address.clone(),
                    name: tag.name.clone(),
                    value,
                    timestamp: now,
                })
            }
        };

        if let Some(event) = event {
            debug!(%event, "value changed");
            Dispatcher::dispatch(&shared.dispatcher, event.clone());
            events.push(event);
        }
    }

    events
}
