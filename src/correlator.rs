//! Change dispatch and time-window correlation.
//!
//! Two kinds of subscribers receive every [`Event`]:
//!
//! - change callbacks, called with each event in registration order;
//! - windowed listeners, held by the [`EventCorrelator`], called with the
//!   slice of recent history inside their own window when their predicate
//!   is freshly satisfied.
//!
//! A panicking subscriber is logged and skipped; delivery to the others
//! continues.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::{error, trace};

use crate::event::{Event, Events, Predicate};

/// Callback invoked for every change event.
pub type ChangeCallback = Arc<dyn Fn(&Event) + Send + Sync>;

/// Callback invoked with a window of recent events.
pub type WindowCallback = Arc<dyn Fn(&Events) + Send + Sync>;

struct Listener {
    predicate: Option<Predicate>,
    duration: Duration,
    callback: WindowCallback,
}

/// A listener invocation produced by [`EventCorrelator::record_at`].
pub struct Firing {
    callback: WindowCallback,
    events: Events,
}

impl Firing {
    /// Events inside the listener's window, oldest first.
    pub fn events(&self) -> &Events {
        &self.events
    }

    /// Calls the listener, catching and logging a panic.
    pub fn invoke(self) {
        let Firing { callback, events } = self;
        isolate("window listener", || callback(&events));
    }
}

impl std::fmt::Debug for Firing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Firing").field("events", &self.events).finish()
    }
}

/// Time-bounded event history evaluated against windowed listeners.
///
/// History is only kept while at least one listener is registered, and is
/// pruned to the longest listener window on every recorded event.
///
/// # Example
///
/// ```
/// use melsec_mc::{Event, EventCorrelator, Predicate};
/// use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
/// use std::time::{Duration, Instant};
///
/// let fired = Arc::new(AtomicUsize::new(0));
/// let counter = Arc::clone(&fired);
///
/// let mut correlator = EventCorrelator::new();
/// correlator.add_listener(
///     Predicate::all(["A", "B"], 1),
///     Duration::from_millis(400),
///     move |_| { counter.fetch_add(1, Ordering::SeqCst); },
/// );
///
/// let t0 = Instant::now();
/// for firing in correlator.record_at(Event::new("X0", "A", 1), t0) { firing.invoke(); }
/// for firing in correlator.record_at(Event::new("X1", "B", 1), t0 + Duration::from_millis(100)) {
///     firing.invoke();
/// }
/// assert_eq!(fired.load(Ordering::SeqCst), 1);
/// ```
#[derive(Default)]
pub struct EventCorrelator {
    history: VecDeque<(Instant, Event)>,
    listeners: Vec<Listener>,
}

impl EventCorrelator {
    /// Creates an empty correlator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener that fires when `predicate` holds within `duration`.
    ///
    /// The listener fires only when the newly recorded event satisfies one of
    /// the predicate's pairs and all pairs are present in the window.
    pub fn add_listener<F>(&mut self, predicate: Predicate, duration: Duration, callback: F)
    where
        F: Fn(&Events) + Send + Sync + 'static,
    {
        self.listeners.push(Listener {
            predicate: Some(predicate),
            duration,
            callback: Arc::new(callback),
        });
    }

    /// Registers a listener that fires on every event with its window.
    pub fn add_window_listener<F>(&mut self, duration: Duration, callback: F)
    where
        F: Fn(&Events) + Send + Sync + 'static,
    {
        self.listeners.push(Listener {
            predicate: None,
            duration,
            callback: Arc::new(callback),
        });
    }

    /// Returns the number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Longest window across all listeners.
    pub fn max_duration(&self) -> Option<Duration> {
        self.listeners.iter().map(|l| l.duration).max()
    }

    /// Snapshot of the retained history, oldest first.
    pub fn history(&self) -> Events {
        Events::new(self.history.iter().map(|(_, e)| e.clone()).collect())
    }

    /// Records `event` observed now. See [`record_at`](Self::record_at).
    pub fn record(&mut self, event: Event) -> Vec<Firing> {
        self.record_at(event, Instant::now())
    }

    /// Records `event` observed at `now` and returns the listeners to fire.
    ///
    /// The event is appended, history older than the longest window is
    /// dropped, then each listener is evaluated against its own window. The
    /// returned firings are in listener registration order; the caller
    /// invokes them, typically after releasing any lock around the correlator.
    pub fn record_at(&mut self, event: Event, now: Instant) -> Vec<Firing> {
        let Some(max_duration) = self.max_duration() else {
            return Vec::new();
        };

        self.history.push_back((now, event));
        while let Some((at, _)) = self.history.front() {
            if now.saturating_duration_since(*at) <= max_duration {
                break;
            }
            self.history.pop_front();
        }

        let Some((_, trigger)) = self.history.back() else {
            return Vec::new();
        };

        let mut firings = Vec::new();
        for listener in &self.listeners {
            let window = self
                .history
                .iter()
                .filter(|(at, _)| now.saturating_duration_since(*at) <= listener.duration)
                .map(|(_, e)| e);

            let fire = match &listener.predicate {
                Some(predicate) => {
                    predicate.is_triggered_by(trigger) && predicate.is_satisfied_by(window.clone())
                }
                None => true,
            };

            if fire {
                firings.push(Firing {
                    callback: Arc::clone(&listener.callback),
                    events: Events::new(window.cloned().collect()),
                });
            }
        }

        trace!(
            retained = self.history.len(),
            firing = firings.len(),
            "event correlated"
        );
        firings
    }
}

impl std::fmt::Debug for EventCorrelator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventCorrelator")
            .field("history", &self.history.len())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

/// Subscriber registry shared by the client and its poll loop.
#[derive(Default)]
pub(crate) struct Dispatcher {
    observers: Vec<ChangeCallback>,
    correlator: EventCorrelator,
}

impl Dispatcher {
    pub(crate) fn add_observer(&mut self, callback: ChangeCallback) {
        self.observers.push(callback);
    }

    pub(crate) fn correlator_mut(&mut self) -> &mut EventCorrelator {
        &mut self.correlator
    }

    pub(crate) fn correlator(&self) -> &EventCorrelator {
        &self.correlator
    }

    /// Delivers `event` to every subscriber.
    ///
    /// The lock is released before any callback runs so callbacks may
    /// register further subscribers or use the client.
    pub(crate) fn dispatch(dispatcher: &Mutex<Dispatcher>, event: Event) {
        let (observers, firings) = {
            let mut guard = dispatcher.lock().unwrap_or_else(PoisonError::into_inner);
            let observers = guard.observers.clone();
            let firings = guard.correlator.record(event.clone());
            (observers, firings)
        };

        for observer in observers {
            isolate("change callback", || observer(&event));
        }
        for firing in firings {
            firing.invoke();
        }
    }
}

fn isolate<F: FnOnce()>(kind: &str, f: F) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(f)) {
        let message = payload
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
            .unwrap_or("non-string panic payload");
        error!(kind, message, "subscriber panicked");
    }
}
