//! Push-only event bus: events flow from the engine to the host and never
//! block engine progress.
//!
//! Grounded on `freddiehaddad-oxidized/crates/core-events`'s `Event` enum
//! and observer-hook shape (`EventHooks::pre_handle`/`post_handle`), but
//! delivered synchronously in-process instead of over a tokio `mpsc`
//! channel — the engine has no async steady state to hand events to, so a
//! plain `Vec<Box<dyn Fn>>` dispatched inline from the call site that
//! raised the event is the whole bus.

use crate::error::Error;
use crate::graph::LoadCounts;

#[derive(Debug, Clone)]
pub enum Event {
    /// Emitted once per successful `tick()`.
    SimulationTick { alpha: f32 },
    /// Emitted when α drops below `alpha_min` and the driver stops itself.
    SimulationEnd,
    /// Emitted when a divergence check finds NaN positions; the driver has
    /// already halted and stopped mutating positions.
    SimulationDiverged,
    GraphLoaded(LoadCounts),
    ViewportChanged,
    /// Mirrors a fallible call's `Error` for hosts that prefer to observe
    /// errors through the bus rather than (or in addition to) the `Result`
    /// returned at the call site.
    Error(String),
}

impl From<&Error> for Event {
    fn from(e: &Error) -> Self {
        Event::Error(e.to_string())
    }
}

/// Synchronous, push-only dispatcher. `on` appends a handler; there is no
/// `off` by identity because closures aren't comparable — callers that need
/// to unsubscribe should gate their closure on a shared flag instead.
#[derive(Default)]
pub struct EventBus {
    handlers: Vec<Box<dyn FnMut(&Event) + Send>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&mut self, handler: impl FnMut(&Event) + Send + 'static) {
        self.handlers.push(Box::new(handler));
    }

    pub fn clear(&mut self) {
        self.handlers.clear();
    }

    /// Deliver `event` to every registered handler, in registration order.
    pub fn emit(&mut self, event: Event) {
        for handler in &mut self.handlers {
            handler(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn handlers_receive_events_in_order() {
        let mut bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_clone = log.clone();
        bus.on(move |e| log_clone.lock().unwrap().push(format!("{e:?}")));

        bus.emit(Event::SimulationTick { alpha: 1.0 });
        bus.emit(Event::SimulationEnd);

        let recorded = log.lock().unwrap();
        assert_eq!(recorded.len(), 2);
        assert!(recorded[0].contains("SimulationTick"));
        assert!(recorded[1].contains("SimulationEnd"));
    }

    #[test]
    fn clear_removes_all_handlers() {
        let mut bus = EventBus::new();
        let count = Arc::new(Mutex::new(0));
        let count_clone = count.clone();
        bus.on(move |_| *count_clone.lock().unwrap() += 1);
        bus.clear();
        bus.emit(Event::ViewportChanged);
        assert_eq!(*count.lock().unwrap(), 0);
    }
}
