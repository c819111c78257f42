use dashmap::DashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use super::events::{EventName, GatewayEvent};

pub type Listener = Arc<dyn Fn(&GatewayEvent) + Send + Sync>;

/// Listener registry keyed by event name.
#[derive(Default)]
pub struct Dispatcher {
    listeners: DashMap<EventName, Vec<Listener>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(&self, event: EventName, listener: F)
    where
        F: Fn(&GatewayEvent) + Send + Sync + 'static,
    {
        self.listeners
            .entry(event)
            .or_default()
            .push(Arc::new(listener));
    }

    pub fn listener_count(&self, event: EventName) -> usize {
        self.listeners.get(&event).map(|l| l.len()).unwrap_or(0)
    }

    /// Invoke every listener for the event's name in registration order.
    /// A panicking listener is logged and skipped. Returns how many listeners
    /// completed normally.
    pub fn emit(&self, event: &GatewayEvent) -> usize {
        let name = event.name();
        // Clone out of the map so listeners may register more listeners.
        let listeners: Vec<Listener> = match self.listeners.get(&name) {
            Some(entry) => entry.value().clone(),
            None => return 0,
        };

        let mut delivered = 0;
        for listener in listeners {
            match catch_unwind(AssertUnwindSafe(|| listener(event))) {
                Ok(()) => delivered += 1,
                Err(_) => {
                    tracing::warn!("listener for '{}' panicked", name.as_str());
                }
            }
        }
        delivered
    }
}
