//! Manager events and the observer list they are published on

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::mpsc;

/// Something the manager did that observers may care about
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ManagerEvent {
    /// A backend became current with a model loaded
    BackendChanged { backend: String, path: PathBuf },

    /// A load attempt failed and the next candidate is about to be tried
    FallbackTriggered { from: String, to: String, error: String },

    /// Progress through a load
    LoadingProgress { message: String, percent: u8 },
}

/// Receives manager events synchronously
pub trait EventListener: Send + Sync {
    /// Handle event
    fn on_event(&self, event: &ManagerEvent);
}

impl<F> EventListener for F
where
    F: Fn(&ManagerEvent) + Send + Sync,
{
    fn on_event(&self, event: &ManagerEvent) {
        self(event)
    }
}

/// Zero or more listeners, called in subscription order
#[derive(Default)]
pub struct EventBus {
    listeners: Vec<Box<dyn EventListener>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a listener
    pub fn subscribe(&mut self, listener: impl EventListener + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Add a listener that forwards into an unbounded channel
    pub fn channel(&mut self) -> mpsc::UnboundedReceiver<ManagerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribe(move |event: &ManagerEvent| {
            // a dropped receiver just stops listening
            let _ = tx.send(event.clone());
        });
        rx
    }

    /// Deliver an event to every listener
    pub fn emit(&self, event: ManagerEvent) {
        tracing::trace!(?event, listeners = self.listeners.len(), "Emitting manager event");
        for listener in &self.listeners {
            listener.on_event(&event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
