//! Bus worker and subscriber registry

use super::{Listener, ListenerId};
use chat_core::{ClientEvent, EventCategory};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

type Registry = RwLock<HashMap<EventCategory, Vec<(ListenerId, Arc<dyn Listener>)>>>;

enum BusMessage {
    Event(ClientEvent),
    Flush(oneshot::Sender<()>),
}

/// Ordered, off-thread fan-out of [`ClientEvent`]s
///
/// Cloning the bus is cheap; all clones share the registry and the worker. The
/// worker thread exits once every clone has been dropped.
#[derive(Clone)]
pub struct ListenerBus {
    registry: Arc<Registry>,
    sender: mpsc::UnboundedSender<BusMessage>,
}

impl std::fmt::Debug for ListenerBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count: usize = self.registry.read().values().map(Vec::len).sum();
        f.debug_struct("ListenerBus")
            .field("listener_count", &count)
            .finish()
    }
}

impl ListenerBus {
    /// Start the bus and its worker thread
    pub fn start() -> std::io::Result<Self> {
        let registry: Arc<Registry> = Arc::new(RwLock::new(HashMap::new()));
        let (sender, receiver) = mpsc::unbounded_channel();

        let worker_registry = Arc::clone(&registry);
        std::thread::Builder::new()
            .name("listener-bus".to_string())
            .spawn(move || run_worker(&worker_registry, receiver))?;

        Ok(Self { registry, sender })
    }

    /// Register a listener for one category
    pub fn subscribe(&self, category: EventCategory, listener: Arc<dyn Listener>) -> ListenerId {
        let id = ListenerId::new();
        let name = listener.name().to_string();

        self.registry
            .write()
            .entry(category)
            .or_default()
            .push((id, listener));

        tracing::debug!(listener_id = %id, listener = %name, ?category, "Listener subscribed");
        id
    }

    /// Remove a listener; returns `true` if it was registered for `category`
    pub fn unsubscribe(&self, category: EventCategory, id: ListenerId) -> bool {
        let mut registry = self.registry.write();
        let Some(listeners) = registry.get_mut(&category) else {
            return false;
        };

        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        let removed = listeners.len() != before;

        if removed {
            tracing::debug!(listener_id = %id, ?category, "Listener unsubscribed");
        }
        removed
    }

    /// Number of listeners registered for a category
    pub fn listener_count(&self, category: EventCategory) -> usize {
        self.registry.read().get(&category).map_or(0, Vec::len)
    }

    /// Queue an event for delivery; never blocks
    pub fn post(&self, event: ClientEvent) {
        if self.sender.send(BusMessage::Event(event)).is_err() {
            tracing::warn!("Listener bus worker has stopped, event dropped");
        }
    }

    /// Wait until every event posted before this call has been delivered
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.sender.send(BusMessage::Flush(tx)).is_ok() {
            let _ = rx.await;
        }
    }
}

fn run_worker(registry: &Registry, mut receiver: mpsc::UnboundedReceiver<BusMessage>) {
    tracing::debug!("Listener bus worker started");

    while let Some(message) = receiver.blocking_recv() {
        match message {
            BusMessage::Event(event) => notify(registry, &event),
            BusMessage::Flush(done) => {
                let _ = done.send(());
            }
        }
    }

    tracing::debug!("Listener bus worker stopped");
}

fn notify(registry: &Registry, event: &ClientEvent) {
    // Snapshot so listeners can (un)subscribe from inside a callback
    let listeners: Vec<(ListenerId, Arc<dyn Listener>)> = registry
        .read()
        .get(&event.category())
        .cloned()
        .unwrap_or_default();

    for (id, listener) in listeners {
        tracing::trace!(
            listener = %listener.name(),
            event_type = %event.event_type(),
            "Notifying listener"
        );

        let result = catch_unwind(AssertUnwindSafe(|| listener.on_event(event)));

        if let Err(e) = result {
            tracing::warn!(
                listener_id = %id,
                listener = %listener.name(),
                event_type = %event.event_type(),
                error = ?e,
                "Listener panicked"
            );
        }
    }
}
