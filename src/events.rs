use std::sync::{Arc, Mutex, Weak};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Events published by the sibling chart/filter panel. Both channels carry
/// the raw string payload from the panel; parsing happens on the map side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelEvent {
    FilterChanged(String),
    SearchChanged(String),
}

struct BusInner {
    next_id: u64,
    subscribers: Vec<(u64, UnboundedSender<PanelEvent>)>,
}

/// Typed publish/subscribe bus decoupling the control panel from the map.
/// Fire-and-forget: publishing never fails and never blocks.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Mutex<BusInner>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(BusInner { next_id: 0, subscribers: Vec::new() })),
        }
    }

    pub fn publish(&self, event: PanelEvent) {
        let mut inner = self.inner.lock().unwrap();
        inner.subscribers.retain(|(_, tx)| tx.send(event.clone()).is_ok());
    }

    /// Registers a subscriber. Dropping the returned handle unsubscribes.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.subscribers.push((id, tx));
        Subscription { id, rx, bus: Arc::downgrade(&self.inner) }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().unwrap().subscribers.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// One subscriber's end of the bus. Held by the map controller from init to
/// teardown.
pub struct Subscription {
    id: u64,
    rx: UnboundedReceiver<PanelEvent>,
    bus: Weak<Mutex<BusInner>>,
}

impl Subscription {
    /// Non-blocking drain of everything published since the last call.
    pub fn drain(&mut self) -> Vec<PanelEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// Awaits the next event; `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<PanelEvent> {
        self.rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.lock().unwrap().subscribers.retain(|(id, _)| *id != self.id);
        }
    }
}
