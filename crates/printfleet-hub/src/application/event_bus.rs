//! In-process publish/subscribe for [`FleetEvent`]s.
//!
//! Two independent channels exist:
//!
//! - the **main** channel, which carries every event to every subscriber whose
//!   [`EventFilter`] matches, and
//! - the **UI** channel, which only carries what the hub decides the desktop
//!   UI should render (the active session's polling data).
//!
//! Each subscriber owns an unbounded queue, so `publish` never blocks and can
//! be called from synchronous code while no lock is held across an `.await`.
//! The subscriber list is copied before delivery; subscribers whose receiver
//! was dropped are pruned after the send fails.

use std::sync::Mutex;

use printfleet_core::{EventFamily, FleetEvent};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

/// Identifies one subscription for [`EventBus::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Selects which events a subscriber receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventFilter {
    All,
    Families(Vec<EventFamily>),
}

impl EventFilter {
    pub fn only(family: EventFamily) -> Self {
        EventFilter::Families(vec![family])
    }

    pub fn matches(&self, event: &FleetEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::Families(families) => families.contains(&event.family()),
        }
    }
}

/// Receiving end of a subscription.
pub struct Subscription {
    pub id: SubscriptionId,
    rx: mpsc::UnboundedReceiver<FleetEvent>,
}

impl Subscription {
    /// Waits for the next event. Returns `None` once unsubscribed.
    pub async fn recv(&mut self) -> Option<FleetEvent> {
        self.rx.recv().await
    }

    /// Returns the next queued event without waiting.
    pub fn try_recv(&mut self) -> Option<FleetEvent> {
        self.rx.try_recv().ok()
    }

    /// Drains everything currently queued.
    pub fn drain(&mut self) -> Vec<FleetEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

#[derive(Clone)]
struct Subscriber {
    id: SubscriptionId,
    tx: mpsc::UnboundedSender<FleetEvent>,
    filter: EventFilter,
}

#[derive(Default)]
pub struct EventBus {
    main: Mutex<Vec<Subscriber>>,
    ui: Mutex<Vec<Subscriber>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, filter: EventFilter) -> Subscription {
        Self::add(&self.main, filter)
    }

    /// Subscribes to the UI channel.
    pub fn subscribe_ui(&self) -> Subscription {
        Self::add(&self.ui, EventFilter::All)
    }

    /// Removes a subscription from either channel. Returns `false` if it was
    /// already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        Self::remove(&self.main, id) || Self::remove(&self.ui, id)
    }

    pub fn publish(&self, event: FleetEvent) {
        Self::deliver(&self.main, event);
    }

    pub fn publish_ui(&self, event: FleetEvent) {
        Self::deliver(&self.ui, event);
    }

    /// Number of live subscribers on the main channel.
    pub fn subscriber_count(&self) -> usize {
        self.main.lock().expect("lock poisoned").len()
    }

    fn add(list: &Mutex<Vec<Subscriber>>, filter: EventFilter) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = SubscriptionId(Uuid::new_v4());
        list.lock()
            .expect("lock poisoned")
            .push(Subscriber { id, tx, filter });
        Subscription { id, rx }
    }

    fn remove(list: &Mutex<Vec<Subscriber>>, id: SubscriptionId) -> bool {
        let mut subscribers = list.lock().expect("lock poisoned");
        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);
        subscribers.len() != before
    }

    fn deliver(list: &Mutex<Vec<Subscriber>>, event: FleetEvent) {
        let snapshot: Vec<Subscriber> = list.lock().expect("lock poisoned").clone();

        let closed: Vec<SubscriptionId> = snapshot
            .iter()
            .filter(|s| s.filter.matches(&event))
            .filter(|s| s.tx.send(event.clone()).is_err())
            .map(|s| s.id)
            .collect();

        if !closed.is_empty() {
            debug!(count = closed.len(), "pruning closed event subscribers");
            list.lock()
                .expect("lock poisoned")
                .retain(|s| !closed.contains(&s.id));
        }
    }
}
