//! The bus itself: listener registry, broadcast channel, and the
//! process-wide instance behind the [`emit!`](crate::emit) macro.

use std::collections::{HashMap, VecDeque};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, trace};
use uuid::Uuid;

use super::events::{AppEvent, EventCategory};

/// Handle returned by [`EventBus::subscribe`], used to detach the
/// listener again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let hex = self.0.as_simple().to_string();
        write!(f, "sub-{}", &hex[..8])
    }
}

/// Which events a listener wants to see.
#[derive(Debug, Clone, Default)]
pub enum EventFilter {
    /// Everything on the bus.
    #[default]
    All,
    /// Only events whose category appears in the list.
    Categories(Vec<EventCategory>),
}

impl EventFilter {
    pub fn accepts(&self, event: &AppEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::Categories(wanted) => wanted.contains(&event.category()),
        }
    }
}

/// A synchronous listener and the filter guarding it.
struct Listener {
    filter: EventFilter,
    notify: Box<dyn Fn(&AppEvent) + Send + Sync>,
}

/// How many recent events to keep, and for how long.
#[derive(Debug, Clone)]
pub struct HistoryPolicy {
    pub limit: usize,
    pub max_age: Duration,
}

impl Default for HistoryPolicy {
    fn default() -> Self {
        Self {
            limit: 500,
            max_age: Duration::from_secs(300),
        }
    }
}

/// Tuning knobs for a bus instance.
#[derive(Debug, Clone)]
pub struct BusOptions {
    /// Broadcast channel capacity; a lagging receiver loses the oldest
    /// events past this.
    pub capacity: usize,
    /// When set, recent events stay queryable through
    /// [`EventBus::recent`].
    pub history: Option<HistoryPolicy>,
}

impl Default for BusOptions {
    fn default() -> Self {
        Self {
            capacity: 256,
            history: None,
        }
    }
}

/// Fans application events out to synchronous listeners and async
/// broadcast receivers.
///
/// Publishing never blocks on a slow consumer: listeners run inline on
/// the publishing thread and are expected to return quickly, while
/// broadcast receivers that fall behind simply lose the oldest events.
pub struct EventBus {
    channel: broadcast::Sender<AppEvent>,
    listeners: RwLock<HashMap<SubscriptionId, Listener>>,
    recent: RwLock<VecDeque<(Instant, AppEvent)>>,
    options: BusOptions,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_options(BusOptions::default())
    }

    pub fn with_options(options: BusOptions) -> Self {
        let (channel, _) = broadcast::channel(options.capacity);
        Self {
            channel,
            listeners: RwLock::new(HashMap::new()),
            recent: RwLock::new(VecDeque::new()),
            options,
        }
    }

    /// Hand an event to every interested listener and receiver.
    ///
    /// Returns the number of broadcast receivers that will see the
    /// event. Zero is normal for a headless run.
    pub fn publish(&self, event: AppEvent) -> usize {
        trace!(category = %event.category(), %event, "published");
        if let Some(policy) = &self.options.history {
            self.remember(policy, &event);
        }

        let listeners = self.listeners.read();
        for listener in listeners.values() {
            if listener.filter.accepts(&event) {
                (listener.notify)(&event);
            }
        }
        drop(listeners);

        self.channel.send(event).unwrap_or(0)
    }

    /// Attach a synchronous listener.
    ///
    /// The closure runs on whichever thread publishes, so it must not
    /// block or call back into the bus.
    pub fn subscribe<F>(&self, filter: EventFilter, notify: F) -> SubscriptionId
    where
        F: Fn(&AppEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(Uuid::new_v4());
        self.listeners.write().insert(
            id,
            Listener {
                filter,
                notify: Box::new(notify),
            },
        );
        debug!(%id, "listener attached");
        id
    }

    /// Detach a listener; false when the handle was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let detached = self.listeners.write().remove(&id).is_some();
        if detached {
            debug!(%id, "listener detached");
        }
        detached
    }

    /// A broadcast receiver for consuming events from an async task.
    pub fn receiver(&self) -> broadcast::Receiver<AppEvent> {
        self.channel.subscribe()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Events kept under the history policy, oldest first.
    ///
    /// Without a policy, or with `since` past the newest entry, the
    /// result is empty.
    pub fn recent(&self, since: Option<Instant>) -> Vec<AppEvent> {
        let recent = self.recent.read();
        recent
            .iter()
            .filter(|(at, _)| since.is_none_or(|cutoff| *at >= cutoff))
            .map(|(_, event)| event.clone())
            .collect()
    }

    pub fn clear_recent(&self) {
        self.recent.write().clear();
    }

    pub fn options(&self) -> &BusOptions {
        &self.options
    }

    fn remember(&self, policy: &HistoryPolicy, event: &AppEvent) {
        let now = Instant::now();
        let mut recent = self.recent.write();
        recent.push_back((now, event.clone()));
        while recent.len() > policy.limit {
            recent.pop_front();
        }
        while recent
            .front()
            .is_some_and(|(at, _)| now.duration_since(*at) > policy.max_age)
        {
            recent.pop_front();
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listener_count())
            .field("options", &self.options)
            .finish()
    }
}

static BUS: OnceLock<EventBus> = OnceLock::new();

/// The process-wide bus every [`emit!`](crate::emit) lands on.
pub fn event_bus() -> &'static EventBus {
    BUS.get_or_init(EventBus::new)
}

/// Install the process-wide bus with non-default options.
///
/// Has to run before anything publishes; once the bus exists the
/// rejected options come back as the error.
pub fn init_event_bus(options: BusOptions) -> Result<(), BusOptions> {
    BUS.set(EventBus::with_options(options))
        .map_err(|bus| bus.options.clone())
}

/// Publish an event on the process-wide bus.
#[macro_export]
macro_rules! emit {
    ($event:expr) => {
        $crate::event_bus::event_bus().publish($event)
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_bus::events::{DocumentEvent, NavigationEvent};
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn opened() -> AppEvent {
        AppEvent::Document(DocumentEvent::Opened {
            path: PathBuf::from("pyramid.mpd"),
            submodels: 2,
        })
    }

    fn page_shown(page: usize) -> AppEvent {
        AppEvent::Navigation(NavigationEvent::PageDisplayed { page, of: 10 })
    }

    #[test]
    fn test_listener_attach_and_detach() {
        let bus = EventBus::new();
        assert_eq!(bus.listener_count(), 0);

        let id = bus.subscribe(EventFilter::All, |_| {});
        assert_eq!(bus.listener_count(), 1);

        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        assert_eq!(bus.listener_count(), 0);
    }

    #[test]
    fn test_listener_sees_published_events() {
        let bus = EventBus::new();
        let seen = Arc::new(AtomicUsize::new(0));

        let counter = seen.clone();
        bus.subscribe(EventFilter::All, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(opened());
        bus.publish(page_shown(3));
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_category_filter_splits_traffic() {
        let bus = EventBus::new();
        let documents = Arc::new(AtomicUsize::new(0));
        let navigations = Arc::new(AtomicUsize::new(0));

        let counter = documents.clone();
        bus.subscribe(
            EventFilter::Categories(vec![EventCategory::Document]),
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        );
        let counter = navigations.clone();
        bus.subscribe(
            EventFilter::Categories(vec![EventCategory::Navigation]),
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        );

        bus.publish(opened());
        bus.publish(page_shown(1));

        assert_eq!(documents.load(Ordering::SeqCst), 1);
        assert_eq!(navigations.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_filter_accepts() {
        let event = opened();
        assert!(EventFilter::All.accepts(&event));
        assert!(EventFilter::Categories(vec![EventCategory::Document]).accepts(&event));
        assert!(!EventFilter::Categories(vec![EventCategory::Render]).accepts(&event));
        assert!(
            EventFilter::Categories(vec![EventCategory::Render, EventCategory::Document])
                .accepts(&event)
        );
    }

    #[test]
    fn test_history_disabled_by_default() {
        let bus = EventBus::new();
        bus.publish(opened());
        assert!(bus.recent(None).is_empty());
    }

    #[test]
    fn test_history_keeps_at_most_limit_events() {
        let bus = EventBus::with_options(BusOptions {
            history: Some(HistoryPolicy {
                limit: 5,
                ..Default::default()
            }),
            ..Default::default()
        });

        for page in 1..=9 {
            bus.publish(page_shown(page));
        }
        let recent = bus.recent(None);
        assert_eq!(recent.len(), 5);
        assert!(matches!(
            recent[0],
            AppEvent::Navigation(NavigationEvent::PageDisplayed { page: 5, .. })
        ));

        bus.clear_recent();
        assert!(bus.recent(None).is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_receiver_gets_events() {
        let bus = EventBus::new();
        let mut receiver = bus.receiver();

        let delivered = bus.publish(opened());
        assert_eq!(delivered, 1);

        match receiver.try_recv() {
            Ok(AppEvent::Document(DocumentEvent::Opened { submodels, .. })) => {
                assert_eq!(submodels, 2);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
