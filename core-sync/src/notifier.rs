use std::sync::Arc;

use core_runtime::events::{CoreEvent, EventBus, IndexEvent};
use tracing::trace;

use crate::job::SyncDomain;

/// Tells readers that cached rows under a parent changed.
pub trait ChangeNotifier: Send + Sync {
    fn notify_changed(&self, domain: SyncDomain, parent_key: &str);
}

/// Publishes [`IndexEvent::Changed`] on the engine's event bus.
pub struct EventBusNotifier {
    event_bus: Arc<EventBus>,
}

impl EventBusNotifier {
    pub fn new(event_bus: Arc<EventBus>) -> Self {
        Self { event_bus }
    }
}

impl ChangeNotifier for EventBusNotifier {
    fn notify_changed(&self, domain: SyncDomain, parent_key: &str) {
        trace!(%domain, parent_key, "Notifying cache change");
        // No subscribers is not an error.
        self.event_bus
            .emit(CoreEvent::Index(IndexEvent::Changed {
                domain: domain.as_str().to_string(),
                parent_key: parent_key.to_string(),
            }))
            .ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_event_bus_notifier_publishes_change() {
        let bus = Arc::new(EventBus::new(8));
        let mut rx = bus.subscribe();
        let notifier = EventBusNotifier::new(bus);

        notifier.notify_changed(SyncDomain::SearchResults, "12");

        let event = rx.recv().await.unwrap();
        assert_eq!(
            event,
            CoreEvent::Index(IndexEvent::Changed {
                domain: "search_results".to_string(),
                parent_key: "12".to_string(),
            })
        );
    }
}
