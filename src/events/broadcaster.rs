//! Delivers device events to declared handlers.

use super::handlers::EventHandlerTable;
use super::DeviceEvent;
use crate::models::DeviceTopology;
use crate::runtime::FlowContext;
use dashmap::DashMap;
use std::any::{Any, TypeId};
use std::sync::Arc;
use tracing::{debug, error, trace};

/// Object receiving an event together with its handler table
pub struct EventTarget<'a> {
    pub table: &'a EventHandlerTable,
    pub owner: &'a mut dyn Any,
}

/// Routes events to handlers, caching the matching handler list per
/// (owner type, event type) pair. Clones share the cache.
#[derive(Clone, Default)]
pub struct EventBroadcaster {
    cache: Arc<DashMap<(TypeId, TypeId), Arc<Vec<usize>>>>,
}

impl std::fmt::Debug for EventBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBroadcaster")
            .field("cached_pairs", &self.cache.len())
            .finish()
    }
}

impl EventBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `event` to every handler of `target` whose declared sources
    /// include a relation between the event source and `topology`'s device.
    /// Each handler runs at most once; a failing handler is logged and does
    /// not stop the others. Returns whether any handler was invoked.
    pub fn post(
        &self,
        topology: &DeviceTopology,
        target: EventTarget<'_>,
        event: &dyn DeviceEvent,
        context: &mut FlowContext<'_>,
    ) -> bool {
        let relations = topology.classify(event.source());
        if relations.is_empty() {
            trace!(
                device = %topology.device,
                source = %event.source(),
                event = event.event_name(),
                "Event source unrelated to device"
            );
            return false;
        }

        let EventTarget { table, owner } = target;
        let event_type = Any::type_id(event.as_any());
        let candidates = self
            .cache
            .entry((table.owner_type, event_type))
            .or_insert_with(|| Arc::new(table.matching(event_type)))
            .clone();

        let mut delivered = false;
        for index in candidates.iter() {
            let Some(handler) = table.entries.get(*index) else {
                continue;
            };
            if !handler.sources.iter().any(|source| relations.contains(source)) {
                continue;
            }
            delivered = true;
            debug!(handler = %handler.name, event = event.event_name(), "Delivering event");
            if let Err(e) = (handler.call)(&mut *owner, event, context) {
                error!(
                    handler = %handler.name,
                    event = event.event_name(),
                    error = %e,
                    "Event handler failed"
                );
            }
        }

        if !delivered {
            trace!(owner = table.owner, event = event.event_name(), "No matching event handler");
        }
        delivered
    }

    pub fn cached_pairs(&self) -> usize {
        self.cache.len()
    }
}
