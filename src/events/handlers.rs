//! Event handler declarations of a state type.

use super::DeviceEvent;
use crate::models::DeviceRelation;
use crate::runtime::FlowContext;
use crate::utils::simple_type_name;
use std::any::{Any, TypeId};
use std::sync::Arc;

type ErasedEventFn =
    Arc<dyn Fn(&mut dyn Any, &dyn DeviceEvent, &mut FlowContext<'_>) -> anyhow::Result<()> + Send + Sync>;

/// One declared handler: which sources it listens to and which event type
#[derive(Clone)]
pub(crate) struct EventHandlerEntry {
    pub(crate) name: String,
    pub(crate) sources: Vec<DeviceRelation>,
    /// `None` accepts every event type
    pub(crate) event_type: Option<TypeId>,
    pub(crate) call: ErasedEventFn,
}

/// Builder handed to [`FlowState::register_event_handlers`](crate::flow::FlowState::register_event_handlers)
pub struct EventHandlers<S> {
    entries: Vec<EventHandlerEntry>,
    _owner: std::marker::PhantomData<fn(&mut S)>,
}

impl<S: 'static> Default for EventHandlers<S> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            _owner: std::marker::PhantomData,
        }
    }
}

impl<S: 'static> EventHandlers<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle events of type `E` raised by devices in one of `sources`
    pub fn on<E, F>(&mut self, sources: &[DeviceRelation], handler: F) -> &mut Self
    where
        E: DeviceEvent,
        F: Fn(&mut S, &E, &mut FlowContext<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let call: ErasedEventFn = Arc::new(
            move |owner: &mut dyn Any, event: &dyn DeviceEvent, context: &mut FlowContext<'_>| {
                let (Some(owner), Some(event)) = (
                    owner.downcast_mut::<S>(),
                    event.as_any().downcast_ref::<E>(),
                ) else {
                    return Ok(());
                };
                handler(owner, event, context)
            },
        );
        self.entries.push(EventHandlerEntry {
            name: format!("{}::on_{}", simple_type_name::<S>(), simple_type_name::<E>()),
            sources: sources.to_vec(),
            event_type: Some(TypeId::of::<E>()),
            call,
        });
        self
    }

    /// Handle every event raised by devices in one of `sources`
    pub fn on_any_event<F>(&mut self, sources: &[DeviceRelation], handler: F) -> &mut Self
    where
        F: Fn(&mut S, &dyn DeviceEvent, &mut FlowContext<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let call: ErasedEventFn = Arc::new(
            move |owner: &mut dyn Any, event: &dyn DeviceEvent, context: &mut FlowContext<'_>| {
                let Some(owner) = owner.downcast_mut::<S>() else {
                    return Ok(());
                };
                handler(owner, event, context)
            },
        );
        self.entries.push(EventHandlerEntry {
            name: format!("{}::on_any_event", simple_type_name::<S>()),
            sources: sources.to_vec(),
            event_type: None,
            call,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn into_table(self, owner: &'static str) -> EventHandlerTable {
        EventHandlerTable {
            owner,
            owner_type: TypeId::of::<S>(),
            entries: self.entries,
        }
    }
}

/// Erased event handlers of one owner type
#[derive(Clone)]
pub struct EventHandlerTable {
    pub(crate) owner: &'static str,
    pub(crate) owner_type: TypeId,
    pub(crate) entries: Vec<EventHandlerEntry>,
}

impl EventHandlerTable {
    /// Indices of entries accepting `event_type`, in declaration order
    pub(crate) fn matching(&self, event_type: TypeId) -> Vec<usize> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.event_type.map_or(true, |ty| ty == event_type))
            .map(|(index, _)| index)
            .collect()
    }

    pub fn owner(&self) -> &'static str {
        self.owner
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
