//! Flow states, global handlers and their erased type descriptors.

use super::handlers::{ActionHandlers, ErasedHandler, HandlerTable};
use crate::error::{FlowError, FlowResult};
use crate::events::{EventHandlerTable, EventHandlers};
use crate::injection::Injectable;
use crate::models::Action;
use crate::runtime::FlowContext;
use crate::utils::{simple_type_name, AsAny};
use std::any::TypeId;
use std::fmt;
use std::sync::Arc;

/// A node of a flow. The current state receives arrival notifications,
/// actions and device events.
///
/// ```rust,ignore
/// #[derive(Default)]
/// struct Tender { basket: Scoped<Basket> }
///
/// impl FlowState for Tender {
///     fn arrive(&mut self, _action: &Action, ctx: &mut FlowContext<'_>) -> anyhow::Result<()> {
///         ctx.show_screen(UiMessage::new("tender"), DataProviders::new());
///         Ok(())
///     }
///
///     fn register_handlers(handlers: &mut ActionHandlers<Self>) {
///         handlers.on("Cash", |state, action, ctx| state.pay_cash(action, ctx));
///     }
/// }
/// ```
pub trait FlowState: Injectable + AsAny {
    /// Called after injection, once the state has become current
    fn arrive(&mut self, action: &Action, ctx: &mut FlowContext<'_>) -> anyhow::Result<()>;

    fn register_handlers(handlers: &mut ActionHandlers<Self>)
    where
        Self: Sized,
    {
        let _ = handlers;
    }

    fn register_event_handlers(handlers: &mut EventHandlers<Self>)
    where
        Self: Sized,
    {
        let _ = handlers;
    }
}

/// Handles actions in every state of a flow, ahead of the current state
pub trait GlobalHandler: Injectable + AsAny {
    fn register_handlers(handlers: &mut ActionHandlers<Self>)
    where
        Self: Sized;
}

type StateFactory = Arc<dyn Fn() -> Box<dyn FlowState> + Send + Sync>;
type GlobalFactory = Arc<dyn Fn() -> Box<dyn GlobalHandler> + Send + Sync>;

/// Erased description of a [`FlowState`] implementation: how to build it
/// and which handlers it declares
#[derive(Clone)]
pub struct StateType {
    name: &'static str,
    type_id: TypeId,
    factory: StateFactory,
    handlers: Arc<HandlerTable>,
    events: Arc<EventHandlerTable>,
}

impl StateType {
    pub fn of<S: FlowState + Default>() -> FlowResult<Self> {
        Self::with_factory(S::default)
    }

    pub fn with_factory<S, F>(factory: F) -> FlowResult<Self>
    where
        S: FlowState,
        F: Fn() -> S + Send + Sync + 'static,
    {
        let name = simple_type_name::<S>();

        let mut handlers = ActionHandlers::<S>::new();
        S::register_handlers(&mut handlers);
        let handlers = handlers.into_table().map_err(|duplicates| FlowError::ConflictingDeclaration {
            owner: name.to_string(),
            reason: format!("action handlers declared more than once: {}", duplicates.join(", ")),
        })?;

        let mut events = EventHandlers::<S>::new();
        S::register_event_handlers(&mut events);

        Ok(Self {
            name,
            type_id: TypeId::of::<S>(),
            factory: Arc::new(move || Box::new(factory()) as Box<dyn FlowState>),
            handlers: Arc::new(handlers),
            events: Arc::new(events.into_table(name)),
        })
    }

    /// Simple type name, also used as the state's sync id
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn create(&self) -> Box<dyn FlowState> {
        (*self.factory)()
    }

    pub fn handles(&self, action: &str) -> bool {
        self.handlers.get(action).is_some()
    }

    pub(crate) fn handler(&self, action: &str) -> Option<&ErasedHandler> {
        self.handlers.get(action)
    }

    pub(crate) fn any_action_handler(&self) -> Option<&ErasedHandler> {
        self.handlers.any_action()
    }

    pub(crate) fn event_handlers(&self) -> &EventHandlerTable {
        &self.events
    }
}

impl fmt::Debug for StateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateType").field("name", &self.name).finish()
    }
}

impl PartialEq for StateType {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

/// Erased description of a [`GlobalHandler`] implementation
#[derive(Clone)]
pub struct GlobalHandlerType {
    name: &'static str,
    factory: GlobalFactory,
    handlers: Arc<HandlerTable>,
}

impl GlobalHandlerType {
    pub fn of<G: GlobalHandler + Default>() -> FlowResult<Self> {
        Self::with_factory(G::default)
    }

    pub fn with_factory<G, F>(factory: F) -> FlowResult<Self>
    where
        G: GlobalHandler,
        F: Fn() -> G + Send + Sync + 'static,
    {
        let name = simple_type_name::<G>();
        let mut handlers = ActionHandlers::<G>::new();
        G::register_handlers(&mut handlers);
        let handlers = handlers.into_table().map_err(|duplicates| FlowError::ConflictingDeclaration {
            owner: name.to_string(),
            reason: format!("action handlers declared more than once: {}", duplicates.join(", ")),
        })?;
        if handlers.any_action().is_some() {
            return Err(FlowError::ConflictingDeclaration {
                owner: name.to_string(),
                reason: "global handlers cannot declare an any-action handler".to_string(),
            });
        }

        Ok(Self {
            name,
            factory: Arc::new(move || Box::new(factory()) as Box<dyn GlobalHandler>),
            handlers: Arc::new(handlers),
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn create(&self) -> Box<dyn GlobalHandler> {
        (*self.factory)()
    }

    pub fn actions(&self) -> Vec<&str> {
        let mut actions: Vec<_> = self.handlers.actions().collect();
        actions.sort_unstable();
        actions
    }

    pub(crate) fn handler(&self, action: &str) -> Option<&ErasedHandler> {
        self.handlers.get(action)
    }
}

impl fmt::Debug for GlobalHandlerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlobalHandlerType")
            .field("name", &self.name)
            .field("actions", &self.actions())
            .finish()
    }
}
