//! Borrowed view of an actor's services for one unit of work.

use super::flow_context::{FlowContext, ScreenChannel};
use super::state_manager::{ActorShared, StateManager};
use crate::error::FlowResult;
use crate::injection::{Injectable, InjectionContext, Injector};
use crate::models::{Action, HandlerId};
use crate::scope::{ConfigScope, FlowScope, ScopeLayer, ScopeStore};

/// Everything needed to inject objects and build a [`FlowContext`] for
/// the current state context
pub struct ActorEnv<'a> {
    pub(crate) manager: &'a StateManager,
    pub(crate) store: &'a ScopeStore,
    pub(crate) injector: &'a Injector,
    pub(crate) screens: &'a mut ScreenChannel,
    pub(crate) pending_clears: &'a mut Vec<ScopeLayer>,
    pub(crate) flow_scope: Option<&'a mut FlowScope>,
    /// Config layers, sub-flow overrides first
    pub(crate) config: Vec<&'a ConfigScope>,
}

impl<'a> ActorEnv<'a> {
    fn injection_context(&mut self) -> InjectionContext<'_> {
        InjectionContext {
            device: self.manager.device(),
            store: self.store,
            flow_scope: self.flow_scope.as_deref_mut(),
            config: self.config.clone(),
        }
    }

    pub fn inject<T: Injectable + ?Sized>(&mut self, target: &mut T) -> FlowResult<()> {
        let injector = self.injector;
        let mut context = self.injection_context();
        injector.inject(target, &mut context)
    }

    pub fn outject<T: Injectable + ?Sized>(&mut self, target: &mut T) {
        let injector = self.injector;
        let mut context = self.injection_context();
        injector.outject(target, &mut context);
    }

    pub fn flow_context<'s>(&'s mut self, action: &'s Action) -> FlowContext<'s> {
        FlowContext {
            action,
            manager: self.manager,
            store: self.store,
            flow_scope: self.flow_scope.as_deref_mut(),
            screens: &mut *self.screens,
            pending_clears: &mut *self.pending_clears,
        }
    }

    /// Run a handler with `id` marked as executing, so actions it enqueues
    /// carry it as their origin
    pub fn run_handler<R>(
        &mut self,
        id: HandlerId,
        action: &Action,
        handler: impl FnOnce(&mut FlowContext<'_>) -> R,
    ) -> R {
        let manager = self.manager;
        let _executing = ExecutingGuard::enter(&manager.shared, id);
        let mut context = self.flow_context(action);
        handler(&mut context)
    }
}

/// Marks a handler as executing; restores the previous marker on drop,
/// including during unwinding
struct ExecutingGuard<'a> {
    shared: &'a ActorShared,
    previous: Option<HandlerId>,
}

impl<'a> ExecutingGuard<'a> {
    fn enter(shared: &'a ActorShared, id: HandlerId) -> Self {
        let previous = shared.executing.lock().replace(id);
        Self { shared, previous }
    }
}

impl Drop for ExecutingGuard<'_> {
    fn drop(&mut self) {
        *self.shared.executing.lock() = self.previous.take();
    }
}
