//! Action handler tables declared by states and global handlers.

use crate::models::Action;
use crate::runtime::FlowContext;
use crate::utils::simple_type_name;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

type TypedHandler<S> =
    Arc<dyn Fn(&mut S, &Action, &mut FlowContext<'_>) -> anyhow::Result<()> + Send + Sync>;

/// Handler with its owner type erased. The first argument must be the owner.
pub(crate) type ErasedHandler =
    Arc<dyn Fn(&mut dyn Any, &Action, &mut FlowContext<'_>) -> anyhow::Result<()> + Send + Sync>;

/// Builder handed to [`FlowState::register_handlers`](super::FlowState::register_handlers)
pub struct ActionHandlers<S> {
    specific: HashMap<String, TypedHandler<S>>,
    any_action: Option<TypedHandler<S>>,
    duplicates: Vec<String>,
}

impl<S> Default for ActionHandlers<S> {
    fn default() -> Self {
        Self {
            specific: HashMap::new(),
            any_action: None,
            duplicates: Vec::new(),
        }
    }
}

impl<S: 'static> ActionHandlers<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle `action` while the owner is current
    pub fn on<F>(&mut self, action: impl Into<String>, handler: F) -> &mut Self
    where
        F: Fn(&mut S, &Action, &mut FlowContext<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let action = action.into();
        if self.specific.insert(action.clone(), Arc::new(handler)).is_some() {
            self.duplicates.push(action);
        }
        self
    }

    /// Fallback for actions nothing more specific handles
    pub fn on_any<F>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(&mut S, &Action, &mut FlowContext<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        if self.any_action.replace(Arc::new(handler)).is_some() {
            self.duplicates.push("<any action>".to_string());
        }
        self
    }

    pub fn handles(&self, action: &str) -> bool {
        self.specific.contains_key(action)
    }

    pub fn len(&self) -> usize {
        self.specific.len() + usize::from(self.any_action.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn into_table(self) -> Result<HandlerTable, Vec<String>> {
        if !self.duplicates.is_empty() {
            return Err(self.duplicates);
        }
        Ok(HandlerTable {
            specific: self
                .specific
                .into_iter()
                .map(|(action, handler)| (action, erase(handler)))
                .collect(),
            any_action: self.any_action.map(erase),
        })
    }
}

fn erase<S: 'static>(handler: TypedHandler<S>) -> ErasedHandler {
    Arc::new(move |owner: &mut dyn Any, action: &Action, context: &mut FlowContext<'_>| {
        let owner = owner.downcast_mut::<S>().ok_or_else(|| {
            anyhow::anyhow!(
                "handler for {} invoked on a different type",
                simple_type_name::<S>()
            )
        })?;
        handler(owner, action, context)
    })
}

/// Erased handlers of one owner type
#[derive(Clone, Default)]
pub(crate) struct HandlerTable {
    specific: HashMap<String, ErasedHandler>,
    any_action: Option<ErasedHandler>,
}

impl HandlerTable {
    pub(crate) fn get(&self, action: &str) -> Option<&ErasedHandler> {
        self.specific.get(action)
    }

    pub(crate) fn any_action(&self) -> Option<&ErasedHandler> {
        self.any_action.as_ref()
    }

    pub(crate) fn actions(&self) -> impl Iterator<Item = &str> {
        self.specific.keys().map(String::as_str)
    }
}
