//! # Scopes
//!
//! Named layers of key/value storage with defined lifetimes:
//!
//! - **Device**: lives as long as the actor
//! - **Session**: cleared explicitly or on session timeout
//! - **Conversation**: cleared explicitly and whenever Session is cleared
//! - **Flow**: local to one [`StateContext`](crate::flow::StateContext), copied into sub-flows
//! - **Config**: read-only values from the static flow configuration

pub mod store;
pub mod value;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

pub use store::ScopeStore;
pub use value::ScopeValue;

/// Scope a field declares it is injected from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind {
    Device,
    Session,
    Conversation,
    Flow,
    Config,
}

impl ScopeKind {
    /// The Scope Store layer backing this kind, if any
    pub fn layer(self) -> Option<ScopeLayer> {
        match self {
            Self::Device => Some(ScopeLayer::Device),
            Self::Session => Some(ScopeLayer::Session),
            Self::Conversation => Some(ScopeLayer::Conversation),
            Self::Flow | Self::Config => None,
        }
    }
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Device => write!(f, "device"),
            Self::Session => write!(f, "session"),
            Self::Conversation => write!(f, "conversation"),
            Self::Flow => write!(f, "flow"),
            Self::Config => write!(f, "config"),
        }
    }
}

/// Layers held by the [`ScopeStore`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeLayer {
    Device,
    Session,
    Conversation,
}

impl ScopeLayer {
    /// Resolution order, highest precedence first
    pub const PRECEDENCE: [ScopeLayer; 3] = [Self::Conversation, Self::Session, Self::Device];

    pub fn kind(self) -> ScopeKind {
        match self {
            Self::Device => ScopeKind::Device,
            Self::Session => ScopeKind::Session,
            Self::Conversation => ScopeKind::Conversation,
        }
    }
}

impl fmt::Display for ScopeLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.kind().fmt(f)
    }
}

/// Flow-local values. Only touched on the actor thread.
#[derive(Debug, Clone, Default)]
pub struct FlowScope {
    values: HashMap<String, ScopeValue>,
}

impl FlowScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&ScopeValue> {
        self.values.get(name)
    }

    pub fn get_as<T: std::any::Any + Send + Sync>(&self, name: &str) -> Option<std::sync::Arc<T>> {
        self.values.get(name).and_then(|value| value.downcast::<T>())
    }

    pub fn set(&mut self, name: impl Into<String>, value: ScopeValue) -> Option<ScopeValue> {
        self.values.insert(name.into(), value)
    }

    pub fn set_value<T: std::any::Any + Send + Sync>(
        &mut self,
        name: impl Into<String>,
        value: T,
    ) -> Option<ScopeValue> {
        self.set(name, ScopeValue::new(value))
    }

    pub fn remove(&mut self, name: &str) -> Option<ScopeValue> {
        self.values.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn entries(&self) -> Vec<(String, &'static str)> {
        let mut entries: Vec<_> = self
            .values
            .iter()
            .map(|(name, value)| (name.clone(), value.type_name()))
            .collect();
        entries.sort();
        entries
    }
}

/// Read-only values from the static flow configuration
#[derive(Debug, Clone, Default)]
pub struct ConfigScope {
    values: HashMap<String, ScopeValue>,
}

impl ConfigScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value<T: std::any::Any + Send + Sync>(
        mut self,
        name: impl Into<String>,
        value: T,
    ) -> Self {
        self.values.insert(name.into(), ScopeValue::new(value));
        self
    }

    pub fn get(&self, name: &str) -> Option<&ScopeValue> {
        self.values.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.values.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
