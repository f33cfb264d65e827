//! Hierarchical named-value storage with Conversation → Session → Device
//! resolution precedence.

use super::{ScopeLayer, ScopeValue};
use dashmap::DashMap;
use std::any::Any;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::debug;

/// Device, Session and Conversation layers for one actor.
///
/// Mutation normally happens on the actor thread, but diagnostic readers
/// may run anywhere, so every layer is a concurrent map.
#[derive(Debug, Default)]
pub struct ScopeStore {
    device: DashMap<String, ScopeValue>,
    session: DashMap<String, ScopeValue>,
    conversation: DashMap<String, ScopeValue>,
}

impl ScopeStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn layer(&self, layer: ScopeLayer) -> &DashMap<String, ScopeValue> {
        match layer {
            ScopeLayer::Device => &self.device,
            ScopeLayer::Session => &self.session,
            ScopeLayer::Conversation => &self.conversation,
        }
    }

    pub fn get(&self, layer: ScopeLayer, name: &str) -> Option<ScopeValue> {
        self.layer(layer).get(name).map(|entry| entry.value().clone())
    }

    /// Typed lookup in a single layer
    pub fn get_as<T: Any + Send + Sync>(&self, layer: ScopeLayer, name: &str) -> Option<Arc<T>> {
        self.get(layer, name).and_then(|value| value.downcast::<T>())
    }

    /// Store a value, returning the previous one
    pub fn set(&self, layer: ScopeLayer, name: impl Into<String>, value: ScopeValue) -> Option<ScopeValue> {
        self.layer(layer).insert(name.into(), value)
    }

    pub fn set_value<T: Any + Send + Sync>(
        &self,
        layer: ScopeLayer,
        name: impl Into<String>,
        value: T,
    ) -> Option<ScopeValue> {
        self.set(layer, name, ScopeValue::new(value))
    }

    pub fn remove(&self, layer: ScopeLayer, name: &str) -> Option<ScopeValue> {
        self.layer(layer).remove(name).map(|(_, value)| value)
    }

    pub fn contains(&self, layer: ScopeLayer, name: &str) -> bool {
        self.layer(layer).contains_key(name)
    }

    /// First match searching Conversation, then Session, then Device
    pub fn resolve(&self, name: &str) -> Option<ScopeValue> {
        ScopeLayer::PRECEDENCE
            .iter()
            .find_map(|layer| self.get(*layer, name))
    }

    pub fn resolve_as<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.resolve(name).and_then(|value| value.downcast::<T>())
    }

    /// Clear a layer. Clearing Session also clears Conversation. Returns the
    /// layers that were cleared so callers can reset injections on live objects.
    pub fn clear(&self, layer: ScopeLayer) -> Vec<ScopeLayer> {
        let cleared = match layer {
            ScopeLayer::Session => vec![ScopeLayer::Session, ScopeLayer::Conversation],
            other => vec![other],
        };
        for layer in &cleared {
            let removed = self.layer(*layer).len();
            self.layer(*layer).clear();
            debug!(layer = %layer, removed = removed, "Cleared scope layer");
        }
        cleared
    }

    pub fn clear_all(&self) {
        self.clear(ScopeLayer::Device);
        self.clear(ScopeLayer::Session);
    }

    pub fn len(&self, layer: ScopeLayer) -> usize {
        self.layer(layer).len()
    }

    pub fn is_empty(&self) -> bool {
        ScopeLayer::PRECEDENCE
            .iter()
            .all(|layer| self.layer(*layer).is_empty())
    }

    /// Sorted snapshot of a layer's names and value types
    pub fn entries(&self, layer: ScopeLayer) -> Vec<(String, &'static str)> {
        let mut entries: Vec<_> = self
            .layer(layer)
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().type_name()))
            .collect();
        entries.sort();
        entries
    }

    /// Human readable listing of every populated layer
    pub fn dump(&self) -> String {
        let mut out = String::new();
        for layer in ScopeLayer::PRECEDENCE {
            let entries = self.entries(layer);
            let _ = writeln!(out, "{layer} scope ({}):", entries.len());
            for (name, type_name) in entries {
                let _ = writeln!(out, "  {name}: {type_name}");
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_precedence() {
        let store = ScopeStore::new();
        store.set_value(ScopeLayer::Device, "operator", "device".to_string());
        store.set_value(ScopeLayer::Session, "operator", "session".to_string());
        assert_eq!(
            store.resolve_as::<String>("operator").as_deref().map(String::as_str),
            Some("session")
        );

        store.set_value(ScopeLayer::Conversation, "operator", "conversation".to_string());
        assert_eq!(
            store.resolve_as::<String>("operator").as_deref().map(String::as_str),
            Some("conversation")
        );
    }

    #[test]
    fn test_clear_session_clears_conversation() {
        let store = ScopeStore::new();
        store.set_value(ScopeLayer::Conversation, "basket", 3_u32);
        store.set_value(ScopeLayer::Session, "user", "ann".to_string());
        store.set_value(ScopeLayer::Device, "terminal", 7_u32);

        let cleared = store.clear(ScopeLayer::Session);
        assert_eq!(cleared, vec![ScopeLayer::Session, ScopeLayer::Conversation]);
        assert!(store.resolve("basket").is_none());
        assert!(store.resolve("user").is_none());
        assert_eq!(store.resolve_as::<u32>("terminal").map(|v| *v), Some(7));
    }

    #[test]
    fn test_clear_conversation_keeps_session() {
        let store = ScopeStore::new();
        store.set_value(ScopeLayer::Conversation, "basket", 3_u32);
        store.set_value(ScopeLayer::Session, "user", "ann".to_string());

        assert_eq!(store.clear(ScopeLayer::Conversation), vec![ScopeLayer::Conversation]);
        assert!(store.contains(ScopeLayer::Session, "user"));
        assert!(!store.contains(ScopeLayer::Conversation, "basket"));
    }

    #[test]
    fn test_no_implicit_promotion() {
        let store = ScopeStore::new();
        store.set_value(ScopeLayer::Conversation, "basket", 3_u32);
        assert!(store.get(ScopeLayer::Session, "basket").is_none());
        assert!(store.get(ScopeLayer::Device, "basket").is_none());
    }

    #[test]
    fn test_dump_lists_entries() {
        let store = ScopeStore::new();
        store.set_value(ScopeLayer::Device, "terminal", 7_u32);
        let dump = store.dump();
        assert!(dump.contains("device scope (1):"));
        assert!(dump.contains("terminal: u32"));
        assert!(dump.contains("conversation scope (0):"));
    }
}
