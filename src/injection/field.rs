//! Statically declared scoped-field descriptors.
//!
//! A type lists its scoped fields by returning one [`ScopedField`] per field
//! from [`Injectable::scoped_fields`]. Each descriptor borrows the field's
//! [`ScopeSlot`], so the injector can write to it without reflection.

use crate::error::{FlowError, FlowResult};
use crate::scope::{ScopeKind, ScopeValue};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Whether a field is read from its scope, written back to it, or both
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
    InOut,
}

impl Direction {
    pub fn injects(self) -> bool {
        matches!(self, Self::In | Self::InOut)
    }

    pub fn outjects(self) -> bool {
        matches!(self, Self::Out | Self::InOut)
    }
}

/// Storage the injector can write a [`ScopeValue`] into
pub trait ScopeSlot: Send {
    fn assign(&mut self, name: &str, value: &ScopeValue) -> FlowResult<()>;
    fn clear(&mut self);
    fn current(&self) -> Option<ScopeValue>;
}

/// A field populated from a scope. Holds a shared handle to the scoped value.
pub struct Scoped<T> {
    value: Option<Arc<T>>,
}

impl<T> Default for Scoped<T> {
    fn default() -> Self {
        Self { value: None }
    }
}

impl<T> Clone for Scoped<T> {
    fn clone(&self) -> Self {
        Self {
            value: self.value.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Scoped<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => f.debug_tuple("Scoped").field(value).finish(),
            None => write!(f, "Scoped(<unset>)"),
        }
    }
}

impl<T: Any + Send + Sync> Scoped<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<&T> {
        self.value.as_deref()
    }

    pub fn arc(&self) -> Option<Arc<T>> {
        self.value.clone()
    }

    /// The value, or an error naming the missing type
    pub fn require(&self) -> anyhow::Result<&T> {
        self.value
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("{} has not been injected", std::any::type_name::<T>()))
    }

    pub fn set(&mut self, value: T) {
        self.value = Some(Arc::new(value));
    }

    pub fn set_arc(&mut self, value: Arc<T>) {
        self.value = Some(value);
    }

    pub fn take(&mut self) -> Option<Arc<T>> {
        self.value.take()
    }

    pub fn is_set(&self) -> bool {
        self.value.is_some()
    }
}

impl<T: Any + Send + Sync> ScopeSlot for Scoped<T> {
    fn assign(&mut self, name: &str, value: &ScopeValue) -> FlowResult<()> {
        let typed = value.downcast::<T>().ok_or_else(|| FlowError::TypeMismatch {
            name: name.to_string(),
            expected: std::any::type_name::<T>(),
            actual: value.type_name(),
        })?;
        self.value = Some(typed);
        Ok(())
    }

    fn clear(&mut self) {
        self.value = None;
    }

    fn current(&self) -> Option<ScopeValue> {
        self.value.clone().map(ScopeValue::from_arc)
    }
}

/// Descriptor for one scoped field, borrowing its slot
pub struct ScopedField<'a> {
    pub name: &'static str,
    pub scope: ScopeKind,
    pub required: bool,
    pub auto_create: bool,
    pub direction: Direction,
    pub(crate) slot: &'a mut dyn ScopeSlot,
}

impl<'a> ScopedField<'a> {
    /// Required, inject-only field
    pub fn new(name: &'static str, scope: ScopeKind, slot: &'a mut dyn ScopeSlot) -> Self {
        Self {
            name,
            scope,
            required: true,
            auto_create: false,
            direction: Direction::In,
            slot,
        }
    }

    pub fn device(name: &'static str, slot: &'a mut dyn ScopeSlot) -> Self {
        Self::new(name, ScopeKind::Device, slot)
    }

    pub fn session(name: &'static str, slot: &'a mut dyn ScopeSlot) -> Self {
        Self::new(name, ScopeKind::Session, slot)
    }

    pub fn conversation(name: &'static str, slot: &'a mut dyn ScopeSlot) -> Self {
        Self::new(name, ScopeKind::Conversation, slot)
    }

    pub fn flow(name: &'static str, slot: &'a mut dyn ScopeSlot) -> Self {
        Self::new(name, ScopeKind::Flow, slot)
    }

    pub fn config(name: &'static str, slot: &'a mut dyn ScopeSlot) -> Self {
        Self::new(name, ScopeKind::Config, slot)
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn auto_create(mut self) -> Self {
        self.auto_create = true;
        self
    }

    /// Read on injection and written back on outjection
    pub fn in_out(mut self) -> Self {
        self.direction = Direction::InOut;
        self
    }

    /// Only written back on outjection; never required on injection
    pub fn out_only(mut self) -> Self {
        self.direction = Direction::Out;
        self.required = false;
        self
    }

    pub fn info(&self, target: &'static str) -> FieldInfo {
        FieldInfo {
            target,
            name: self.name,
            scope: self.scope,
            required: self.required,
        }
    }
}

impl fmt::Debug for ScopedField<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedField")
            .field("name", &self.name)
            .field("scope", &self.scope)
            .field("required", &self.required)
            .field("auto_create", &self.auto_create)
            .field("direction", &self.direction)
            .finish()
    }
}

/// Slot-free copy of a descriptor handed to value providers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldInfo {
    pub target: &'static str,
    pub name: &'static str,
    pub scope: ScopeKind,
    pub required: bool,
}

/// An object whose scoped fields the injector can populate.
///
/// Embedded "base" structs contribute their fields by extending the list:
///
/// ```rust,ignore
/// fn scoped_fields(&mut self) -> Vec<ScopedField<'_>> {
///     let mut fields = self.base.scoped_fields();
///     fields.push(ScopedField::session("cart", &mut self.cart));
///     fields
/// }
/// ```
pub trait Injectable: Send {
    fn scoped_fields(&mut self) -> Vec<ScopedField<'_>> {
        Vec::new()
    }

    /// Post-construction hook, run once after every successful injection
    fn on_injected(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    fn type_label(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}
