use chrono::{DateTime, Utc};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A type-erased value stored in a scope layer. Cloning shares the value.
#[derive(Clone)]
pub struct ScopeValue {
    value: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
    stored_at: DateTime<Utc>,
}

impl ScopeValue {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self::from_arc(Arc::new(value))
    }

    pub fn from_arc<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        Self {
            value,
            type_name: std::any::type_name::<T>(),
            stored_at: Utc::now(),
        }
    }

    /// Shared handle to the value when it holds a `T`
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.value).downcast::<T>().ok()
    }

    pub fn get<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    pub fn is<T: Any>(&self) -> bool {
        self.value.is::<T>()
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn stored_at(&self) -> DateTime<Utc> {
        self.stored_at
    }

    /// True when both values share the same allocation
    pub fn same_instance(&self, other: &ScopeValue) -> bool {
        Arc::ptr_eq(&self.value, &other.value)
    }
}

impl fmt::Debug for ScopeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeValue")
            .field("type_name", &self.type_name)
            .field("stored_at", &self.stored_at)
            .finish()
    }
}
