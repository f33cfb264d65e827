//! # Injection
//!
//! Moves values between scopes and the fields of live objects (states,
//! transition steps, global handlers). Types declare their scoped fields
//! explicitly through [`Injectable::scoped_fields`]; factories for
//! auto-created values are registered ahead of time on the [`Injector`].

pub mod field;
pub mod injector;

pub use field::{Direction, FieldInfo, Injectable, ScopeSlot, Scoped, ScopedField};
pub use injector::{FactoryProduct, InjectionContext, Injector, ValueProvider};
