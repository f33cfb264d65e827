//! Resolves scoped fields and writes them into targets.

use super::field::{FieldInfo, Injectable, ScopedField};
use crate::error::{FlowError, FlowResult};
use crate::models::DeviceKey;
use crate::scope::{ConfigScope, FlowScope, ScopeKind, ScopeStore, ScopeValue};
use std::any::Any;
use std::collections::HashMap;
use std::fmt::{self, Write as _};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Where injection reads from and where auto-created values are registered
pub struct InjectionContext<'a> {
    pub device: &'a DeviceKey,
    pub store: &'a ScopeStore,
    pub flow_scope: Option<&'a mut FlowScope>,
    /// Config layers searched in order (sub-flow overrides first)
    pub config: Vec<&'a ConfigScope>,
}

impl<'a> InjectionContext<'a> {
    pub fn new(device: &'a DeviceKey, store: &'a ScopeStore) -> Self {
        Self {
            device,
            store,
            flow_scope: None,
            config: Vec::new(),
        }
    }

    pub fn with_flow_scope(mut self, flow_scope: &'a mut FlowScope) -> Self {
        self.flow_scope = Some(flow_scope);
        self
    }

    pub fn with_config(mut self, config: &'a ConfigScope) -> Self {
        self.config.push(config);
        self
    }

    fn lookup(&self, scope: ScopeKind, name: &str) -> Option<ScopeValue> {
        match scope {
            ScopeKind::Flow => self
                .flow_scope
                .as_deref()
                .and_then(|flow| flow.get(name).cloned()),
            ScopeKind::Config => self
                .config
                .iter()
                .find_map(|config| config.get(name).cloned()),
            other => other.layer().and_then(|layer| self.store.get(layer, name)),
        }
    }

    fn register(&mut self, scope: ScopeKind, name: &str, value: ScopeValue) {
        match scope {
            ScopeKind::Flow => {
                if let Some(flow) = self.flow_scope.as_deref_mut() {
                    flow.set(name, value);
                }
            }
            ScopeKind::Config => {}
            other => {
                if let Some(layer) = other.layer() {
                    self.store.set(layer, name, value);
                }
            }
        }
    }

    /// Every populated scope, for diagnostics
    pub fn describe(&self) -> String {
        let mut out = self.store.dump();
        match self.flow_scope.as_deref() {
            Some(flow) => {
                let entries = flow.entries();
                let _ = writeln!(out, "flow scope ({}):", entries.len());
                for (name, type_name) in entries {
                    let _ = writeln!(out, "  {name}: {type_name}");
                }
            }
            None => {
                let _ = writeln!(out, "flow scope: <no active flow>");
            }
        }
        let names: Vec<&str> = self.config.iter().flat_map(|config| config.names()).collect();
        let _ = writeln!(out, "config scope: {names:?}");
        out
    }
}

/// Pluggable last-chance resolver consulted after scopes and factories
pub trait ValueProvider: Send + Sync {
    fn provide(&self, field: &FieldInfo, context: &InjectionContext<'_>) -> Option<ScopeValue>;
}

/// Product of a registered factory: injectable before it is shared
pub trait FactoryProduct: Injectable {
    fn as_injectable(&mut self) -> &mut dyn Injectable;
    fn into_scope_value(self: Box<Self>) -> ScopeValue;
}

impl<T: Injectable + Any + Send + Sync> FactoryProduct for T {
    fn as_injectable(&mut self) -> &mut dyn Injectable {
        self
    }

    fn into_scope_value(self: Box<Self>) -> ScopeValue {
        ScopeValue::from_arc(Arc::<T>::from(self))
    }
}

type Factory = Arc<dyn Fn() -> Box<dyn FactoryProduct> + Send + Sync>;

/// Populates [`Injectable`] targets from scopes
#[derive(Clone, Default)]
pub struct Injector {
    factories: HashMap<String, Factory>,
    providers: Vec<Arc<dyn ValueProvider>>,
}

impl fmt::Debug for Injector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut factories: Vec<_> = self.factories.keys().collect();
        factories.sort();
        f.debug_struct("Injector")
            .field("factories", &factories)
            .field("providers", &self.providers.len())
            .finish()
    }
}

impl Injector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the factory used when an `auto_create` field named `name` is missing
    pub fn with_factory<T, F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        T: Injectable + Any + Send + Sync,
        F: Fn() -> T + Send + Sync + 'static,
    {
        let factory: Factory = Arc::new(move || Box::new(factory()) as Box<dyn FactoryProduct>);
        self.factories.insert(name.into(), factory);
        self
    }

    pub fn with_provider(mut self, provider: Arc<dyn ValueProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn has_factory(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Resolve and assign every injectable field, then run the target's
    /// post-construction hook once.
    pub fn inject<T: Injectable + ?Sized>(
        &self,
        target: &mut T,
        context: &mut InjectionContext<'_>,
    ) -> FlowResult<()> {
        let mut creating = Vec::new();
        self.inject_tracked(target, context, &mut creating)
    }

    fn inject_tracked<T: Injectable + ?Sized>(
        &self,
        target: &mut T,
        context: &mut InjectionContext<'_>,
        creating: &mut Vec<String>,
    ) -> FlowResult<()> {
        let label = target.type_label();
        for field in target.scoped_fields() {
            if !field.direction.injects() {
                continue;
            }
            match self.resolve(label, &field, context, creating)? {
                Some(value) => field.slot.assign(field.name, &value)?,
                None if field.required => {
                    return Err(FlowError::InjectionFailed {
                        target: label.to_string(),
                        field: field.name.to_string(),
                        scope: field.scope,
                        scope_dump: context.describe(),
                    });
                }
                None => field.slot.clear(),
            }
        }

        target
            .on_injected()
            .map_err(|e| FlowError::handler_failed(format!("{label}::on_injected"), e))?;
        trace!(owner = label, device = %context.device, "Injected");
        Ok(())
    }

    fn resolve(
        &self,
        label: &'static str,
        field: &ScopedField<'_>,
        context: &mut InjectionContext<'_>,
        creating: &mut Vec<String>,
    ) -> FlowResult<Option<ScopeValue>> {
        if let Some(value) = context.lookup(field.scope, field.name) {
            return Ok(Some(value));
        }

        if field.auto_create {
            if let Some(value) = self.auto_create(field, context, creating)? {
                return Ok(Some(value));
            }
        }

        let info = field.info(label);
        Ok(self
            .providers
            .iter()
            .find_map(|provider| provider.provide(&info, context)))
    }

    fn auto_create(
        &self,
        field: &ScopedField<'_>,
        context: &mut InjectionContext<'_>,
        creating: &mut Vec<String>,
    ) -> FlowResult<Option<ScopeValue>> {
        let Some(factory) = self.factories.get(field.name) else {
            return Ok(None);
        };
        if field.scope == ScopeKind::Config {
            return Err(FlowError::ConflictingDeclaration {
                owner: field.name.to_string(),
                reason: "config-scoped fields are read-only and cannot be auto-created".to_string(),
            });
        }
        if creating.iter().any(|name| name == field.name) {
            let mut chain = creating.clone();
            chain.push(field.name.to_string());
            return Err(FlowError::FactoryCycle {
                name: field.name.to_string(),
                chain,
            });
        }

        creating.push(field.name.to_string());
        let mut product = (**factory)();
        let injected = self.inject_tracked(product.as_injectable(), context, creating);
        creating.pop();
        injected?;

        let value = product.into_scope_value();
        context.register(field.scope, field.name, value.clone());
        debug!(
            name = field.name,
            scope = %field.scope,
            type_name = value.type_name(),
            "Auto-created scoped value"
        );
        Ok(Some(value))
    }

    /// Write `out`/`in_out` fields back to their scopes. Unset fields leave
    /// the scope untouched.
    pub fn outject<T: Injectable + ?Sized>(&self, target: &mut T, context: &mut InjectionContext<'_>) {
        let label = target.type_label();
        for field in target.scoped_fields() {
            if !field.direction.outjects() {
                continue;
            }
            if field.scope == ScopeKind::Config {
                warn!(owner = label, field = field.name, "Ignoring outjection into read-only config scope");
                continue;
            }
            if let Some(value) = field.slot.current() {
                context.register(field.scope, field.name, value);
            }
        }
    }

    /// Clear every field of `target` declared in `scope`
    pub fn reset_injections<T: Injectable + ?Sized>(&self, target: &mut T, scope: ScopeKind) {
        for field in target.scoped_fields() {
            if field.scope == scope {
                field.slot.clear();
            }
        }
    }
}
