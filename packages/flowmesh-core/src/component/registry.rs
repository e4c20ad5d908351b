//! Component registry: name → descriptor + constructor.
//!
//! Components are registered explicitly as a table of descriptor plus
//! constructor closure; there is no runtime class inspection. Instantiation
//! is validate-then-build: arguments are checked against the declared schema
//! (with defaults filled in) before the constructor ever runs.

use std::collections::HashMap;

use serde_json::Value;

use super::schema;
use super::{Component, ComponentDescriptor};
use crate::error::{ComponentResult, FlowError, FlowResult};

type Constructor = Box<dyn Fn(&Value) -> ComponentResult<Box<dyn Component>> + Send + Sync>;

/// One registered component: its descriptor and how to build an instance.
pub struct ComponentRegistration {
    descriptor: ComponentDescriptor,
    constructor: Constructor,
}

impl ComponentRegistration {
    /// Creates a registration, checking the descriptor's category invariants.
    ///
    /// The constructor receives normalized init args (schema-validated,
    /// defaults filled) and returns a fresh component instance.
    pub fn new<F>(descriptor: ComponentDescriptor, constructor: F) -> Self
    where
        F: Fn(&Value) -> ComponentResult<Box<dyn Component>> + Send + Sync + 'static,
    {
        descriptor.assert_invariants();
        Self {
            descriptor,
            constructor: Box::new(constructor),
        }
    }
}

/// The set of component classes known to this process.
///
/// Discovered once at startup and immutable afterwards.
#[derive(Default)]
pub struct ComponentRegistry {
    components: HashMap<String, ComponentRegistration>,
}

impl ComponentRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry pre-populated with the builtin components.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        super::builtin::register_all(&mut registry);
        registry
    }

    /// Registers a component.
    ///
    /// # Panics
    ///
    /// Panics on duplicate names; registrations happen at process start and
    /// a collision is a wiring bug.
    pub fn register(&mut self, registration: ComponentRegistration) {
        let name = registration.descriptor.name.clone();
        let previous = self.components.insert(name.clone(), registration);
        assert!(previous.is_none(), "duplicate component registration: {name}");
    }

    /// Returns all descriptors in a stable order: category, then name.
    #[must_use]
    pub fn list(&self) -> Vec<ComponentDescriptor> {
        let mut descriptors: Vec<ComponentDescriptor> = self
            .components
            .values()
            .map(|r| r.descriptor.clone())
            .collect();
        descriptors.sort_by(|a, b| (a.category, &a.name).cmp(&(b.category, &b.name)));
        descriptors
    }

    /// Looks up a descriptor by component name.
    #[must_use]
    pub fn descriptor(&self, name: &str) -> Option<&ComponentDescriptor> {
        self.components.get(name).map(|r| &r.descriptor)
    }

    /// Validates init args against the component's schema without
    /// constructing. Returns the normalized args (defaults filled in).
    pub fn validate_args(&self, name: &str, args: &Value) -> FlowResult<Value> {
        let registration = self
            .components
            .get(name)
            .ok_or_else(|| FlowError::ComponentNotFound(name.to_string()))?;
        schema::validate_args(&registration.descriptor.init, args).map_err(FlowError::InvalidArgs)
    }

    /// Validates and constructs a component instance.
    pub fn instantiate(&self, name: &str, args: &Value) -> FlowResult<Box<dyn Component>> {
        let registration = self
            .components
            .get(name)
            .ok_or_else(|| FlowError::ComponentNotFound(name.to_string()))?;
        let normalized = schema::validate_args(&registration.descriptor.init, args)
            .map_err(FlowError::InvalidArgs)?;
        (registration.constructor)(&normalized)
            .map_err(|e| FlowError::InvalidArgs(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn list_is_sorted_by_category_then_name() {
        let registry = ComponentRegistry::with_builtins();
        let listed = registry.list();
        assert!(!listed.is_empty());

        let keys: Vec<_> = listed
            .iter()
            .map(|d| (d.category, d.name.clone()))
            .collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);

        // Sources come before sinks.
        let first_sink = listed.iter().position(|d| d.category == super::super::Category::Sink);
        let last_source = listed
            .iter()
            .rposition(|d| d.category == super::super::Category::Source);
        if let (Some(sink), Some(source)) = (first_sink, last_source) {
            assert!(source < sink);
        }
    }

    #[test]
    fn unknown_component_reports_not_found() {
        let registry = ComponentRegistry::with_builtins();
        assert!(matches!(
            registry.instantiate("warp_drive", &json!({})),
            Err(FlowError::ComponentNotFound(_))
        ));
    }

    #[test]
    fn invalid_args_rejected_before_construction() {
        let registry = ComponentRegistry::with_builtins();
        assert!(matches!(
            registry.instantiate("ticker", &json!({"interval_ms": "fast"})),
            Err(FlowError::InvalidArgs(_))
        ));
    }

    #[test]
    fn valid_args_construct() {
        let registry = ComponentRegistry::with_builtins();
        assert!(registry
            .instantiate("ticker", &json!({"interval_ms": 5, "start": 10}))
            .is_ok());
        // Defaults alone are enough.
        assert!(registry.instantiate("ticker", &Value::Null).is_ok());
    }
}
