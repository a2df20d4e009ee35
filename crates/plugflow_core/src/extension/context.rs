//! Shared host context handed to every extension.
//!
//! # Invariants
//! - A context is frozen once built; extensions only ever see `Arc<Context>`.
//! - The registry back-reference is weak, so the registry owning the context
//!   never keeps itself alive.

use crate::extension::registry::ExtensionRegistry;
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::sync::{Arc, Weak};

/// Collaborator name under which the host version is published.
pub const APP_VERSION_KEY: &str = "app_version";

type Collaborator = Arc<dyn Any + Send + Sync>;

/// Read-only bag of host-provided collaborators.
#[derive(Default)]
pub struct Context {
    registry: Option<Weak<ExtensionRegistry>>,
    collaborators: BTreeMap<String, Collaborator>,
}

impl Context {
    pub fn builder() -> ContextBuilder {
        ContextBuilder::default()
    }

    /// Returns the registry if the host attached one and it is still alive.
    pub fn registry(&self) -> Option<Arc<ExtensionRegistry>> {
        self.registry.as_ref().and_then(Weak::upgrade)
    }

    /// Typed lookup of one collaborator.
    pub fn get<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.collaborators
            .get(name)
            .cloned()
            .and_then(|value| value.downcast::<T>().ok())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.collaborators.contains_key(name)
    }

    /// Sorted collaborator names.
    pub fn names(&self) -> Vec<&str> {
        self.collaborators.keys().map(String::as_str).collect()
    }
}

impl Debug for Context {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("has_registry", &self.registry().is_some())
            .field("collaborators", &self.names())
            .finish()
    }
}

/// One-shot builder; `build` freezes the context.
#[derive(Default)]
pub struct ContextBuilder {
    registry: Option<Weak<ExtensionRegistry>>,
    collaborators: BTreeMap<String, Collaborator>,
}

impl ContextBuilder {
    pub fn registry(mut self, registry: &Arc<ExtensionRegistry>) -> Self {
        self.registry = Some(Arc::downgrade(registry));
        self
    }

    pub fn insert<T: Any + Send + Sync>(mut self, name: impl Into<String>, value: T) -> Self {
        self.collaborators.insert(name.into(), Arc::new(value));
        self
    }

    pub fn insert_shared<T: Any + Send + Sync>(
        mut self,
        name: impl Into<String>,
        value: Arc<T>,
    ) -> Self {
        self.collaborators.insert(name.into(), value);
        self
    }

    pub fn build(self) -> Arc<Context> {
        Arc::new(Context {
            registry: self.registry,
            collaborators: self.collaborators,
        })
    }
}
