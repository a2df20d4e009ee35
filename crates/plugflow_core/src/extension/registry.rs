//! Live extension registry and lifecycle owner.
//!
//! # Responsibility
//! - Own the name -> instance map and drive load -> initialize -> active ->
//!   cleanup -> discard.
//! - Expose the hook bus to the host and to extensions.
//!
//! # Invariants
//! - A name maps to at most one instance; re-registering is a no-op success.
//! - Failed loads or initializations never leave an entry behind.
//! - No registry lock is held while extension code runs, so extensions may
//!   call back into the registry (nested workflow calls, hooks).

use crate::extension::context::Context;
use crate::extension::contract::{CallArgs, Extension, ExtensionError};
use crate::extension::hook::{HookBus, HookCallback};
use crate::extension::loader::{ExtensionLoader, LoadError};
use crate::extension::panic_message;
use log::{error, info, warn};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Shared handle to an active extension.
pub type ExtensionHandle = Arc<dyn Extension>;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error("extension `{name}` failed to initialize: {source}")]
    Initialization {
        name: String,
        #[source]
        source: ExtensionError,
    },
    #[error("extension `{0}` is not registered")]
    NotRegistered(String),
}

pub struct ExtensionRegistry {
    loader: ExtensionLoader,
    context: RwLock<Arc<Context>>,
    entries: Mutex<BTreeMap<String, ExtensionHandle>>,
    hooks: HookBus,
}

impl ExtensionRegistry {
    pub fn new(loader: ExtensionLoader) -> Arc<Self> {
        Arc::new(Self {
            loader,
            context: RwLock::new(Arc::new(Context::default())),
            entries: Mutex::new(BTreeMap::new()),
            hooks: HookBus::new(),
        })
    }

    /// Stores the shared context. Only extensions initialized afterwards see
    /// the new value.
    pub fn set_context(&self, context: Arc<Context>) {
        *self.context.write() = context;
    }

    pub fn context(&self) -> Arc<Context> {
        Arc::clone(&self.context.read())
    }

    pub fn loader(&self) -> &ExtensionLoader {
        &self.loader
    }

    /// Discoverable identifiers; a pure directory read.
    pub fn discover(&self) -> Vec<String> {
        self.loader.discover()
    }

    /// Loads, initializes, and stores `name`.
    pub fn register(&self, name: &str) -> Result<(), RegistryError> {
        if self.entries.lock().contains_key(name) {
            warn!("event=extension_register module=registry status=noop reason=already_registered name={name}");
            return Ok(());
        }

        let mut extension = self.loader.load(name).map_err(|err| {
            error!("event=extension_register module=registry status=error stage=load name={name} error={err}");
            RegistryError::from(err)
        })?;

        if let Err(source) = extension.initialize(self.context()) {
            error!("event=extension_register module=registry status=error stage=initialize name={name} error={source}");
            return Err(RegistryError::Initialization {
                name: name.to_string(),
                source,
            });
        }

        let handle: ExtensionHandle = Arc::from(extension);
        let mut entries = self.entries.lock();
        if entries.contains_key(name) {
            drop(entries);
            // Lost a registration race; the stored instance stays authoritative.
            if let Err(err) = handle.cleanup() {
                warn!("event=extension_cleanup module=registry status=error name={name} error={err}");
            }
            return Ok(());
        }
        entries.insert(name.to_string(), handle);
        info!("event=extension_register module=registry status=ok name={name}");
        Ok(())
    }

    /// Registers each identifier, returning the names that are now active.
    pub fn register_all(&self, names: &[String]) -> Vec<String> {
        names
            .iter()
            .filter(|name| self.register(name).is_ok())
            .cloned()
            .collect()
    }

    /// Cleans up and removes `name`. Cleanup failure is logged, not fatal.
    pub fn unregister(&self, name: &str) -> Result<(), RegistryError> {
        let Some(handle) = self.entries.lock().remove(name) else {
            warn!("event=extension_unregister module=registry status=error reason=not_registered name={name}");
            return Err(RegistryError::NotRegistered(name.to_string()));
        };

        match catch_unwind(AssertUnwindSafe(|| handle.cleanup())) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                warn!("event=extension_cleanup module=registry status=error name={name} error={err}")
            }
            Err(payload) => warn!(
                "event=extension_cleanup module=registry status=panic name={name} payload={}",
                panic_message(payload.as_ref())
            ),
        }
        info!("event=extension_unregister module=registry status=ok name={name}");
        Ok(())
    }

    /// Unregisters everything, in name order.
    pub fn unregister_all(&self) {
        for name in self.names() {
            let _ = self.unregister(&name);
        }
    }

    pub fn get(&self, name: &str) -> Option<ExtensionHandle> {
        self.entries.lock().get(name).cloned()
    }

    /// Snapshot of all active extensions.
    pub fn get_all(&self) -> BTreeMap<String, ExtensionHandle> {
        self.entries.lock().clone()
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.lock().keys().cloned().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.lock().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Runs `name`'s `execute`. Returns `None` when the extension is unknown,
    /// fails, or panics; the cause is logged.
    pub fn execute(&self, name: &str, call: &CallArgs) -> Option<Value> {
        let Some(handle) = self.get(name) else {
            error!("event=extension_execute module=registry status=error reason=not_registered name={name}");
            return None;
        };

        match catch_unwind(AssertUnwindSafe(|| handle.execute(call))) {
            Ok(Ok(value)) => {
                info!("event=extension_execute module=registry status=ok name={name}");
                Some(value)
            }
            Ok(Err(err)) => {
                error!("event=extension_execute module=registry status=error name={name} error={err}");
                None
            }
            Err(payload) => {
                error!(
                    "event=extension_execute module=registry status=panic name={name} payload={}",
                    panic_message(payload.as_ref())
                );
                None
            }
        }
    }

    pub fn hooks(&self) -> &HookBus {
        &self.hooks
    }

    pub fn register_hook(&self, hook_name: &str, callback: HookCallback) {
        self.hooks.register(hook_name, callback);
    }

    pub fn unregister_hook(&self, hook_name: &str, callback: &HookCallback) -> bool {
        self.hooks.unregister(hook_name, callback)
    }

    pub fn trigger_hook(&self, hook_name: &str, call: &CallArgs) -> Vec<Value> {
        self.hooks.trigger(hook_name, call)
    }
}

#[cfg(test)]
mod tests {
    use super::{ExtensionRegistry, RegistryError};
    use crate::extension::context::Context;
    use crate::extension::contract::{CallArgs, Extension, ExtensionError, ExtensionInfo};
    use crate::extension::loader::{ExtensionLoader, LoadError};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct Counters {
        initialized: AtomicUsize,
        cleaned: AtomicUsize,
    }

    struct Tracked {
        counters: Arc<Counters>,
        fail_init: bool,
    }

    impl Extension for Tracked {
        fn info(&self) -> ExtensionInfo {
            ExtensionInfo::new("Tracked")
        }

        fn initialize(&mut self, _context: Arc<Context>) -> Result<(), ExtensionError> {
            self.counters.initialized.fetch_add(1, Ordering::SeqCst);
            if self.fail_init {
                return Err(ExtensionError::Initialization("refused".to_string()));
            }
            Ok(())
        }

        fn execute(&self, call: &CallArgs) -> Result<Value, ExtensionError> {
            match call.get_str("mode", 0) {
                Some("fail") => Err(ExtensionError::failed("asked to fail")),
                Some("panic") => panic!("asked to panic"),
                _ => Ok(json!({ "args": call.args })),
            }
        }

        fn cleanup(&self) -> Result<(), ExtensionError> {
            self.counters.cleaned.fetch_add(1, Ordering::SeqCst);
            Err(ExtensionError::failed("cleanup is reported, not fatal"))
        }
    }

    fn registry_with(counters: &Arc<Counters>) -> Arc<ExtensionRegistry> {
        let ok = Arc::clone(counters);
        let failing = Arc::clone(counters);
        ExtensionRegistry::new(
            ExtensionLoader::new(Vec::new())
                .with_builtin("tracked", move || {
                    Box::new(Tracked {
                        counters: Arc::clone(&ok),
                        fail_init: false,
                    })
                })
                .with_builtin("stubborn", move || {
                    Box::new(Tracked {
                        counters: Arc::clone(&failing),
                        fail_init: true,
                    })
                }),
        )
    }

    #[test]
    fn register_is_idempotent() {
        let counters = Arc::new(Counters::default());
        let registry = registry_with(&counters);

        registry.register("tracked").expect("first register");
        let first = registry.get("tracked").expect("entry");
        registry.register("tracked").expect("second register");
        let second = registry.get("tracked").expect("entry");

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(counters.initialized.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn failed_initialization_leaves_no_entry() {
        let counters = Arc::new(Counters::default());
        let registry = registry_with(&counters);

        let err = registry.register("stubborn").expect_err("init refuses");
        assert!(matches!(err, RegistryError::Initialization { .. }));
        assert!(!registry.contains("stubborn"));
        assert_eq!(counters.cleaned.load(Ordering::SeqCst), 0);

        let err = registry.register("ghost").expect_err("unknown unit");
        assert!(matches!(err, RegistryError::Load(LoadError::NotFound(_))));
        assert!(registry.is_empty());
    }

    #[test]
    fn unregister_cleans_up_even_when_cleanup_fails() {
        let counters = Arc::new(Counters::default());
        let registry = registry_with(&counters);
        registry.register("tracked").expect("register");

        registry.unregister("tracked").expect("unregister");
        assert_eq!(counters.cleaned.load(Ordering::SeqCst), 1);
        assert!(registry.get("tracked").is_none());

        let err = registry.unregister("tracked").expect_err("already gone");
        assert!(matches!(err, RegistryError::NotRegistered(_)));
        assert_eq!(counters.cleaned.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn execute_converts_failures_into_none() {
        let counters = Arc::new(Counters::default());
        let registry = registry_with(&counters);
        registry.register("tracked").expect("register");

        let value = registry.execute("tracked", &CallArgs::new().arg("a"));
        assert_eq!(value, Some(json!({ "args": ["a"] })));
        assert_eq!(
            registry.execute("tracked", &CallArgs::new().kwarg("mode", "fail")),
            None
        );
        assert_eq!(
            registry.execute("tracked", &CallArgs::new().kwarg("mode", "panic")),
            None
        );
        assert_eq!(registry.execute("missing", &CallArgs::new()), None);
        assert!(registry.contains("tracked"));
    }

    #[test]
    fn get_all_is_a_snapshot() {
        let counters = Arc::new(Counters::default());
        let registry = registry_with(&counters);
        registry.register("tracked").expect("register");

        let mut snapshot = registry.get_all();
        snapshot.clear();
        assert_eq!(registry.names(), vec!["tracked".to_string()]);
    }

    #[test]
    fn register_all_reports_survivors() {
        let counters = Arc::new(Counters::default());
        let registry = registry_with(&counters);
        let active = registry.register_all(&[
            "tracked".to_string(),
            "stubborn".to_string(),
            "ghost".to_string(),
        ]);
        assert_eq!(active, vec!["tracked".to_string()]);

        registry.unregister_all();
        assert!(registry.is_empty());
    }
}
