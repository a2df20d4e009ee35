//! Host bootstrap and shutdown.
//!
//! # Responsibility
//! - Wire loader, registry, and the shared context together.
//! - Register builtins and every discovered extension at startup.
//!
//! # Invariants
//! - The context carries a registry back-reference and the host version.
//! - A failed registration is recorded and logged; startup continues.

use crate::config::HostConfig;
use crate::extension::context::{ContextBuilder, APP_VERSION_KEY};
use crate::extension::contract::Extension;
use crate::extension::loader::ExtensionLoader;
use crate::extension::registry::ExtensionRegistry;
use log::{info, warn};
use std::any::Any;
use std::sync::Arc;

/// Registration failure recorded during bootstrap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapFailure {
    pub name: String,
    pub reason: String,
}

pub struct HostBuilder {
    loader: ExtensionLoader,
    context: ContextBuilder,
}

impl HostBuilder {
    pub fn with_builtin<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Extension> + Send + Sync + 'static,
    {
        self.loader = self.loader.with_builtin(name, factory);
        self
    }

    /// Publishes a collaborator to every extension through the context.
    pub fn collaborator<T: Any + Send + Sync>(mut self, name: impl Into<String>, value: T) -> Self {
        self.context = self.context.insert(name, value);
        self
    }

    /// Like [`collaborator`](Self::collaborator) for a value the host keeps using.
    pub fn shared_collaborator<T: Any + Send + Sync>(
        mut self,
        name: impl Into<String>,
        value: Arc<T>,
    ) -> Self {
        self.context = self.context.insert_shared(name, value);
        self
    }

    pub fn bootstrap(self) -> Host {
        let registry = ExtensionRegistry::new(self.loader);
        let context = self
            .context
            .registry(&registry)
            .insert(APP_VERSION_KEY, crate::core_version().to_string())
            .build();
        registry.set_context(context);

        let mut candidates: Vec<String> = registry
            .loader()
            .builtin_names()
            .into_iter()
            .map(str::to_string)
            .collect();
        candidates.extend(registry.discover());

        let mut failures = Vec::new();
        for name in &candidates {
            if let Err(err) = registry.register(name) {
                warn!("event=host_bootstrap module=host status=partial name={name} error={err}");
                failures.push(BootstrapFailure {
                    name: name.clone(),
                    reason: err.to_string(),
                });
            }
        }

        info!(
            "event=host_bootstrap module=host status=ok registered={} failed={}",
            registry.len(),
            failures.len()
        );
        Host { registry, failures }
    }
}

/// Running host: an owned registry plus the bootstrap outcome.
pub struct Host {
    registry: Arc<ExtensionRegistry>,
    failures: Vec<BootstrapFailure>,
}

impl Host {
    pub fn builder(config: &HostConfig) -> HostBuilder {
        HostBuilder {
            loader: config.loader(),
            context: ContextBuilder::default(),
        }
    }

    /// Bootstraps with no builtins or extra collaborators.
    pub fn bootstrap(config: &HostConfig) -> Self {
        Self::builder(config).bootstrap()
    }

    pub fn registry(&self) -> &Arc<ExtensionRegistry> {
        &self.registry
    }

    pub fn failures(&self) -> &[BootstrapFailure] {
        &self.failures
    }

    /// Cleans up every registered extension.
    pub fn shutdown(&self) {
        info!(
            "event=host_shutdown module=host status=start active={}",
            self.registry.len()
        );
        self.registry.unregister_all();
    }
}

#[cfg(test)]
mod tests {
    use super::Host;
    use crate::config::HostConfig;
    use crate::extension::context::{Context, APP_VERSION_KEY};
    use crate::extension::contract::{CallArgs, Extension, ExtensionError, ExtensionInfo};
    use serde_json::Value;
    use std::fs;
    use std::sync::{Arc, Mutex};
    use tempfile::tempdir;

    struct Witness {
        seen: Arc<Mutex<Option<Arc<Context>>>>,
    }

    impl Extension for Witness {
        fn info(&self) -> ExtensionInfo {
            ExtensionInfo::new("witness")
        }

        fn initialize(&mut self, context: Arc<Context>) -> Result<(), ExtensionError> {
            *self.seen.lock().expect("lock") = Some(context);
            Ok(())
        }

        fn execute(&self, _call: &CallArgs) -> Result<Value, ExtensionError> {
            Ok(Value::Null)
        }
    }

    #[test]
    fn bootstrap_registers_builtins_and_discovered_units() {
        let dir = tempdir().expect("tempdir");
        fs::write(dir.path().join("tidy.yaml"), "steps: []\n").expect("write");
        fs::write(dir.path().join("broken.yaml"), "steps: [").expect("write");
        let config = HostConfig {
            extension_dirs: vec![dir.path().to_path_buf()],
            ..HostConfig::default()
        };

        let seen = Arc::new(Mutex::new(None));
        let ledger = Arc::new(Mutex::new(Vec::<String>::new()));
        let witness_seen = Arc::clone(&seen);
        let host = Host::builder(&config)
            .with_builtin("witness", move || {
                Box::new(Witness {
                    seen: Arc::clone(&witness_seen),
                })
            })
            .collaborator("greeting", "hello".to_string())
            .shared_collaborator("ledger", Arc::clone(&ledger))
            .bootstrap();

        assert_eq!(
            host.registry().names(),
            vec!["witness".to_string(), "workflow:tidy".to_string()]
        );
        assert_eq!(host.failures().len(), 1);
        assert_eq!(host.failures()[0].name, "workflow:broken");

        let context = seen.lock().expect("lock").clone().expect("initialized");
        assert!(context.registry().is_some());
        assert_eq!(
            context.get::<String>(APP_VERSION_KEY).as_deref().map(String::as_str),
            Some(crate::core_version())
        );
        assert!(context.contains("greeting"));
        let shared = context
            .get::<Mutex<Vec<String>>>("ledger")
            .expect("shared collaborator");
        shared.lock().expect("lock").push("seen".to_string());
        assert_eq!(*ledger.lock().expect("lock"), vec!["seen".to_string()]);

        host.shutdown();
        assert!(host.registry().is_empty());
    }
}
