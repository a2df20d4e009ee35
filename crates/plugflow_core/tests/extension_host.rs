use plugflow_core::{
    discover, hook_callback, CallArgs, Context, Extension, ExtensionError, ExtensionInfo,
    ExtensionLoader, ExtensionRegistry, Host, HostConfig, RegistryError,
};
use serde_json::{json, Value};
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tempfile::tempdir;

/// Subscribes to `file_organized` during initialize and relays calls to
/// another extension through the registry.
#[derive(Default)]
struct Relay {
    registry: Option<Weak<ExtensionRegistry>>,
}

impl Extension for Relay {
    fn info(&self) -> ExtensionInfo {
        ExtensionInfo::new("relay")
    }

    fn initialize(&mut self, context: Arc<Context>) -> Result<(), ExtensionError> {
        let registry = context
            .registry()
            .ok_or_else(|| ExtensionError::Initialization("no registry".to_string()))?;
        registry.register_hook(
            "file_organized",
            hook_callback(|call| Ok(json!({ "relay_saw": call.args }))),
        );
        self.registry = Some(Arc::downgrade(&registry));
        Ok(())
    }

    fn execute(&self, call: &CallArgs) -> Result<Value, ExtensionError> {
        let registry = self
            .registry
            .as_ref()
            .and_then(Weak::upgrade)
            .ok_or_else(|| ExtensionError::failed("registry dropped"))?;
        let target = call
            .get_str("target", 0)
            .ok_or_else(|| ExtensionError::InvalidArgument("target".to_string()))?;
        registry
            .execute(target, &CallArgs::new().arg("via relay"))
            .ok_or_else(|| ExtensionError::failed(format!("{target} failed")))
    }
}

struct Upper;

impl Extension for Upper {
    fn info(&self) -> ExtensionInfo {
        ExtensionInfo::new("upper")
    }

    fn execute(&self, call: &CallArgs) -> Result<Value, ExtensionError> {
        let text = call
            .get_str("text", 0)
            .ok_or_else(|| ExtensionError::InvalidArgument("text".to_string()))?;
        Ok(Value::String(text.to_uppercase()))
    }
}

fn registry() -> Arc<ExtensionRegistry> {
    let loader = ExtensionLoader::new(Vec::new())
        .with_builtin("relay", || Box::new(Relay::default()))
        .with_builtin("upper", || Box::new(Upper));
    let registry = ExtensionRegistry::new(loader);
    registry.set_context(Context::builder().registry(&registry).build());
    registry
}

#[test]
fn discovery_lists_natives_then_workflows_and_skips_reserved_files() {
    let dir = tempdir().expect("tempdir");
    for file in ["foo.so", "bar.yaml", "__init__.so", "__draft.yaml", "notes.txt"] {
        fs::write(dir.path().join(file), "").expect("write fixture");
    }
    fs::create_dir(dir.path().join("nested.yaml")).expect("dir fixture");

    let found = discover(&[dir.path().to_path_buf(), dir.path().join("missing")]);
    assert_eq!(found, vec!["foo".to_string(), "workflow:bar".to_string()]);
}

#[test]
fn extensions_call_each_other_through_the_registry() {
    let registry = registry();
    registry.register("upper").expect("register upper");
    registry.register("relay").expect("register relay");

    let value = registry.execute("relay", &CallArgs::new().kwarg("target", "upper"));
    assert_eq!(value, Some(json!("VIA RELAY")));
    assert_eq!(
        registry.execute("relay", &CallArgs::new().kwarg("target", "ghost")),
        None
    );
}

#[test]
fn hooks_fan_out_and_isolate_failures() {
    let registry = registry();
    registry.register("relay").expect("register relay");

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let counting = hook_callback(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(json!("counted"))
    });
    registry.register_hook("file_organized", hook_callback(|_| panic!("subscriber bug")));
    registry.register_hook(
        "file_organized",
        hook_callback(|_| Err(ExtensionError::failed("subscriber refused"))),
    );
    registry.register_hook("file_organized", Arc::clone(&counting));

    let results = registry.trigger_hook("file_organized", &CallArgs::new().arg("a.txt"));
    assert_eq!(
        results,
        vec![json!({ "relay_saw": ["a.txt"] }), json!("counted")]
    );
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    assert!(registry.unregister_hook("file_organized", &counting));
    assert!(!registry.unregister_hook("file_organized", &counting));
    assert_eq!(registry.hooks().subscriber_count("file_organized"), 3);
    assert!(registry.trigger_hook("never_registered", &CallArgs::new()).is_empty());
}

#[test]
fn relay_without_registry_in_context_fails_to_initialize() {
    let loader = ExtensionLoader::new(Vec::new()).with_builtin("relay", || Box::new(Relay::default()));
    let registry = ExtensionRegistry::new(loader);

    let err = registry.register("relay").expect_err("no registry in default context");
    assert!(matches!(err, RegistryError::Initialization { .. }));
    assert!(registry.is_empty());
}

#[test]
fn host_bootstrap_from_config_file_runs_workflows() {
    let dir = tempdir().expect("tempdir");
    let plugins = dir.path().join("plugins");
    fs::create_dir(&plugins).expect("plugins dir");
    fs::write(
        plugins.join("shout.yaml"),
        r#"
description: Uppercases a greeting
variables:
  greeting: hello
steps:
  - type: plugin_call
    plugin: upper
    args: [$greeting]
    output_var: loud
output: [loud]
"#,
    )
    .expect("write workflow");
    let config_path = dir.path().join("plugflow.yaml");
    fs::write(&config_path, "extension_dirs: [plugins]\n").expect("write config");

    let config = HostConfig::load(&config_path).expect("load config");
    let host = Host::builder(&config)
        .with_builtin("upper", || Box::new(Upper))
        .bootstrap();
    assert!(host.failures().is_empty());

    let result = host
        .registry()
        .execute("workflow:shout", &CallArgs::new().kwarg("greeting", "hi there"))
        .expect("workflow result");
    assert_eq!(result["output"]["loud"], json!("HI THERE"));
    assert_eq!(
        host.registry()
            .get("workflow:shout")
            .expect("registered")
            .info()
            .description,
        "Uppercases a greeting"
    );

    host.shutdown();
    assert!(host.registry().is_empty());
}
