use plugflow_core::{
    CallArgs, Context, Extension, ExtensionError, ExtensionInfo, ExtensionLoader,
    ExtensionRegistry, WorkflowLimits, APP_VERSION_KEY,
};
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

struct Echo;

impl Extension for Echo {
    fn info(&self) -> ExtensionInfo {
        ExtensionInfo::new("echo")
    }

    fn execute(&self, call: &CallArgs) -> Result<Value, ExtensionError> {
        Ok(json!({ "args": call.args, "kwargs": call.kwargs }))
    }
}

fn host(dir: &Path, limits: WorkflowLimits) -> Arc<ExtensionRegistry> {
    let loader = ExtensionLoader::new(vec![dir.to_path_buf()])
        .with_limits(limits)
        .with_builtin("echo", || Box::new(Echo));
    let registry = ExtensionRegistry::new(loader);
    registry.set_context(
        Context::builder()
            .registry(&registry)
            .insert(APP_VERSION_KEY, "test".to_string())
            .build(),
    );
    registry.register("echo").expect("register echo");
    registry
}

fn write(dir: &Path, file: &str, body: &str) {
    fs::write(dir.join(file), body).expect("write workflow");
}

#[test]
fn plugin_call_captures_output() {
    let dir = tempdir().expect("tempdir");
    write(
        dir.path(),
        "capture.yaml",
        r#"
name: Capture
steps:
  - name: call echo
    type: plugin_call
    plugin: echo
    args: ["a"]
    kwargs: {n: 1}
    output_var: r
output: [r]
"#,
    );
    let registry = host(dir.path(), WorkflowLimits::default());
    registry.register("workflow:capture").expect("register workflow");

    let result = registry
        .execute("workflow:capture", &CallArgs::new())
        .expect("workflow result");
    assert_eq!(
        result,
        json!({
            "success": true,
            "steps_executed": 1,
            "errors": [],
            "output": { "r": { "args": ["a"], "kwargs": { "n": 1 } } }
        })
    );
}

#[test]
fn failed_copy_aborts_remaining_steps() {
    let dir = tempdir().expect("tempdir");
    let missing = dir.path().join("missing.txt");
    let marker = dir.path().join("marker");
    write(
        dir.path(),
        "copy.yaml",
        &format!(
            "steps:\n  - name: copy missing\n    type: file_operation\n    operation: copy\n    source: {}\n    target: {}\n  - name: mark\n    type: file_operation\n    operation: create_dir\n    path: {}\n",
            missing.display(),
            dir.path().join("copy.txt").display(),
            marker.display()
        ),
    );
    let registry = host(dir.path(), WorkflowLimits::default());
    registry.register("workflow:copy").expect("register workflow");

    let result = registry
        .execute("workflow:copy", &CallArgs::new())
        .expect("workflow result");
    assert_eq!(result["success"], json!(false));
    assert_eq!(result["steps_executed"], json!(0));
    let errors = result["errors"].as_array().expect("errors list");
    assert_eq!(errors.len(), 1);
    assert!(errors[0]
        .as_str()
        .is_some_and(|message| message.contains("copy missing")));
    assert!(!marker.exists());
}

#[test]
fn while_loop_runs_body_at_most_max_iterations() {
    let dir = tempdir().expect("tempdir");
    let out = dir.path().join("out");
    write(
        dir.path(),
        "spin.yaml",
        &format!(
            r#"
variables:
  names: []
steps:
  - type: loop
    loop_type: while
    condition: "true"
    max_iterations: 3
    steps:
      - type: plugin_call
        plugin: echo
        args: [$names]
        output_var: last
      - type: file_operation
        operation: create_dir
        path: {}
output: [last]
"#,
            out.display()
        ),
    );
    let registry = host(dir.path(), WorkflowLimits::default());
    registry.register("workflow:spin").expect("register workflow");

    let result = registry
        .execute("workflow:spin", &CallArgs::new())
        .expect("workflow result");
    assert_eq!(result["success"], json!(true));
    // Two body steps per iteration plus the loop step.
    assert_eq!(result["steps_executed"], json!(7));
    assert!(out.is_dir());
}

#[test]
fn environments_do_not_leak_between_calls() {
    let dir = tempdir().expect("tempdir");
    write(
        dir.path(),
        "counter.yaml",
        r#"
variables:
  seen: initial
steps:
  - type: condition
    condition: "$seen == 'initial'"
    if_steps:
      - type: plugin_call
        plugin: echo
        args: [first]
        output_var: seen
    else_steps:
      - type: plugin_call
        plugin: echo
        args: [override]
        output_var: seen
output: [seen]
"#,
    );
    let registry = host(dir.path(), WorkflowLimits::default());
    registry.register("workflow:counter").expect("register workflow");

    let first = registry
        .execute("workflow:counter", &CallArgs::new())
        .expect("first run");
    let second = registry
        .execute("workflow:counter", &CallArgs::new())
        .expect("second run");
    assert_eq!(first, second);
    assert_eq!(first["output"]["seen"]["args"], json!(["first"]));

    let overridden = registry
        .execute("workflow:counter", &CallArgs::new().kwarg("seen", "caller"))
        .expect("kwargs run");
    assert_eq!(overridden["output"]["seen"]["args"], json!(["override"]));
}

#[test]
fn unresolved_references_pass_through_literally() {
    let dir = tempdir().expect("tempdir");
    write(
        dir.path(),
        "refs.json",
        r#"{
  "variables": {"x": 42},
  "steps": [
    {"type": "plugin_call", "plugin": "echo", "args": ["$x", "$y", "x"], "output_var": "r"}
  ],
  "output": ["r", "absent"]
}"#,
    );
    let registry = host(dir.path(), WorkflowLimits::default());
    registry.register("workflow:refs").expect("register workflow");

    let result = registry
        .execute("workflow:refs", &CallArgs::new())
        .expect("workflow result");
    assert_eq!(result["output"]["r"]["args"], json!([42, "$y", "x"]));
    assert!(result["output"].get("absent").is_none());
}

#[test]
fn workflows_call_workflows_up_to_the_depth_limit() {
    let dir = tempdir().expect("tempdir");
    write(
        dir.path(),
        "recurse.yaml",
        r#"
steps:
  - name: again
    type: plugin_call
    plugin: workflow:recurse
    output_var: inner
output: [inner]
"#,
    );
    let limits = WorkflowLimits {
        max_call_depth: 3,
        ..WorkflowLimits::default()
    };
    let registry = host(dir.path(), limits);
    registry.register("workflow:recurse").expect("register workflow");

    let result = registry
        .execute("workflow:recurse", &CallArgs::new())
        .expect("workflow result");
    assert_eq!(result["success"], json!(true));
    assert_eq!(result["output"]["inner"]["success"], json!(true));

    let deepest = &result["output"]["inner"]["output"]["inner"];
    assert_eq!(deepest["success"], json!(false));
    assert!(deepest["errors"][0]
        .as_str()
        .is_some_and(|message| message.contains("depth limit of 3")));
}

#[test]
fn for_each_binds_items_and_calls_named_methods() {
    let dir = tempdir().expect("tempdir");
    let base = dir.path().join("made");
    write(
        dir.path(),
        "each.yaml",
        &format!(
            r#"
variables:
  dirs: ["{0}/a", "{0}/b"]
steps:
  - type: loop
    loop_type: for_each
    items: $dirs
    item_var: target
    steps:
      - type: file_operation
        operation: create_dir
        path: $target
  - name: wrong method
    type: plugin_call
    plugin: echo
    method: shout
output: [target]
"#,
            base.display()
        ),
    );
    let registry = host(dir.path(), WorkflowLimits::default());
    registry.register("workflow:each").expect("register workflow");

    let result = registry
        .execute("workflow:each", &CallArgs::new())
        .expect("workflow result");
    assert!(base.join("a").is_dir());
    assert!(base.join("b").is_dir());
    assert_eq!(result["steps_executed"], json!(3));
    assert_eq!(result["success"], json!(false));
    assert_eq!(
        result["output"]["target"],
        json!(format!("{}/b", base.display()))
    );
}
