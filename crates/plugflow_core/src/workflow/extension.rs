//! Workflow documents exposed through the extension contract.
//!
//! # Invariants
//! - Every `execute` starts from a fresh copy of the document's variables;
//!   runs never observe each other's bindings.
//! - Workflow-in-workflow nesting on one thread is bounded by
//!   [`WorkflowLimits::max_call_depth`].

use crate::extension::context::Context;
use crate::extension::contract::{CallArgs, Extension, ExtensionError, ExtensionInfo};
use crate::workflow::document::WorkflowDocument;
use crate::workflow::environment::Environment;
use crate::workflow::interpreter::{ExecutionReport, Interpreter};
use crate::workflow::WorkflowLimits;
use log::debug;
use serde_json::Value;
use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::sync::Arc;

thread_local! {
    static CALL_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Holds one level of workflow nesting until dropped.
struct DepthGuard;

impl DepthGuard {
    fn enter(max_depth: usize) -> Result<Self, ExtensionError> {
        CALL_DEPTH.with(|depth| {
            if depth.get() >= max_depth {
                return Err(ExtensionError::failed(format!(
                    "workflow call depth limit of {max_depth} exceeded"
                )));
            }
            depth.set(depth.get() + 1);
            Ok(Self)
        })
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        CALL_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

pub struct WorkflowExtension {
    name: String,
    document: WorkflowDocument,
    path: PathBuf,
    limits: WorkflowLimits,
    context: Option<Arc<Context>>,
}

impl WorkflowExtension {
    pub fn new(
        name: impl Into<String>,
        document: WorkflowDocument,
        path: impl Into<PathBuf>,
        limits: WorkflowLimits,
    ) -> Self {
        Self {
            name: name.into(),
            document,
            path: path.into(),
            limits,
            context: None,
        }
    }

    pub fn document(&self) -> &WorkflowDocument {
        &self.document
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Runs the workflow and returns the typed report.
    ///
    /// Keyword arguments overlay the document's variables for this run only.
    /// Positional arguments are accepted and ignored.
    pub fn run(&self, call: &CallArgs) -> Result<ExecutionReport, ExtensionError> {
        let _depth = DepthGuard::enter(self.limits.max_call_depth)?;

        if !call.args.is_empty() {
            debug!(
                "event=workflow_execute module=workflow status=ignored workflow={} positional_args={}",
                self.name,
                call.args.len()
            );
        }

        let mut env = Environment::new(self.document.variables.clone());
        env.extend(&call.kwargs);

        let interpreter = Interpreter::new(self.context.as_deref(), &self.limits);
        Ok(interpreter.run(&self.name, &self.document, env))
    }
}

impl Extension for WorkflowExtension {
    fn info(&self) -> ExtensionInfo {
        let mut info = ExtensionInfo::new(self.name.clone())
            .with_description(format!("workflow: {}", self.name));
        if let Some(description) = &self.document.description {
            info = info.with_description(description.clone());
        }
        if let Some(version) = &self.document.version {
            info = info.with_version(version.clone());
        }
        if let Some(author) = &self.document.author {
            info = info.with_author(author.clone());
        }
        info
    }

    fn initialize(&mut self, context: Arc<Context>) -> Result<(), ExtensionError> {
        self.context = Some(context);
        Ok(())
    }

    /// Returns the serialized [`ExecutionReport`].
    fn execute(&self, call: &CallArgs) -> Result<Value, ExtensionError> {
        let report = self.run(call)?;
        serde_json::to_value(report).map_err(|err| ExtensionError::failed(err.to_string()))
    }

    fn cleanup(&self) -> Result<(), ExtensionError> {
        debug!(
            "event=workflow_cleanup module=workflow status=ok workflow={}",
            self.name
        );
        Ok(())
    }
}
