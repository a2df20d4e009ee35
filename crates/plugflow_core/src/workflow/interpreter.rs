//! Step dispatcher for workflow runs.
//!
//! # Responsibility
//! - Execute a step tree in order against one run's [`Environment`].
//! - Accumulate the [`ExecutionReport`] returned to callers.
//!
//! # Invariants
//! - Top level, condition branches, and loop bodies share one dispatcher.
//! - A failing step without `continue_on_error` sets `success = false` and
//!   unwinds every enclosing block up to the top.
//! - `steps_executed` counts successful steps only. A container counts once,
//!   after its body completes without aborting.
//! - The step budget is never bypassed by `continue_on_error`.

use crate::extension::context::Context;
use crate::extension::contract::{CallArgs, ExtensionError, EXECUTE_METHOD};
use crate::extension::panic_message;
use crate::workflow::condition::evaluate_condition;
use crate::workflow::document::{
    ConditionStep, FileOperation, LoopStep, PluginCall, Step, StepKind, WorkflowDocument,
};
use crate::workflow::environment::Environment;
use crate::workflow::file_ops;
use crate::workflow::WorkflowLimits;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use uuid::Uuid;

/// Result record of one workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub success: bool,
    pub steps_executed: u64,
    pub errors: Vec<String>,
    pub output: Map<String, Value>,
}

impl Default for ExecutionReport {
    fn default() -> Self {
        Self {
            success: true,
            steps_executed: 0,
            errors: Vec::new(),
            output: Map::new(),
        }
    }
}

/// Failure of a single step handler.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("missing required operand `{0}`")]
    MissingOperand(&'static str),
    #[error("operand `{name}` must be a string path, got {found}")]
    InvalidOperand { name: &'static str, found: String },
    #[error("unsupported file operation `{0}`")]
    UnsupportedOperation(String),
    #[error("unsupported loop type `{0}`")]
    UnsupportedLoop(String),
    #[error("{operation} failed: {source}")]
    Io {
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("plugin_call step has no target extension")]
    MissingTarget,
    #[error("no extension registry available in context")]
    RegistryUnavailable,
    #[error("extension `{0}` is not registered")]
    ExtensionNotFound(String),
    #[error("extension `{extension}` does not expose method `{method}`")]
    MethodNotFound { extension: String, method: String },
    #[error("extension `{extension}` failed: {source}")]
    Extension {
        extension: String,
        #[source]
        source: ExtensionError,
    },
    #[error("loop items must be a list, got {0}")]
    NotIterable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Abort,
}

/// Runs workflow documents with a shared context and bounds.
pub struct Interpreter<'a> {
    context: Option<&'a Context>,
    limits: &'a WorkflowLimits,
}

impl<'a> Interpreter<'a> {
    pub fn new(context: Option<&'a Context>, limits: &'a WorkflowLimits) -> Self {
        Self { context, limits }
    }

    /// Executes `document` starting from `env` and assembles its outputs.
    pub fn run(
        &self,
        workflow: &str,
        document: &WorkflowDocument,
        env: Environment,
    ) -> ExecutionReport {
        let run_id = Uuid::new_v4();
        info!(
            "event=workflow_run module=workflow status=start workflow={workflow} run_id={run_id} steps={}",
            document.steps.len()
        );

        let mut run = Run {
            context: self.context,
            limits: self.limits,
            run_id,
            env,
            report: ExecutionReport::default(),
            dispatched: 0,
        };
        run.steps(&document.steps);

        for name in &document.output {
            if let Some(value) = run.env.get(name) {
                run.report.output.insert(name.clone(), value.clone());
            }
        }

        let report = run.report;
        info!(
            "event=workflow_run module=workflow status={} workflow={workflow} run_id={run_id} steps_executed={} errors={}",
            if report.success { "ok" } else { "error" },
            report.steps_executed,
            report.errors.len()
        );
        report
    }
}

struct Run<'a> {
    context: Option<&'a Context>,
    limits: &'a WorkflowLimits,
    run_id: Uuid,
    env: Environment,
    report: ExecutionReport,
    dispatched: u64,
}

impl Run<'_> {
    fn steps(&mut self, steps: &[Step]) -> Flow {
        for (index, step) in steps.iter().enumerate() {
            if self.step(index, step) == Flow::Abort {
                return Flow::Abort;
            }
        }
        Flow::Continue
    }

    fn step(&mut self, index: usize, step: &Step) -> Flow {
        let label = step.label(index);

        self.dispatched += 1;
        if self.dispatched > self.limits.max_steps {
            warn!(
                "event=workflow_step module=workflow status=error reason=step_limit run_id={} step={label}",
                self.run_id
            );
            self.report.errors.push(format!(
                "step '{label}' not run: step limit of {} exceeded",
                self.limits.max_steps
            ));
            self.report.success = false;
            return Flow::Abort;
        }

        let outcome = match &step.kind {
            StepKind::FileOperation(operation) => self.file_operation(operation),
            StepKind::PluginCall(call) => self.plugin_call(call),
            StepKind::Condition(condition) => Ok(self.condition(condition)),
            StepKind::Loop(LoopStep::ForEach {
                items,
                item_var,
                body,
            }) => self.for_each(items, item_var, body),
            StepKind::Loop(LoopStep::While {
                condition,
                max_iterations,
                body,
            }) => Ok(self.while_loop(&label, condition, *max_iterations, body)),
            StepKind::Loop(LoopStep::Unsupported(kind)) => {
                Err(StepError::UnsupportedLoop(kind.clone()))
            }
            StepKind::Unknown(kind) => {
                warn!(
                    "event=workflow_step module=workflow status=skipped reason=unknown_type run_id={} step={label} type={kind}",
                    self.run_id
                );
                self.report
                    .errors
                    .push(format!("step '{label}' has unknown type '{kind}'"));
                return Flow::Continue;
            }
        };

        match outcome {
            Ok(Flow::Continue) => {
                self.report.steps_executed += 1;
                debug!(
                    "event=workflow_step module=workflow status=ok run_id={} step={label}",
                    self.run_id
                );
                Flow::Continue
            }
            Ok(Flow::Abort) => Flow::Abort,
            Err(err) => {
                warn!(
                    "event=workflow_step module=workflow status=error run_id={} step={label} continue_on_error={} error={err}",
                    self.run_id, step.continue_on_error
                );
                self.report
                    .errors
                    .push(format!("step '{label}' failed: {err}"));
                if step.continue_on_error {
                    Flow::Continue
                } else {
                    self.report.success = false;
                    Flow::Abort
                }
            }
        }
    }

    fn file_operation(&mut self, operation: &FileOperation) -> Result<Flow, StepError> {
        match operation {
            FileOperation::Copy { source, target } => {
                let source = self.path_operand("source", source)?;
                let target = self.path_operand("target", target)?;
                file_ops::copy(&source, &target).map_err(|source| StepError::Io {
                    operation: "copy",
                    source,
                })?;
            }
            FileOperation::Move { source, target } => {
                let source = self.path_operand("source", source)?;
                let target = self.path_operand("target", target)?;
                file_ops::move_path(&source, &target).map_err(|source| StepError::Io {
                    operation: "move",
                    source,
                })?;
            }
            FileOperation::Delete { path } => {
                let path = self.path_operand("path", path)?;
                file_ops::delete(&path).map_err(|source| StepError::Io {
                    operation: "delete",
                    source,
                })?;
            }
            FileOperation::CreateDir { path } => {
                let path = self.path_operand("path", path)?;
                file_ops::create_dir(&path).map_err(|source| StepError::Io {
                    operation: "create_dir",
                    source,
                })?;
            }
            FileOperation::Unsupported(kind) => {
                return Err(StepError::UnsupportedOperation(kind.clone()))
            }
        }
        Ok(Flow::Continue)
    }

    fn path_operand(&self, name: &'static str, value: &Value) -> Result<PathBuf, StepError> {
        match self.env.resolve(value) {
            Value::String(path) if !path.is_empty() => Ok(PathBuf::from(path)),
            Value::String(_) | Value::Null => Err(StepError::MissingOperand(name)),
            other => Err(StepError::InvalidOperand {
                name,
                found: other.to_string(),
            }),
        }
    }

    fn plugin_call(&mut self, call: &PluginCall) -> Result<Flow, StepError> {
        if call.plugin.is_empty() {
            return Err(StepError::MissingTarget);
        }
        let registry = self
            .context
            .and_then(Context::registry)
            .ok_or(StepError::RegistryUnavailable)?;
        let extension = registry
            .get(&call.plugin)
            .ok_or_else(|| StepError::ExtensionNotFound(call.plugin.clone()))?;
        if call.method != EXECUTE_METHOD && !extension.has_method(&call.method) {
            return Err(StepError::MethodNotFound {
                extension: call.plugin.clone(),
                method: call.method.clone(),
            });
        }

        let arguments = CallArgs {
            args: self.env.resolve_all(&call.args),
            kwargs: self.env.resolve_map(&call.kwargs),
        };
        debug!(
            "event=plugin_call module=workflow status=start run_id={} extension={} method={}",
            self.run_id, call.plugin, call.method
        );
        let value = match catch_unwind(AssertUnwindSafe(|| {
            extension.call_method(&call.method, &arguments)
        })) {
            Ok(result) => result,
            Err(payload) => Err(ExtensionError::Panicked(panic_message(payload.as_ref()))),
        }
        .map_err(|source| StepError::Extension {
            extension: call.plugin.clone(),
            source,
        })?;

        if let Some(output_var) = &call.output_var {
            self.env.set(output_var.clone(), value);
        }
        Ok(Flow::Continue)
    }

    fn condition(&mut self, step: &ConditionStep) -> Flow {
        let branch = if evaluate_condition(&step.condition, &self.env) {
            &step.if_steps
        } else {
            &step.else_steps
        };
        self.steps(branch)
    }

    fn for_each(
        &mut self,
        items: &Value,
        item_var: &str,
        body: &[Step],
    ) -> Result<Flow, StepError> {
        let items = match self.env.resolve(items) {
            Value::Array(items) => items,
            other => return Err(StepError::NotIterable(other.to_string())),
        };
        for item in items {
            self.env.set(item_var, item);
            if self.steps(body) == Flow::Abort {
                return Ok(Flow::Abort);
            }
        }
        Ok(Flow::Continue)
    }

    fn while_loop(
        &mut self,
        label: &str,
        condition: &str,
        max_iterations: u32,
        body: &[Step],
    ) -> Flow {
        for _ in 0..max_iterations {
            if !evaluate_condition(condition, &self.env) {
                return Flow::Continue;
            }
            if self.steps(body) == Flow::Abort {
                return Flow::Abort;
            }
        }
        if max_iterations > 0 && evaluate_condition(condition, &self.env) {
            info!(
                "event=workflow_loop module=workflow status=bounded run_id={} step={label} max_iterations={max_iterations}",
                self.run_id
            );
        }
        Flow::Continue
    }
}
