//! Declarative workflow extensions.
//!
//! A workflow is a YAML or JSON document whose steps are interpreted against
//! a per-run variable environment. Loaded workflows are ordinary extensions
//! and may call each other through the registry.

pub mod condition;
pub mod document;
pub mod environment;
pub mod extension;
pub mod file_ops;
pub mod interpreter;

use serde::{Deserialize, Serialize};

/// Resource bounds applied to every workflow run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowLimits {
    /// Step executions allowed in one run, nested steps included.
    pub max_steps: u64,
    /// Workflow-in-workflow nesting allowed on one thread.
    pub max_call_depth: usize,
}

impl Default for WorkflowLimits {
    fn default() -> Self {
        Self {
            max_steps: 10_000,
            max_call_depth: 16,
        }
    }
}
