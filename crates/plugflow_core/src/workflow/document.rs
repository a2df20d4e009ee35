//! Workflow document declaration and validation.
//!
//! # Responsibility
//! - Parse YAML/JSON workflow documents into a typed step tree.
//! - Reject documents whose variable bindings could never be referenced.
//!
//! # Invariants
//! - Parsed documents are immutable; every run copies `variables`.
//! - An unrecognized step `type` is kept as [`StepKind::Unknown`] so the
//!   interpreter can report it at run time instead of failing the load.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));

/// Default `for_each` binding name.
pub const DEFAULT_ITEM_VAR: &str = "item";
/// Default `while` iteration bound.
pub const DEFAULT_MAX_ITERATIONS: u32 = 100;

pub fn is_identifier(value: &str) -> bool {
    IDENTIFIER_RE.is_match(value)
}

/// Parsed declarative workflow.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct WorkflowDocument {
    /// Display title. The extension name always comes from the file stem.
    #[serde(rename = "name")]
    pub title: Option<String>,
    pub description: Option<String>,
    pub version: Option<String>,
    pub author: Option<String>,
    pub variables: Map<String, Value>,
    pub steps: Vec<Step>,
    pub output: Vec<String>,
}

impl WorkflowDocument {
    pub fn from_yaml(source: &str) -> Result<Self, DocumentError> {
        if source.trim().is_empty() {
            return Err(DocumentError::Empty);
        }
        let document: Self = serde_yaml::from_str(source)?;
        document.validate()?;
        Ok(document)
    }

    pub fn from_json(source: &str) -> Result<Self, DocumentError> {
        if source.trim().is_empty() {
            return Err(DocumentError::Empty);
        }
        let document: Self = serde_json::from_str(source)?;
        document.validate()?;
        Ok(document)
    }

    /// Validates binding names across the whole step tree.
    pub fn validate(&self) -> Result<(), DocumentError> {
        validate_steps(&self.steps)
    }
}

fn validate_steps(steps: &[Step]) -> Result<(), DocumentError> {
    for (index, step) in steps.iter().enumerate() {
        match &step.kind {
            StepKind::PluginCall(call) => {
                if let Some(output_var) = &call.output_var {
                    require_identifier(step, index, "output_var", output_var)?;
                }
            }
            StepKind::Condition(condition) => {
                validate_steps(&condition.if_steps)?;
                validate_steps(&condition.else_steps)?;
            }
            StepKind::Loop(LoopStep::ForEach { item_var, body, .. }) => {
                require_identifier(step, index, "item_var", item_var)?;
                validate_steps(body)?;
            }
            StepKind::Loop(LoopStep::While { body, .. }) => validate_steps(body)?,
            StepKind::Loop(LoopStep::Unsupported(_))
            | StepKind::FileOperation(_)
            | StepKind::Unknown(_) => {}
        }
    }
    Ok(())
}

fn require_identifier(
    step: &Step,
    index: usize,
    field: &'static str,
    value: &str,
) -> Result<(), DocumentError> {
    if is_identifier(value) {
        return Ok(());
    }
    Err(DocumentError::InvalidVariableName {
        step: step.label(index),
        field,
        value: value.to_string(),
    })
}

/// One unit of workflow behavior.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "RawStep")]
pub struct Step {
    pub name: Option<String>,
    pub continue_on_error: bool,
    pub kind: StepKind,
}

impl Step {
    /// Step name, or a 1-based positional label within its block.
    pub fn label(&self, index: usize) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("step {}", index + 1),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StepKind {
    FileOperation(FileOperation),
    PluginCall(PluginCall),
    Condition(ConditionStep),
    Loop(LoopStep),
    /// Declared `type` is missing or not recognized.
    Unknown(String),
}

/// Operands stay unresolved until run time; a missing operand is `""`.
#[derive(Debug, Clone, PartialEq)]
pub enum FileOperation {
    Copy { source: Value, target: Value },
    Move { source: Value, target: Value },
    Delete { path: Value },
    CreateDir { path: Value },
    Unsupported(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PluginCall {
    pub plugin: String,
    pub method: String,
    pub args: Vec<Value>,
    pub kwargs: Map<String, Value>,
    pub output_var: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConditionStep {
    pub condition: String,
    pub if_steps: Vec<Step>,
    pub else_steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoopStep {
    ForEach {
        items: Value,
        item_var: String,
        body: Vec<Step>,
    },
    While {
        condition: String,
        max_iterations: u32,
        body: Vec<Step>,
    },
    Unsupported(String),
}

/// Flat wire form of a step; every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawStep {
    name: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    continue_on_error: bool,
    operation: Option<String>,
    source: Option<Value>,
    target: Option<Value>,
    path: Option<Value>,
    plugin: Option<String>,
    method: Option<String>,
    args: Vec<Value>,
    kwargs: Map<String, Value>,
    output_var: Option<String>,
    condition: Option<String>,
    if_steps: Vec<Step>,
    else_steps: Vec<Step>,
    loop_type: Option<String>,
    items: Option<Value>,
    item_var: Option<String>,
    max_iterations: Option<u32>,
    steps: Vec<Step>,
}

fn operand(value: Option<Value>) -> Value {
    value.unwrap_or_else(|| Value::String(String::new()))
}

impl From<RawStep> for Step {
    fn from(raw: RawStep) -> Self {
        let kind = match raw.kind.as_deref().unwrap_or("unknown") {
            "file_operation" => {
                StepKind::FileOperation(match raw.operation.as_deref().unwrap_or("unknown") {
                    "copy" => FileOperation::Copy {
                        source: operand(raw.source),
                        target: operand(raw.target),
                    },
                    "move" => FileOperation::Move {
                        source: operand(raw.source),
                        target: operand(raw.target),
                    },
                    "delete" => FileOperation::Delete {
                        path: operand(raw.path),
                    },
                    "create_dir" => FileOperation::CreateDir {
                        path: operand(raw.path),
                    },
                    other => FileOperation::Unsupported(other.to_string()),
                })
            }
            "plugin_call" => StepKind::PluginCall(PluginCall {
                plugin: raw.plugin.unwrap_or_default(),
                method: raw
                    .method
                    .unwrap_or_else(|| crate::extension::contract::EXECUTE_METHOD.to_string()),
                args: raw.args,
                kwargs: raw.kwargs,
                output_var: raw.output_var.filter(|name| !name.is_empty()),
            }),
            "condition" => StepKind::Condition(ConditionStep {
                condition: raw.condition.unwrap_or_default(),
                if_steps: raw.if_steps,
                else_steps: raw.else_steps,
            }),
            "loop" => StepKind::Loop(match raw.loop_type.as_deref().unwrap_or("unknown") {
                "for_each" => LoopStep::ForEach {
                    items: raw.items.unwrap_or_else(|| Value::Array(Vec::new())),
                    item_var: raw
                        .item_var
                        .unwrap_or_else(|| DEFAULT_ITEM_VAR.to_string()),
                    body: raw.steps,
                },
                "while" => LoopStep::While {
                    condition: raw.condition.unwrap_or_default(),
                    max_iterations: raw.max_iterations.unwrap_or(DEFAULT_MAX_ITERATIONS),
                    body: raw.steps,
                },
                other => LoopStep::Unsupported(other.to_string()),
            }),
            other => StepKind::Unknown(other.to_string()),
        };

        Self {
            name: raw.name,
            continue_on_error: raw.continue_on_error,
            kind,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("workflow document is empty")]
    Empty,
    #[error("malformed YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("step `{step}` has invalid {field} `{value}` (expected an identifier)")]
    InvalidVariableName {
        step: String,
        field: &'static str,
        value: String,
    },
}
