//! Capability contract every extension implements.
//!
//! # Responsibility
//! - Define the lifecycle surface (`initialize` -> `execute`* -> `cleanup`).
//! - Define the call envelope shared by extensions, hooks, and workflows.
//!
//! # Invariants
//! - `initialize` is called exactly once before any `execute`/`cleanup`.
//! - `cleanup` is called exactly once, after which the instance is dropped.

use crate::extension::context::Context;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Method name dispatched to [`Extension::execute`].
pub const EXECUTE_METHOD: &str = "execute";

/// Free-form descriptive metadata reported by an extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionInfo {
    pub name: String,
    pub description: String,
    pub version: String,
    pub author: String,
}

impl ExtensionInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: "no description available".to_string(),
            version: "0.1.0".to_string(),
            author: "unknown".to_string(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }
}

/// Positional and keyword arguments of one call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallArgs {
    pub args: Vec<Value>,
    pub kwargs: Map<String, Value>,
}

impl CallArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.insert(name.into(), value.into());
        self
    }

    /// Returns a keyword argument, falling back to the positional slot.
    pub fn get(&self, name: &str, position: usize) -> Option<&Value> {
        self.kwargs.get(name).or_else(|| self.args.get(position))
    }

    /// String form of [`CallArgs::get`]; non-string values are rejected.
    pub fn get_str(&self, name: &str, position: usize) -> Option<&str> {
        self.get(name, position).and_then(Value::as_str)
    }
}

/// Errors raised by extension code across the capability contract.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExtensionError {
    #[error("initialization failed: {0}")]
    Initialization(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("method `{method}` is not exposed by extension `{extension}`")]
    MethodNotFound { extension: String, method: String },
    #[error("extension panicked: {0}")]
    Panicked(String),
    #[error("{0}")]
    Failed(String),
}

impl ExtensionError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Contract implemented by native and declarative extensions.
pub trait Extension: Send + Sync {
    /// Descriptive metadata; `name` is informational, the registry keys by id.
    fn info(&self) -> ExtensionInfo;

    /// Receives the shared host context. Called once, before anything else.
    fn initialize(&mut self, context: Arc<Context>) -> Result<(), ExtensionError> {
        let _ = context;
        Ok(())
    }

    /// Main entry point.
    fn execute(&self, call: &CallArgs) -> Result<Value, ExtensionError>;

    /// Whether `method` can be dispatched through [`Extension::call_method`].
    fn has_method(&self, method: &str) -> bool {
        method == EXECUTE_METHOD
    }

    /// Dispatches a named method. Extensions exposing extra methods override
    /// this together with [`Extension::has_method`].
    fn call_method(&self, method: &str, call: &CallArgs) -> Result<Value, ExtensionError> {
        if method == EXECUTE_METHOD {
            return self.execute(call);
        }
        Err(ExtensionError::MethodNotFound {
            extension: self.info().name,
            method: method.to_string(),
        })
    }

    /// Releases resources. Failure is reported but never blocks removal.
    fn cleanup(&self) -> Result<(), ExtensionError> {
        Ok(())
    }
}
