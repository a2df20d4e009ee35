//! Logging extension.
//!
//! Built as a `cdylib` this is a native unit the host can load from an
//! extension directory; as an `rlib` the CLI registers it as a builtin.
//! Messages are forwarded to the host's `log` backend; a loaded unit writes
//! through the logger the host hands over at registration.

use log::{debug, error, info, warn, Level};
use plugflow_core::{CallArgs, Context, Extension, ExtensionError, ExtensionInfo, EXECUTE_METHOD};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const LOG_TARGET: &str = "plugflow_logger";
const DEFAULT_MESSAGE: &str = "no message given";

/// Methods callable through `plugin_call` steps besides `execute`.
pub const METHODS: [&str; 6] = [
    "log_message",
    "log_debug",
    "log_info",
    "log_warning",
    "log_error",
    "log_critical",
];

#[derive(Default)]
pub struct LoggerExtension {
    logged: AtomicU64,
    host_version: Option<String>,
}

impl LoggerExtension {
    /// Messages written since construction.
    pub fn logged(&self) -> u64 {
        self.logged.load(Ordering::Relaxed)
    }

    fn log_message(&self, message: &str, level: &str) -> bool {
        match parse_level(level) {
            Level::Trace | Level::Debug => debug!(target: LOG_TARGET, "{message}"),
            Level::Info => info!(target: LOG_TARGET, "{message}"),
            Level::Warn => warn!(target: LOG_TARGET, "{message}"),
            Level::Error => error!(target: LOG_TARGET, "{message}"),
        }
        self.logged.fetch_add(1, Ordering::Relaxed);
        true
    }
}

/// Unknown levels log at info.
fn parse_level(level: &str) -> Level {
    match level.trim().to_ascii_lowercase().as_str() {
        "debug" => Level::Debug,
        "warning" | "warn" => Level::Warn,
        "error" | "critical" => Level::Error,
        _ => Level::Info,
    }
}

fn message_arg(call: &CallArgs) -> String {
    match call.get("message", 0) {
        None | Some(Value::Null) => DEFAULT_MESSAGE.to_string(),
        Some(Value::String(message)) => message.clone(),
        Some(other) => other.to_string(),
    }
}

impl Extension for LoggerExtension {
    fn info(&self) -> ExtensionInfo {
        ExtensionInfo::new("LoggerExtension")
            .with_description("Writes messages to the host log")
            .with_version(env!("CARGO_PKG_VERSION"))
            .with_author("plugflow")
    }

    fn initialize(&mut self, context: Arc<Context>) -> Result<(), ExtensionError> {
        self.host_version = context
            .get::<String>(plugflow_core::APP_VERSION_KEY)
            .map(|version| version.as_ref().clone());
        info!(
            "event=extension_init module=logger status=ok host_version={}",
            self.host_version.as_deref().unwrap_or("unknown")
        );
        Ok(())
    }

    /// `execute(message = "no message given", level = "info")`.
    fn execute(&self, call: &CallArgs) -> Result<Value, ExtensionError> {
        let message = message_arg(call);
        let level = call.get_str("level", 1).unwrap_or("info");
        Ok(Value::Bool(self.log_message(&message, level)))
    }

    fn has_method(&self, method: &str) -> bool {
        method == EXECUTE_METHOD || METHODS.contains(&method)
    }

    fn call_method(&self, method: &str, call: &CallArgs) -> Result<Value, ExtensionError> {
        let level = match method {
            EXECUTE_METHOD | "log_message" => return self.execute(call),
            "log_debug" => "debug",
            "log_info" => "info",
            "log_warning" => "warning",
            "log_error" => "error",
            "log_critical" => "critical",
            _ => {
                return Err(ExtensionError::MethodNotFound {
                    extension: self.info().name,
                    method: method.to_string(),
                })
            }
        };
        let message = message_arg(call);
        Ok(Value::Bool(self.log_message(&message, level)))
    }

    fn cleanup(&self) -> Result<(), ExtensionError> {
        info!(
            "event=extension_cleanup module=logger status=ok logged={}",
            self.logged()
        );
        Ok(())
    }
}

plugflow_core::export_extensions!(LoggerExtension);
