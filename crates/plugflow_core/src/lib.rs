//! Extension host and workflow interpreter.
//!
//! Native units and declarative workflow documents are discovered in
//! configured directories, loaded behind one [`Extension`] contract, and
//! owned by an [`ExtensionRegistry`] that also carries the hook bus.

pub mod config;
pub mod extension;
pub mod host;
pub mod logging;
pub mod workflow;

pub use config::{ConfigError, HostConfig};
pub use extension::context::{Context, ContextBuilder, APP_VERSION_KEY};
pub use extension::contract::{CallArgs, Extension, ExtensionError, ExtensionInfo, EXECUTE_METHOD};
pub use extension::discovery::{discover, ExtensionId};
pub use extension::hook::{hook_callback, HookBus, HookCallback};
pub use extension::loader::{ExtensionLoader, LoadError};
pub use extension::native::{ExtensionRegistrar, NativeExtension, NativeLoadError};
pub use extension::registry::{ExtensionHandle, ExtensionRegistry, RegistryError};
pub use host::{BootstrapFailure, Host, HostBuilder};
pub use logging::{default_log_level, init_logging, init_stderr_logging, logging_status};
pub use workflow::condition::{evaluate_condition, ConditionError};
pub use workflow::document::{DocumentError, Step, StepKind, WorkflowDocument};
pub use workflow::extension::WorkflowExtension;
pub use workflow::interpreter::{ExecutionReport, StepError};
pub use workflow::WorkflowLimits;

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
