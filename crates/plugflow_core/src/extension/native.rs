//! Native extension units loaded from dynamic libraries.
//!
//! A unit exports two symbols, normally written by [`export_extensions!`]:
//! - `PLUGFLOW_ABI_VERSION: u32`, which must equal [`ABI_VERSION`].
//! - `plugflow_register_extensions(&mut ExtensionRegistrar)`, which registers
//!   the unit's extension types.
//!
//! Units must be built with the same compiler and `plugflow_core` version as
//! the host; the registration entry point uses the Rust ABI.
//!
//! A unit links its own copy of `log`. The registrar carries the host's
//! logger, and the exported entry point installs it in the unit before any
//! extension type is registered, so unit records reach the host's sinks.
//!
//! ```rust,ignore
//! #[derive(Default)]
//! struct Cleaner;
//! impl plugflow_core::Extension for Cleaner { /* ... */ }
//! plugflow_core::export_extensions!(Cleaner);
//! ```

use crate::extension::context::Context;
use crate::extension::contract::{CallArgs, Extension, ExtensionError, ExtensionInfo};
use libloading::{Library, Symbol};
use log::{LevelFilter, Log};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

/// Registration ABI version understood by this host.
pub const ABI_VERSION: u32 = 1;
/// Exported ABI version symbol.
pub const ABI_VERSION_SYMBOL: &[u8] = b"PLUGFLOW_ABI_VERSION";
/// Exported registration entry point symbol.
pub const REGISTER_SYMBOL: &[u8] = b"plugflow_register_extensions";

/// Signature of the registration entry point.
pub type RegisterFn = fn(&mut ExtensionRegistrar);

type Factory = Box<dyn Fn() -> Box<dyn Extension>>;

/// Collects the extension types a unit declares.
#[derive(Default)]
pub struct ExtensionRegistrar {
    factories: Vec<(&'static str, Factory)>,
    host_logger: Option<(&'static dyn Log, LevelFilter)>,
}

impl ExtensionRegistrar {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registrar carrying the calling process's active logger.
    pub fn for_host() -> Self {
        Self {
            factories: Vec::new(),
            host_logger: Some((log::logger(), log::max_level())),
        }
    }

    pub fn host_logger(&self) -> Option<(&'static dyn Log, LevelFilter)> {
        self.host_logger
    }

    /// Registers one extension type, constructed with `Default`.
    pub fn register<E: Extension + Default + 'static>(&mut self) {
        self.factories.push((
            std::any::type_name::<E>(),
            Box::new(|| Box::new(E::default()) as Box<dyn Extension>),
        ));
    }

    pub fn type_names(&self) -> Vec<&'static str> {
        self.factories.iter().map(|(name, _)| *name).collect()
    }

    /// Instantiates the single registered type.
    pub fn instantiate_single(&self) -> Result<Box<dyn Extension>, RegistrarError> {
        match self.factories.as_slice() {
            [] => Err(RegistrarError::NoExtensionType),
            [(_, factory)] => Ok(factory()),
            _ => Err(RegistrarError::AmbiguousExtensionType(self.type_names())),
        }
    }
}

/// Registrar content that does not identify exactly one extension type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistrarError {
    #[error("unit registers no extension type")]
    NoExtensionType,
    #[error("unit registers more than one extension type: {}", .0.join(", "))]
    AmbiguousExtensionType(Vec<&'static str>),
}

/// Failures while opening a native unit.
#[derive(Debug, thiserror::Error)]
pub enum NativeLoadError {
    #[error("failed to open library: {0}")]
    Library(#[from] libloading::Error),
    #[error("ABI version mismatch: host expects {expected}, unit declares {found}")]
    AbiMismatch { expected: u32, found: u32 },
    #[error(transparent)]
    Registrar(#[from] RegistrarError),
}

/// An extension instance together with the library that provides its code.
pub struct NativeExtension {
    // Field order matters: the instance must drop before its library.
    inner: Box<dyn Extension>,
    _library: Library,
}

impl NativeExtension {
    /// Opens `path`, checks the ABI, and instantiates the unit's single type.
    pub fn open(path: &Path) -> Result<Self, NativeLoadError> {
        // SAFETY: loading runs the unit's initializers; units are trusted code
        // placed in configured extension directories.
        let library = unsafe { Library::new(path)? };

        let inner = {
            // SAFETY: symbol types are fixed by the `export_extensions!` contract.
            let version: Symbol<*const u32> = unsafe { library.get(ABI_VERSION_SYMBOL)? };
            let found = unsafe { **version };
            if found != ABI_VERSION {
                return Err(NativeLoadError::AbiMismatch {
                    expected: ABI_VERSION,
                    found,
                });
            }

            let register: Symbol<RegisterFn> = unsafe { library.get(REGISTER_SYMBOL)? };
            let mut registrar = ExtensionRegistrar::for_host();
            register(&mut registrar);
            registrar.instantiate_single()?
        };

        Ok(Self {
            inner,
            _library: library,
        })
    }
}

impl Extension for NativeExtension {
    fn info(&self) -> ExtensionInfo {
        self.inner.info()
    }

    fn initialize(&mut self, context: Arc<Context>) -> Result<(), ExtensionError> {
        self.inner.initialize(context)
    }

    fn execute(&self, call: &CallArgs) -> Result<Value, ExtensionError> {
        self.inner.execute(call)
    }

    fn has_method(&self, method: &str) -> bool {
        self.inner.has_method(method)
    }

    fn call_method(&self, method: &str, call: &CallArgs) -> Result<Value, ExtensionError> {
        self.inner.call_method(method, call)
    }

    fn cleanup(&self) -> Result<(), ExtensionError> {
        self.inner.cleanup()
    }
}

/// Routes this copy of `log` to the registrar's host logger.
///
/// Runs inside a unit, where it sets the unit's own logger. In the host
/// process the logger is already set and only the level filter is refreshed.
#[doc(hidden)]
pub fn adopt_host_logger(registrar: &ExtensionRegistrar) {
    if let Some((logger, level)) = registrar.host_logger() {
        // Fails when this copy already has a logger, e.g. a reloaded unit.
        let _ = log::set_logger(logger);
        log::set_max_level(level);
    }
}

/// Exports the native registration symbols for the listed extension types.
#[macro_export]
macro_rules! export_extensions {
    ($($extension:ty),+ $(,)?) => {
        #[no_mangle]
        pub static PLUGFLOW_ABI_VERSION: u32 = $crate::extension::native::ABI_VERSION;

        #[no_mangle]
        pub fn plugflow_register_extensions(
            registrar: &mut $crate::extension::native::ExtensionRegistrar,
        ) {
            $crate::extension::native::adopt_host_logger(registrar);
            $( registrar.register::<$extension>(); )+
        }
    };
}
