//! Resolves identifiers to constructed, not-yet-initialized extensions.
//!
//! # Invariants
//! - Loading never touches registry state; it either returns an instance or
//!   a descriptive [`LoadError`].
//! - The first configured directory containing a matching file wins.

use crate::extension::contract::Extension;
use crate::extension::discovery::{self, ExtensionId, NATIVE_EXTENSIONS, WORKFLOW_EXTENSIONS};
use crate::extension::native::{NativeExtension, NativeLoadError};
use crate::workflow::document::{DocumentError, WorkflowDocument};
use crate::workflow::extension::WorkflowExtension;
use crate::workflow::WorkflowLimits;
use log::{debug, info};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// In-process constructor for a built-in extension.
pub type BuiltinFactory = Arc<dyn Fn() -> Box<dyn Extension> + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("extension `{0}` not found in any extension directory")]
    NotFound(String),
    #[error("failed to load native unit {path}: {source}")]
    Native {
        path: PathBuf,
        #[source]
        source: NativeLoadError,
    },
    #[error("failed to read workflow document {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid workflow document {path}: {source}")]
    Document {
        path: PathBuf,
        #[source]
        source: DocumentError,
    },
}

pub struct ExtensionLoader {
    dirs: Vec<PathBuf>,
    builtins: BTreeMap<String, BuiltinFactory>,
    limits: WorkflowLimits,
}

impl ExtensionLoader {
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self {
            dirs,
            builtins: BTreeMap::new(),
            limits: WorkflowLimits::default(),
        }
    }

    /// Adds an in-process extension resolved by name before any directory.
    pub fn with_builtin<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Extension> + Send + Sync + 'static,
    {
        self.builtins.insert(name.into(), Arc::new(factory));
        self
    }

    pub fn with_limits(mut self, limits: WorkflowLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    pub fn builtin_names(&self) -> Vec<&str> {
        self.builtins.keys().map(String::as_str).collect()
    }

    /// Identifiers discoverable in the configured directories.
    pub fn discover(&self) -> Vec<String> {
        discovery::discover(&self.dirs)
    }

    pub fn load(&self, raw_id: &str) -> Result<Box<dyn Extension>, LoadError> {
        match ExtensionId::parse(raw_id) {
            ExtensionId::Native(name) => self.load_native(&name),
            ExtensionId::Workflow(name) => self.load_workflow(&name),
        }
    }

    fn load_native(&self, name: &str) -> Result<Box<dyn Extension>, LoadError> {
        if let Some(factory) = self.builtins.get(name) {
            debug!("event=extension_load module=loader kind=builtin name={name}");
            return Ok(factory());
        }

        let path = self
            .locate(name, NATIVE_EXTENSIONS)
            .ok_or_else(|| LoadError::NotFound(name.to_string()))?;
        let extension = NativeExtension::open(&path).map_err(|source| LoadError::Native {
            path: path.clone(),
            source,
        })?;
        info!(
            "event=extension_load module=loader status=ok kind=native name={name} path={}",
            path.display()
        );
        Ok(Box::new(extension))
    }

    fn load_workflow(&self, name: &str) -> Result<Box<dyn Extension>, LoadError> {
        let path = self
            .locate(name, WORKFLOW_EXTENSIONS)
            .ok_or_else(|| LoadError::NotFound(ExtensionId::Workflow(name.to_string()).to_string()))?;
        let document = read_document(&path)?;
        info!(
            "event=extension_load module=loader status=ok kind=workflow name={name} steps={} path={}",
            document.steps.len(),
            path.display()
        );
        Ok(Box::new(WorkflowExtension::new(
            name,
            document,
            path,
            self.limits.clone(),
        )))
    }

    /// First directory holding `name.<ext>` for any accepted extension, tried
    /// in `accepted` order.
    fn locate(&self, name: &str, accepted: &[&str]) -> Option<PathBuf> {
        self.dirs.iter().find_map(|dir| {
            accepted
                .iter()
                .map(|ext| dir.join(format!("{name}.{ext}")))
                .find(|candidate| candidate.is_file())
        })
    }
}

fn read_document(path: &Path) -> Result<WorkflowDocument, LoadError> {
    let source = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let is_json = path.extension().and_then(|ext| ext.to_str()) == Some("json");
    let parsed = if is_json {
        WorkflowDocument::from_json(&source)
    } else {
        WorkflowDocument::from_yaml(&source)
    };
    parsed.map_err(|source| LoadError::Document {
        path: path.to_path_buf(),
        source,
    })
}
