//! Directory scan producing loadable extension identifiers.
//!
//! # Responsibility
//! - Turn directory contents into identifiers (`name` or `workflow:name`).
//!
//! # Invariants
//! - Scans are non-recursive and never mutate registry state.
//! - Within one directory, native units are listed before workflow documents,
//!   each group sorted by file name; directories keep their configured order.
//! - Reserved names (`__` prefix) and hidden files are skipped.

use log::{info, warn};
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

/// Identifier prefix marking declarative workflow documents.
pub const WORKFLOW_PREFIX: &str = "workflow:";
/// File extensions of native extension units.
pub const NATIVE_EXTENSIONS: &[&str] = &["so", "dylib", "dll"];
/// File extensions of workflow documents, in lookup priority order.
pub const WORKFLOW_EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

const RESERVED_PREFIX: &str = "__";

/// Parsed form of a discoverable identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ExtensionId {
    Native(String),
    Workflow(String),
}

impl ExtensionId {
    pub fn parse(raw: &str) -> Self {
        match raw.strip_prefix(WORKFLOW_PREFIX) {
            Some(name) => Self::Workflow(name.to_string()),
            None => Self::Native(raw.to_string()),
        }
    }
}

impl Display for ExtensionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Native(name) => write!(f, "{name}"),
            Self::Workflow(name) => write!(f, "{WORKFLOW_PREFIX}{name}"),
        }
    }
}

pub fn is_native_unit(path: &Path) -> bool {
    has_extension(path, NATIVE_EXTENSIONS)
}

pub fn is_workflow_document(path: &Path) -> bool {
    has_extension(path, WORKFLOW_EXTENSIONS)
}

fn has_extension(path: &Path, accepted: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| accepted.contains(&ext))
        .unwrap_or(false)
}

fn is_reserved(stem: &str) -> bool {
    stem.is_empty() || stem.starts_with(RESERVED_PREFIX) || stem.starts_with('.')
}

/// Scans every directory and returns identifiers in scan order.
///
/// Missing directories are logged and skipped. Duplicates across directories
/// are kept; registration resolves them.
pub fn discover(dirs: &[PathBuf]) -> Vec<String> {
    let mut discovered = Vec::new();
    for dir in dirs {
        discovered.extend(scan_dir(dir));
    }
    discovered
}

fn scan_dir(dir: &Path) -> Vec<String> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            warn!(
                "event=discover module=discovery status=skipped dir={} error={err}",
                dir.display()
            );
            return Vec::new();
        }
    };

    let mut files: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    files.sort();

    let mut natives = Vec::new();
    let mut workflows = Vec::new();
    for path in files {
        let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
            continue;
        };
        if is_reserved(stem) {
            continue;
        }
        if is_native_unit(&path) {
            natives.push(ExtensionId::Native(stem.to_string()).to_string());
        } else if is_workflow_document(&path) {
            workflows.push(ExtensionId::Workflow(stem.to_string()).to_string());
        }
    }

    info!(
        "event=discover module=discovery status=ok dir={} native={} workflow={}",
        dir.display(),
        natives.len(),
        workflows.len()
    );
    natives.extend(workflows);
    natives
}

#[cfg(test)]
mod tests {
    use super::{discover, ExtensionId};
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn identifier_roundtrips_through_display() {
        let workflow = ExtensionId::parse("workflow:cleanup");
        assert_eq!(workflow, ExtensionId::Workflow("cleanup".to_string()));
        assert_eq!(workflow.to_string(), "workflow:cleanup");

        let native = ExtensionId::parse("logger");
        assert_eq!(native, ExtensionId::Native("logger".to_string()));
        assert_eq!(native.to_string(), "logger");
    }

    #[test]
    fn lists_natives_before_workflows_and_skips_reserved() {
        let dir = tempdir().expect("tempdir");
        for name in [
            "bar.yaml",
            "foo.so",
            "__init__.so",
            "__draft.yml",
            "notes.txt",
            ".hidden.yaml",
        ] {
            fs::write(dir.path().join(name), b"").expect("write fixture");
        }
        fs::create_dir(dir.path().join("nested.yaml")).expect("dir named like a document");

        let found = discover(&[dir.path().to_path_buf()]);
        assert_eq!(found, vec!["foo".to_string(), "workflow:bar".to_string()]);
    }

    #[test]
    fn keeps_directory_order_and_duplicates() {
        let first = tempdir().expect("tempdir");
        let second = tempdir().expect("tempdir");
        fs::write(first.path().join("sync.json"), b"{}").expect("write");
        fs::write(second.path().join("sync.yml"), b"").expect("write");
        fs::write(second.path().join("alpha.dll"), b"").expect("write");

        let missing = first.path().join("does-not-exist");
        let found = discover(&[
            first.path().to_path_buf(),
            missing,
            second.path().to_path_buf(),
        ]);
        assert_eq!(found, vec!["workflow:sync", "alpha", "workflow:sync"]);
    }
}
