//! Filesystem actions behind `file_operation` steps.
//!
//! # Invariants
//! - A path is never copied or moved onto itself or into its own subtree.
//! - `move_path` never merges into an existing entry of a directory target.

use log::warn;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Copies `source` to `target`. A directory target receives the source file
/// name; a directory source is copied recursively.
pub fn copy(source: &Path, target: &Path) -> io::Result<PathBuf> {
    let destination = destination_for(source, target)?;
    ensure_outside_source(source, &destination)?;
    if source.is_dir() {
        copy_dir_recursive(source, &destination)?;
    } else {
        fs::copy(source, &destination)?;
    }
    Ok(destination)
}

/// Moves `source` to `target`, falling back to copy + delete across devices.
///
/// Moving into a directory that already holds an entry of the same name
/// fails with `AlreadyExists`. A file target is replaced.
pub fn move_path(source: &Path, target: &Path) -> io::Result<PathBuf> {
    let destination = destination_for(source, target)?;
    ensure_outside_source(source, &destination)?;
    if target.is_dir() && fs::symlink_metadata(&destination).is_ok() {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("destination `{}` already exists", destination.display()),
        ));
    }

    match fs::rename(source, &destination) {
        Ok(()) => Ok(destination),
        Err(err) if err.kind() == io::ErrorKind::CrossesDevices => {
            copy_then_remove(source, &destination)?;
            Ok(destination)
        }
        Err(err) => Err(err),
    }
}

fn copy_then_remove(source: &Path, destination: &Path) -> io::Result<()> {
    if source.is_dir() {
        copy_dir_recursive(source, destination).inspect_err(|_| discard(destination))?;
        // Past this point the copy is complete and is the copy to keep.
        return fs::remove_dir_all(source);
    }
    fs::copy(source, destination).inspect_err(|_| discard(destination))?;
    fs::remove_file(source).inspect_err(|_| discard(destination))
}

fn discard(path: &Path) {
    if let Err(err) = delete(path) {
        warn!(
            "event=file_move module=workflow status=error path={} error={err}",
            path.display()
        );
    }
}

/// Deletes a file or a whole directory tree. A missing path is a no-op.
pub fn delete(path: &Path) -> io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

/// Creates `path` and any missing parents.
pub fn create_dir(path: &Path) -> io::Result<()> {
    fs::create_dir_all(path)
}

fn destination_for(source: &Path, target: &Path) -> io::Result<PathBuf> {
    if !source.exists() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("source `{}` does not exist", source.display()),
        ));
    }
    if target.is_dir() {
        if let Some(file_name) = source.file_name() {
            return Ok(target.join(file_name));
        }
    }
    Ok(target.to_path_buf())
}

/// Rejects a destination equal to `source` or, for directories, inside it.
fn ensure_outside_source(source: &Path, destination: &Path) -> io::Result<()> {
    let source_real = source.canonicalize()?;
    let destination_real = resolve_existing_prefix(destination)?;
    let nested = source.is_dir() && destination_real.starts_with(&source_real);
    if destination_real == source_real || nested {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "cannot place `{}` inside itself at `{}`",
                source.display(),
                destination.display()
            ),
        ));
    }
    Ok(())
}

/// Canonicalizes the longest existing ancestor of `path` and re-appends the
/// components that do not exist yet.
fn resolve_existing_prefix(path: &Path) -> io::Result<PathBuf> {
    let mut pending = Vec::new();
    let mut current = path.to_path_buf();
    loop {
        match current.canonicalize() {
            Ok(real) => return Ok(pending.iter().rev().fold(real, |acc, part| acc.join(part))),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                let Some(name) = current.file_name().map(|name| name.to_os_string()) else {
                    return Err(err);
                };
                pending.push(name);
                current = match current.parent() {
                    Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                    _ => PathBuf::from("."),
                };
            }
            Err(err) => return Err(err),
        }
    }
}

fn copy_dir_recursive(source: &Path, target: &Path) -> io::Result<()> {
    fs::create_dir_all(target)?;
    for entry in fs::read_dir(source)? {
        let entry = entry?;
        let from = entry.path();
        let to = target.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&from, &to)?;
        } else {
            fs::copy(&from, &to)?;
        }
    }
    Ok(())
}
