//! Source loader.
//!
//! Discovers the packages under a root directory and parses their sources
//! into the typed package set the model builder consumes. A package is any
//! directory whose `Cargo.toml` carries a `[package]` section; its name
//! comes from the manifest and its source set is every `.rs` file under
//! `src/`. Paths are walked in sorted order so the pipeline is deterministic
//! regardless of filesystem enumeration order.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error as ThisError;
use tracing::debug;
use walkdir::WalkDir;

///
/// LoadError
///

#[derive(Debug, ThisError)]
pub enum LoadError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: syn::Error,
    },

    #[error("failed to read manifest {}: {source}", .path.display())]
    Manifest {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

///
/// LoadedPackage
/// One discovered crate with its parsed sources.
///

pub struct LoadedPackage {
    /// Crate ident (manifest name with dashes normalized).
    pub name: String,
    /// Import path other packages use for this one.
    pub path: String,
    /// The crate's `src/` directory.
    pub folder: PathBuf,
    pub files: Vec<LoadedFile>,
}

pub struct LoadedFile {
    /// Src-relative path, e.g. `db/query.rs`.
    pub name: String,
    /// Module path within the crate, e.g. `db::query`; empty for root files.
    pub module: String,
    pub ast: syn::File,
}

#[derive(Debug, Deserialize)]
struct Manifest {
    package: Option<ManifestPackage>,
}

#[derive(Debug, Deserialize)]
struct ManifestPackage {
    name: String,
}

/// Loads every package under `root`.
pub fn load_workspace(root: &Path) -> Result<Vec<LoadedPackage>, LoadError> {
    let mut manifests: Vec<PathBuf> = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_skipped_dir(entry.path()))
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file() && entry.file_name() == "Cargo.toml")
        .map(|entry| entry.into_path())
        .collect();
    manifests.sort();

    let mut packages = Vec::new();
    for manifest_path in manifests {
        if let Some(package) = load_package(&manifest_path)? {
            packages.push(package);
        }
    }
    Ok(packages)
}

/// Loads the package described by one manifest, or `None` for virtual
/// workspace manifests and crates without a `src/` directory.
fn load_package(manifest_path: &Path) -> Result<Option<LoadedPackage>, LoadError> {
    let raw = fs::read_to_string(manifest_path).map_err(|source| LoadError::Io {
        path: manifest_path.to_path_buf(),
        source,
    })?;
    let manifest: Manifest = toml::from_str(&raw).map_err(|source| LoadError::Manifest {
        path: manifest_path.to_path_buf(),
        source,
    })?;
    let Some(package) = manifest.package else {
        return Ok(None);
    };

    let folder = match manifest_path.parent() {
        Some(dir) => dir.join("src"),
        None => return Ok(None),
    };
    if !folder.is_dir() {
        return Ok(None);
    }

    let name = package.name.replace('-', "_");
    debug!(package = %name, folder = %folder.display(), "loading package");

    let mut sources: Vec<PathBuf> = WalkDir::new(&folder)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| {
            entry.file_type().is_file()
                && entry.path().extension().is_some_and(|ext| ext == "rs")
        })
        .map(|entry| entry.into_path())
        .collect();
    sources.sort();

    let mut files = Vec::new();
    for source in sources {
        files.push(load_file(&folder, &source)?);
    }

    Ok(Some(LoadedPackage {
        path: name.clone(),
        name,
        folder,
        files,
    }))
}

fn load_file(folder: &Path, source: &Path) -> Result<LoadedFile, LoadError> {
    let content = fs::read_to_string(source).map_err(|io_err| LoadError::Io {
        path: source.to_path_buf(),
        source: io_err,
    })?;
    let ast = syn::parse_file(&content).map_err(|syn_err| LoadError::Parse {
        path: source.to_path_buf(),
        source: syn_err,
    })?;

    let relative = source.strip_prefix(folder).unwrap_or(source);
    let name = relative.to_string_lossy().replace('\\', "/");
    Ok(LoadedFile {
        module: module_path(&name),
        name,
        ast,
    })
}

/// Module path a src-relative file corresponds to: `db/query.rs` ->
/// `db::query`, with `lib.rs`, `main.rs`, and `mod.rs` components elided.
pub(crate) fn module_path(relative: &str) -> String {
    let trimmed = relative.trim_end_matches(".rs");
    let segments: Vec<&str> = trimmed
        .split('/')
        .filter(|segment| !matches!(*segment, "lib" | "main" | "mod"))
        .collect();
    segments.join("::")
}

/// Directories that never contain scannable sources.
fn is_skipped_dir(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name == "target" || (name.starts_with('.') && name.len() > 1))
}
