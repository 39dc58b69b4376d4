//! Compile-time dependency-injection code generation.
//!
//! ## Crate layout
//! - `scan`: matches annotation lines in doc comments and slices out their
//!   JSON bodies.
//! - `load`: discovers the packages under a root directory and parses their
//!   sources into a typed package set.
//! - `build`: decodes annotations into the in-memory model and resolves
//!   each injected parameter's static type.
//! - `graph`: checks every injection against the set of known providers,
//!   rejects cycles, and orders each package by dependency priority.
//! - `emit`: renders one `wirebox_generated.rs` per package, wiring every
//!   provider and group member into the runtime registry.
//!
//! Data flows one way through [`run`]: load -> build -> validate -> emit.
//! Any failure aborts before emission, so no partial output is written.

pub mod build;
pub mod emit;
pub mod graph;
pub mod load;
pub mod model;
pub mod scan;

use std::path::Path;

use thiserror::Error as ThisError;
use tracing::info;

use crate::build::BuildError;
use crate::emit::EmitError;
use crate::graph::GraphError;
use crate::load::LoadError;

///
/// Error
///

#[derive(Debug, ThisError)]
pub enum Error {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Emit(#[from] EmitError),
}

/// Runs the whole pipeline over the source tree rooted at `root`.
pub fn run(root: &Path) -> Result<(), Error> {
    let loaded = load::load_workspace(root)?;
    let mut model = build::build_model(&loaded)?;
    graph::validate(&mut model)?;
    emit::emit(&model)?;

    info!(packages = model.packages.len(), "generated wiring");
    Ok(())
}
