// Purpose: Classify every fatal condition a resolve run can hit.
// Inputs/Outputs: Constructed by catalog/archive/graph code, surfaced verbatim by the CLI.
// Invariants: Every variant is terminal; callers discard partial state on any error.
// Gotchas: Zip container failures are folded into `Io` so callers see one I/O class.

use std::path::PathBuf;
use thiserror::Error;

use crate::pkg::universe::Provenance;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error(
        "invalid archive entry '{entry}' in {} (module {module}): {reason}",
        archive.display()
    )]
    InvalidArchiveEntry {
        archive: PathBuf,
        module: String,
        entry: String,
        reason: String,
    },

    #[error("package '{import_path}' has been redeclared: provided by {existing} and {incoming}")]
    DuplicatePackage {
        import_path: String,
        existing: Provenance,
        incoming: Provenance,
    },

    #[error(
        "no module provides package '{import_path}' (imported by '{importer}'), try to run: go get {import_path}{}",
        format_hint(suggestion)
    )]
    MissingPackage {
        importer: String,
        import_path: String,
        suggestion: Option<String>,
    },

    #[error("invalid import, package '{importer}' is importing package main '{import_path}'")]
    IllegalExecutableImport {
        importer: String,
        import_path: String,
    },

    #[error(
        "cannot resolve dependencies due to circular dependency among: {}",
        pending.join(", ")
    )]
    CircularDependency { pending: Vec<String> },

    #[error("no eligible source files in {}", dir.display())]
    NoSourceFiles { dir: PathBuf },

    #[error("invalid target package '{target}': {reason}")]
    InvalidTarget { target: String, reason: String },

    #[error("discovery worker panicked for module {module}")]
    WorkerPanicked { module: String },

    #[error("resolution cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, ResolveError>;

fn format_hint(suggestion: &Option<String>) -> String {
    match suggestion {
        Some(s) => format!("\nhelp: did you mean \"{}\"?", s),
        None => String::new(),
    }
}

impl ResolveError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ResolveError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        ResolveError::Parse {
            path: path.into(),
            message: message.into(),
        }
    }

    // Import path(s) the error is about, used by callers that only need the offending key.
    pub fn offending_path(&self) -> Option<&str> {
        match self {
            ResolveError::DuplicatePackage { import_path, .. }
            | ResolveError::MissingPackage { import_path, .. }
            | ResolveError::IllegalExecutableImport { import_path, .. } => Some(import_path),
            ResolveError::InvalidArchiveEntry { entry, .. } => Some(entry),
            ResolveError::InvalidTarget { target, .. } => Some(target),
            ResolveError::WorkerPanicked { module } => Some(module),
            _ => None,
        }
    }
}
