use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Why a requested path was refused. [`crate::FileCache::read`] folds all
/// of these into `None`; the variants exist for logging and diagnostics.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("cannot canonicalize {path}: {source}")]
    Canonicalize { path: PathBuf, source: io::Error },

    #[error("sandbox root {root} is unavailable: {source}")]
    RootUnavailable { root: PathBuf, source: io::Error },

    #[error("{0} resolves outside the sandbox root")]
    OutsideRoot(PathBuf),

    #[error("{0} is not a regular file")]
    NotRegularFile(PathBuf),

    #[error("cannot stat {path}: {source}")]
    Metadata { path: PathBuf, source: io::Error },
}
