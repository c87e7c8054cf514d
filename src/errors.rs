use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GopinError>;

/// Error taxonomy of the pinning engine.
///
/// Validation variants are raised before any file mutation or toolchain
/// call; toolchain variants are raised before descriptor persistence, so a
/// failed request never leaves a partially updated module directory.
#[derive(Debug, Error)]
pub enum GopinError {
    #[error("invalid name {0:?}: only letters, digits, '.', '-' and '_' are allowed")]
    InvalidName(String),

    #[error("--name and --rename are mutually exclusive")]
    ConflictingFlags,

    #[error("name {0:?} is reserved: it would shadow the go binary itself")]
    ReservedName(String),

    #[error("no tool named {0:?} is pinned and no package path was given")]
    UnknownTarget(String),

    #[error("version {0:?} requested more than once")]
    DuplicateVersionInRequest(String),

    #[error("'none' must be the sole version, not part of a version list")]
    InvalidNoneInArray,

    #[error("{0}: not a gopin-managed descriptor (auto-generated sentinel missing)")]
    MalformedDescriptor(PathBuf),

    #[error("{path}:{line}: {msg}")]
    Parse {
        path: PathBuf,
        line: usize,
        msg: String,
    },

    #[error("unsupported go version {0}: go 1.14 or newer is required")]
    UnsupportedVersion(String),

    #[error("package {0:?} is not a buildable main package")]
    NotBuildable(String),

    #[error("go {op} failed: {detail}")]
    Toolchain { op: String, detail: String },

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl GopinError {
    /// Annotates an I/O error with the path it failed on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        GopinError::Io {
            path: path.into(),
            source,
        }
    }

    /// True for the descriptor-level conditions that make a single file a
    /// candidate for eviction rather than aborting a whole directory scan.
    pub fn is_malformed_descriptor(&self) -> bool {
        matches!(
            self,
            GopinError::MalformedDescriptor(_) | GopinError::Parse { .. }
        )
    }
}
