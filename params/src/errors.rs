//! Error types for the settings store.
//!
//! Every failure propagates to the caller unchanged; the store performs no
//! silent recovery and no partial commits. A mutation that fails leaves the
//! prior in-memory and on-disk state intact and usable.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ParamsError>;

#[derive(Debug, Error)]
pub enum ParamsError {
    /// An explicit construction path or a proposed `data_dirs` entry does
    /// not name an existing directory on the local system.
    #[error("path(s) do not lead to a valid directory: {}", join_paths(.paths))]
    PathNotFound { paths: Vec<PathBuf> },

    /// No settings file in any searched location and creation not requested.
    #[error(
        "unable to locate a settings file named `{filename}`; checked {}",
        join_paths(.searched)
    )]
    SettingsFileNotLocated {
        filename: &'static str,
        searched: Vec<PathBuf>,
    },

    /// The advisory lock was not obtained within the allowed window.
    /// Distinct from `Io` so callers can tell contention from corruption.
    #[error("timed out after {timeout:?} waiting for the lock on {}", .path.display())]
    LockTimeout { path: PathBuf, timeout: Duration },

    /// `user_modules` is managed by the module registry; the general `set`
    /// interface refuses to touch it.
    #[error(
        "`user_modules` is maintained by the module registry and is not \
         modifiable through `set`"
    )]
    ProtectedKeyWrite,

    /// `get` on a key that is neither a known setting nor a stored user key.
    #[error("no stored setting named `{key}`")]
    KeyNotFound { key: String },

    /// The backing file exists but does not parse as a JSON object.
    #[error("settings file {} is corrupt: {reason}", .path.display())]
    CorruptStore { path: PathBuf, reason: String },

    /// A value whose shape the target key cannot accept.
    #[error("invalid value for `{key}`: expected {expected}")]
    InvalidValue {
        key: String,
        expected: &'static str,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
