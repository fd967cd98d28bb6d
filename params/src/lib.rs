//! Persistent user settings for satkit.
//!
//! A single JSON settings file (`satkit_settings.json`) holds every
//! user-facing knob: instrument defaults, the `data_dirs` search roots, and
//! any custom keys a user wants to carry between sessions. Several processes
//! (or threads) may hold their own [`Params`] handle pointed at the same
//! file, so every mutation is serialized through an advisory file lock and
//! flushed to disk before the call returns.
//!
//! Reads never touch the file: `get` is served from the mapping loaded at
//! construction. Handles do not observe each other's writes live; reopening
//! the store is the way to pick up another process's changes.

#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod errors;
pub mod lock;
pub mod paths;
pub mod store;

pub use errors::{ParamsError, Result};
pub use lock::{FileLock, LockMode};
pub use store::{Params, SETTINGS_FILENAME};

/// Crate version, used by the CLI banner.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
