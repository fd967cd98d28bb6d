//! Advisory file locking for the settings file.
//!
//! `fs2` advisory locks are cooperative but effective both across threads of
//! one process (each holder opens its own handle) and across independent
//! processes sharing the same filesystem path, which is what makes several
//! concurrent writers to a single settings file safe. An in-memory mutex
//! could never cover the cross-process case.
//!
//! `fs2` has no timed acquisition, so [`FileLock::acquire`] polls the
//! non-blocking variants until a deadline. Expiry is a definite
//! [`ParamsError::LockTimeout`], not a retry loop; callers wanting another
//! attempt re-invoke the operation.

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::time::{Duration, Instant};

use fs2::FileExt;

use crate::errors::{ParamsError, Result};

/// How often a blocked acquisition re-attempts the lock.
const RETRY_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Read intent; multiple shared holders may coexist.
    Shared,
    /// Write intent; excludes every other holder.
    Exclusive,
}

/// A held advisory lock on the settings file.
///
/// Dropping the guard releases the lock, so release runs on every exit path
/// out of a locked section, including `?` returns and panics. A failed parse
/// or a failed write never leaves the file locked behind it.
#[derive(Debug)]
pub struct FileLock {
    file: File,
}

impl FileLock {
    /// Acquire a lock on `path`, blocking the calling thread up to `timeout`.
    ///
    /// `Exclusive` mode creates the file if it does not exist yet (the first
    /// `store` of a fresh settings file); it does not truncate, since the
    /// previous contents must survive until the new write actually happens
    /// under the held lock.
    pub fn acquire(path: &Path, mode: LockMode, timeout: Duration) -> Result<Self> {
        let file = match mode {
            LockMode::Shared => File::open(path)?,
            LockMode::Exclusive => OpenOptions::new().write(true).create(true).open(path)?,
        };

        let deadline = Instant::now() + timeout;
        loop {
            // Fully-qualified calls: recent std ships same-named inherent
            // methods on `File` with different semantics.
            let attempt = match mode {
                LockMode::Shared => FileExt::try_lock_shared(&file),
                LockMode::Exclusive => FileExt::try_lock_exclusive(&file),
            };
            match attempt {
                Ok(()) => return Ok(Self { file }),
                Err(err) if err.kind() == fs2::lock_contended_error().kind() => {
                    if Instant::now() >= deadline {
                        return Err(ParamsError::LockTimeout {
                            path: path.to_path_buf(),
                            timeout,
                        });
                    }
                    std::thread::sleep(RETRY_INTERVAL);
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// The locked file handle.
    pub fn file(&self) -> &File {
        &self.file
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        // Best effort; the OS drops the lock with the handle anyway.
        let _ = FileExt::unlock(&self.file);
    }
}
