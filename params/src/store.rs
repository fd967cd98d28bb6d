//! The persistent settings store.
//!
//! One JSON object in `satkit_settings.json` is the durable state; the
//! in-memory mapping is a per-handle cache of it. Every mutation validates,
//! updates memory, then rewrites the whole file under an exclusive advisory
//! lock before returning, so a successful call never leaves unflushed state
//! behind. Reads are served from memory without locking.
//!
//! Known settings and their defaults:
//!
//! | key                   | default                                |
//! |-----------------------|----------------------------------------|
//! | `clean_level`         | `"clean"`                              |
//! | `directory_format`    | `{platform}/{name}/{tag}/{inst_id}`    |
//! | `ignore_empty_files`  | `false`                                |
//! | `file_timeout`        | `10` (seconds, write-lock wait)        |
//! | `update_files`        | `true`                                 |
//! | `user_modules`        | `{}` (registry-managed, see below)     |
//! | `warn_empty_file_list`| `false`                                |
//!
//! `data_dirs` is persisted but has no working default; a full reset sets it
//! to `[]`. Any other key a user assigns is stored as-is alongside these.

use std::fmt;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::{Map, Value};

use crate::errors::{ParamsError, Result};
use crate::lock::{FileLock, LockMode};
use crate::paths;

/// Fixed name of the backing file in whichever directory hosts it.
pub const SETTINGS_FILENAME: &str = "satkit_settings.json";

/// Subdirectory of the user's home holding the default settings location.
const CONFIG_DIR: &str = ".satkit";

/// Environment override for the config directory, checked before `~/.satkit`.
const HOME_ENV_VAR: &str = "SATKIT_HOME";

/// Lock wait for the initial load. The configured `file_timeout` lives
/// inside the file being read, so the first read cannot use it yet.
const BOOTSTRAP_TIMEOUT: Duration = Duration::from_secs(10);

/// Keys persisted without a working default; a full reset writes `[]`.
const NON_DEFAULT_KEYS: &[&str] = &["data_dirs"];

/// Assignment dispatch, resolved once at the `set` boundary.
///
/// Two keys need more than a plain insert: `data_dirs` runs the path
/// validator and `user_modules` is refused outright. Everything else is a
/// generic insert.
enum KnownKey<'a> {
    DataDirs,
    UserModules,
    Generic(&'a str),
}

impl<'a> KnownKey<'a> {
    fn resolve(key: &'a str) -> Self {
        match key {
            "data_dirs" => Self::DataDirs,
            "user_modules" => Self::UserModules,
            other => Self::Generic(other),
        }
    }
}

/// Handle on the settings file.
///
/// Independent handles (in this process or another) pointed at the same file
/// coordinate only through the file itself: writes are serialized by the
/// advisory lock, and a handle picks up foreign writes by being reopened.
#[derive(Debug)]
pub struct Params {
    data: Map<String, Value>,
    defaults: Map<String, Value>,
    non_defaults: &'static [&'static str],
    file_path: PathBuf,
}

impl Params {
    /// Open the store, discovering the settings file in the current working
    /// directory and then the user config directory.
    pub fn open() -> Result<Self> {
        Self::build(None, false)
    }

    /// Open the store backed by `<dir>/satkit_settings.json`.
    pub fn open_at(dir: impl AsRef<Path>) -> Result<Self> {
        Self::build(Some(dir.as_ref()), false)
    }

    /// Create a fresh settings file holding every default plus `[]` for the
    /// no-default keys, then open it.
    ///
    /// With `dir` given the file lands there; otherwise an already existing
    /// file keeps its discovered location, and failing that the default
    /// config directory is created and used.
    pub fn create(dir: Option<&Path>) -> Result<Self> {
        Self::build(dir, true)
    }

    fn build(dir: Option<&Path>, create_new: bool) -> Result<Self> {
        let file_path = match dir {
            Some(dir) => {
                if !dir.is_dir() {
                    return Err(ParamsError::PathNotFound {
                        paths: vec![dir.to_path_buf()],
                    });
                }
                let file_path = dir.join(SETTINGS_FILENAME);
                if !create_new && !file_path.is_file() {
                    return Err(ParamsError::SettingsFileNotLocated {
                        filename: SETTINGS_FILENAME,
                        searched: vec![file_path],
                    });
                }
                file_path
            }
            None => {
                let candidates = search_locations();
                match locate_settings_file(&candidates) {
                    Some(found) => found,
                    None if create_new => {
                        let config_dir = default_config_dir()?;
                        std::fs::create_dir_all(&config_dir)?;
                        config_dir.join(SETTINGS_FILENAME)
                    }
                    None => {
                        return Err(ParamsError::SettingsFileNotLocated {
                            filename: SETTINGS_FILENAME,
                            searched: candidates,
                        });
                    }
                }
            }
        };

        let mut params = Self {
            data: Map::new(),
            defaults: default_settings(),
            non_defaults: NON_DEFAULT_KEYS,
            file_path,
        };
        if create_new {
            params.clear_and_restart()?;
        }
        params.load()?;
        tracing::info!(path = %params.file_path.display(), "settings loaded");
        Ok(params)
    }

    /// Path of the backing file.
    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// Current value for `key`, from memory.
    pub fn get(&self, key: &str) -> Result<&Value> {
        self.data.get(key).ok_or_else(|| ParamsError::KeyNotFound {
            key: key.to_string(),
        })
    }

    /// Assign `value` to `key` and persist.
    ///
    /// `data_dirs` goes through the path validator with all-or-nothing
    /// acceptance; `user_modules` is refused with
    /// [`ParamsError::ProtectedKeyWrite`]. Other keys are stored as given,
    /// whether or not they belong to the known table.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) -> Result<()> {
        let (key, value) = match KnownKey::resolve(key) {
            KnownKey::DataDirs => (
                "data_dirs".to_string(),
                validate_data_dirs_value(value.into())?,
            ),
            KnownKey::UserModules => return Err(ParamsError::ProtectedKeyWrite),
            KnownKey::Generic(key) => (key.to_string(), value.into()),
        };
        self.commit(move |data| {
            data.insert(key, value);
        })
    }

    /// Typed `data_dirs` assignment: a batch of directory paths, validated
    /// all-or-nothing, replacing the previous array in full.
    pub fn set_data_dirs<S: AsRef<str>>(&mut self, dirs: &[S]) -> Result<()> {
        let value = dirs_to_value(&paths::normalize_dirs(dirs)?);
        self.commit(move |data| {
            data.insert("data_dirs".to_string(), value);
        })
    }

    /// Current `data_dirs` as paths.
    pub fn data_dirs(&self) -> Result<Vec<PathBuf>> {
        let items = self
            .get("data_dirs")?
            .as_array()
            .ok_or_else(|| ParamsError::InvalidValue {
                key: "data_dirs".to_string(),
                expected: "an array of directory paths",
            })?;
        items
            .iter()
            .map(|entry| {
                entry
                    .as_str()
                    .map(PathBuf::from)
                    .ok_or_else(|| ParamsError::InvalidValue {
                        key: "data_dirs".to_string(),
                        expected: "an array of directory paths",
                    })
            })
            .collect()
    }

    /// Rewrite `user_modules`.
    ///
    /// The general [`set`](Self::set) refuses this key; the module registry
    /// is the one collaborator meant to maintain it, and it comes through
    /// here.
    pub fn replace_user_modules(&mut self, modules: Value) -> Result<()> {
        self.commit(move |data| {
            data.insert("user_modules".to_string(), modules);
        })
    }

    /// Reset every known setting to its default value, leaving no-default
    /// and user-added keys untouched. One persist at the end.
    pub fn restore_defaults(&mut self) -> Result<()> {
        let defaults = self.defaults.clone();
        self.commit(move |data| {
            for (key, value) in defaults {
                data.insert(key, value);
            }
        })
    }

    /// Drop everything and start over: defaults for the known settings,
    /// `[]` for the no-default keys, user keys gone. One persist at the end.
    pub fn clear_and_restart(&mut self) -> Result<()> {
        let mut fresh = self.defaults.clone();
        for key in self.non_defaults {
            fresh.insert((*key).to_string(), Value::Array(Vec::new()));
        }
        self.commit(move |data| *data = fresh)
    }

    /// Apply a mutation to the mapping and persist it. A failed persist
    /// rolls the mapping back, so a caller never observes in-memory state
    /// that is not also on disk.
    fn commit(&mut self, mutate: impl FnOnce(&mut Map<String, Value>)) -> Result<()> {
        let previous = self.data.clone();
        mutate(&mut self.data);
        if let Err(err) = self.store() {
            self.data = previous;
            return Err(err);
        }
        Ok(())
    }

    /// Load the backing file into memory under a shared lock.
    fn load(&mut self) -> Result<()> {
        let lock = FileLock::acquire(&self.file_path, LockMode::Shared, BOOTSTRAP_TIMEOUT)?;
        let mut file = lock.file();
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        // Best effort: on networked filesystems this forces the read buffer
        // to settle. Some platforms refuse fsync on read handles.
        let _ = file.sync_all();

        let parsed: Value =
            serde_json::from_str(&contents).map_err(|err| ParamsError::CorruptStore {
                path: self.file_path.clone(),
                reason: err.to_string(),
            })?;
        match parsed {
            Value::Object(map) => {
                self.data = map;
                Ok(())
            }
            other => Err(ParamsError::CorruptStore {
                path: self.file_path.clone(),
                reason: format!("expected a JSON object, found {}", value_kind(&other)),
            }),
        }
    }

    /// Serialize the full mapping to the backing file under an exclusive
    /// lock. Every mutating operation ends here; there is no deferred or
    /// batched persistence.
    fn store(&self) -> Result<()> {
        let timeout = self.write_timeout();
        let lock = FileLock::acquire(&self.file_path, LockMode::Exclusive, timeout)?;
        // Serialize before touching the file, so a serialization failure
        // leaves the previous contents in place.
        let payload = serde_json::to_vec(&self.data)?;
        let mut file = lock.file();
        file.set_len(0)?;
        file.write_all(&payload)?;
        file.flush()?;
        file.sync_all()?;
        tracing::debug!(
            path = %self.file_path.display(),
            bytes = payload.len(),
            "settings stored"
        );
        Ok(())
    }

    /// Write-lock wait, from the configured `file_timeout`. Falls back to
    /// the bootstrap window if the stored value is missing or unusable
    /// (non-numeric, negative, non-finite, or beyond `Duration`'s range —
    /// `set` accepts any JSON number for this key, so all of those can be
    /// sitting in the mapping).
    fn write_timeout(&self) -> Duration {
        self.data
            .get("file_timeout")
            .and_then(Value::as_f64)
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
            .unwrap_or(BOOTSTRAP_TIMEOUT)
    }
}

/// Validate a `set("data_dirs", …)` payload into its stored form.
///
/// Scalar input is promoted to a one-element batch; the batch then runs
/// through the path validator with all-or-nothing acceptance.
fn validate_data_dirs_value(value: Value) -> Result<Value> {
    let raw: Vec<String> = match value {
        Value::String(single) => vec![single],
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::String(path) => Ok(path),
                _ => Err(ParamsError::InvalidValue {
                    key: "data_dirs".to_string(),
                    expected: "a path string or an array of path strings",
                }),
            })
            .collect::<Result<_>>()?,
        _ => {
            return Err(ParamsError::InvalidValue {
                key: "data_dirs".to_string(),
                expected: "a path string or an array of path strings",
            });
        }
    };
    Ok(dirs_to_value(&paths::normalize_dirs(&raw)?))
}

impl fmt::Display for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let user_keys: Vec<&String> = self
            .data
            .keys()
            .filter(|key| {
                !self.defaults.contains_key(*key)
                    && !self.non_defaults.contains(&key.as_str())
            })
            .collect();

        writeln!(f, "satkit settings ({})", self.file_path.display())?;
        writeln!(f, "Tracking {} standard settings", self.defaults.len())?;
        writeln!(f, "Tracking {} settings (no default)", self.non_defaults.len())?;
        writeln!(f, "Tracking {} user values", user_keys.len())?;

        writeln!(f, "\nStandard settings:")?;
        for key in self.defaults.keys() {
            let value = self.data.get(key).unwrap_or(&Value::Null);
            writeln!(f, "{key} : {value}")?;
        }

        writeln!(f, "\nStandard settings (no defaults):")?;
        for key in self.non_defaults {
            let value = self.data.get(*key).unwrap_or(&Value::Null);
            writeln!(f, "{key} : {value}")?;
        }

        if !user_keys.is_empty() {
            writeln!(f, "\nUser settings:")?;
            for key in user_keys {
                let value = self.data.get(key).unwrap_or(&Value::Null);
                writeln!(f, "{key} : {value}")?;
            }
        }
        Ok(())
    }
}

/// The known settings and their default values.
fn default_settings() -> Map<String, Value> {
    let directory_format = ["{platform}", "{name}", "{tag}", "{inst_id}"]
        .join(std::path::MAIN_SEPARATOR_STR);
    let mut defaults = Map::new();
    defaults.insert("clean_level".to_string(), Value::from("clean"));
    defaults.insert("directory_format".to_string(), Value::from(directory_format));
    defaults.insert("ignore_empty_files".to_string(), Value::from(false));
    defaults.insert("file_timeout".to_string(), Value::from(10));
    defaults.insert("update_files".to_string(), Value::from(true));
    defaults.insert("user_modules".to_string(), Value::Object(Map::new()));
    defaults.insert("warn_empty_file_list".to_string(), Value::from(false));
    defaults
}

fn dirs_to_value(dirs: &[PathBuf]) -> Value {
    Value::Array(
        dirs.iter()
            .map(|dir| Value::from(dir.to_string_lossy().into_owned()))
            .collect(),
    )
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Directories searched, in order, when no explicit path is given.
fn search_locations() -> Vec<PathBuf> {
    let mut locations = Vec::with_capacity(2);
    if let Ok(cwd) = std::env::current_dir() {
        locations.push(cwd);
    }
    if let Ok(config_dir) = default_config_dir() {
        locations.push(config_dir);
    }
    locations
}

/// First candidate directory holding an existing settings file wins.
fn locate_settings_file(candidates: &[PathBuf]) -> Option<PathBuf> {
    candidates
        .iter()
        .map(|dir| dir.join(SETTINGS_FILENAME))
        .find(|path| path.is_file())
}

/// `$SATKIT_HOME` if set, else `~/.satkit`.
fn default_config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(HOME_ENV_VAR) {
        return Ok(PathBuf::from(dir));
    }
    dirs::home_dir()
        .map(|home| home.join(CONFIG_DIR))
        .ok_or_else(|| {
            ParamsError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "could not determine the user home directory",
            ))
        })
}
