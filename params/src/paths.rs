//! Normalization and validation for `data_dirs` entries.
//!
//! User-supplied paths arrive in whatever shape the user typed: `~` prefixes,
//! `$VAR` references, redundant separators, relative segments. Everything is
//! expanded and absolutized before validation, and validation is
//! all-or-nothing: either every path in the batch names an existing
//! directory, or none of them are accepted.

use std::path::{Path, PathBuf};

use path_absolutize::Absolutize;

use crate::errors::{ParamsError, Result};

/// Expand, absolutize, and validate a batch of directory paths.
///
/// Returns the normalized paths in input order, or
/// [`ParamsError::PathNotFound`] naming every entry that does not lead to an
/// existing directory. On failure nothing from the batch is usable.
pub fn normalize_dirs<S: AsRef<str>>(raw: &[S]) -> Result<Vec<PathBuf>> {
    let mut normalized = Vec::with_capacity(raw.len());
    for entry in raw {
        let expanded = expand_vars(&expand_tilde(entry.as_ref()));
        let path = Path::new(&expanded).absolutize()?.into_owned();
        normalized.push(path);
    }

    let missing: Vec<PathBuf> = normalized
        .iter()
        .filter(|p| !p.is_dir())
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(ParamsError::PathNotFound { paths: missing });
    }

    Ok(normalized)
}

/// Replace a leading `~` with the user's home directory.
fn expand_tilde(raw: &str) -> String {
    if raw == "~" {
        if let Some(home) = dirs::home_dir() {
            return home.to_string_lossy().into_owned();
        }
    } else if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest).to_string_lossy().into_owned();
        }
    }
    raw.to_string()
}

/// Expand `$NAME` and `${NAME}` environment references.
///
/// Unknown variables are left in place verbatim, matching the usual shell
/// `expandvars` behavior rather than erroring on them.
fn expand_vars(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(idx) = rest.find('$') {
        out.push_str(&rest[..idx]);
        rest = &rest[idx..];
        let after = &rest[1..];

        if let Some(braced) = after.strip_prefix('{') {
            match braced.find('}') {
                Some(end) => {
                    let name = &braced[..end];
                    match std::env::var(name) {
                        Ok(value) => out.push_str(&value),
                        Err(_) => out.push_str(&rest[..end + 3]),
                    }
                    rest = &braced[end + 1..];
                }
                None => {
                    // Unterminated brace, emit verbatim.
                    out.push_str(rest);
                    rest = "";
                }
            }
            continue;
        }

        let name_len = after
            .char_indices()
            .take_while(|(_, c)| c.is_ascii_alphanumeric() || *c == '_')
            .last()
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);
        if name_len == 0 {
            // A bare `$` with nothing expandable after it.
            out.push('$');
            rest = after;
            continue;
        }

        let name = &after[..name_len];
        match std::env::var(name) {
            Ok(value) => out.push_str(&value),
            Err(_) => {
                out.push('$');
                out.push_str(name);
            }
        }
        rest = &after[name_len..];
    }
    out.push_str(rest);
    out
}
