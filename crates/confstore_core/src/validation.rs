//! Key and path validation.
//!
//! A key names exactly one value slot: `/a`, `/a/b`, `/a/b/c`.
//! A path names a subtree and is a textual prefix of everything in it:
//! `/`, `/a/`, `/a/b/`.
//!
//! `""`, `"a"`, `"a/b"`, `"//a/b"` and `"/a//b"` are neither.

use crate::error::{CoreError, CoreResult};

/// Returns true if `s` is a well-formed key.
///
/// Keys start with `/`, contain no `//` and do not end with `/`.
#[must_use]
pub fn is_key(s: &str) -> bool {
    s.starts_with('/') && !s.contains("//") && !s.ends_with('/')
}

/// Returns true if `s` is a well-formed path.
///
/// Paths start and end with `/` and contain no `//`.
#[must_use]
pub fn is_path(s: &str) -> bool {
    s.starts_with('/') && !s.contains("//") && s.ends_with('/')
}

/// Returns true if `s` is either a key or a path.
#[must_use]
pub fn is_name(s: &str) -> bool {
    s.starts_with('/') && !s.contains("//")
}

/// Checks that `key` is a well-formed key.
///
/// # Errors
///
/// Returns [`CoreError::InvalidKey`] otherwise.
pub fn ensure_key(key: &str) -> CoreResult<()> {
    if is_key(key) {
        Ok(())
    } else {
        Err(CoreError::invalid_key(key))
    }
}

/// Checks that `path` is a well-formed path.
///
/// # Errors
///
/// Returns [`CoreError::InvalidPath`] otherwise.
pub fn ensure_path(path: &str) -> CoreResult<()> {
    if is_path(path) {
        Ok(())
    } else {
        Err(CoreError::invalid_path(path))
    }
}

/// Checks that `name` is a key or a path.
///
/// # Errors
///
/// Returns [`CoreError::InvalidName`] otherwise.
pub fn ensure_name(name: &str) -> CoreResult<()> {
    if is_name(name) {
        Ok(())
    } else {
        Err(CoreError::invalid_name(name))
    }
}

/// Checks that every item forms a key when appended to `path`.
///
/// # Errors
///
/// Returns [`CoreError::InvalidPath`] for a bad path and
/// [`CoreError::InvalidItem`] for the first bad item.
pub fn ensure_items<S: AsRef<str>>(path: &str, items: &[S]) -> CoreResult<()> {
    ensure_path(path)?;
    for item in items {
        let item = item.as_ref();
        // path ends in '/', so the item must not start with one
        if item.starts_with('/') || !is_key(&format!("{path}{item}")) {
            return Err(CoreError::invalid_item(path, item));
        }
    }
    Ok(())
}

/// Returns the path containing `key`: everything up to and including the
/// last `/`.
#[must_use]
pub fn parent_path(key: &str) -> &str {
    match key.rfind('/') {
        Some(idx) => &key[..=idx],
        None => "",
    }
}
