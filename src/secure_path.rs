//! Canonical-root containment for static file serving.
//!
//! [`resolve`] maps an untrusted URL path onto a trusted document root and
//! guarantees the result cannot escape it: the requested path is normalized
//! lexically *before* joining, and anything that exists on disk is
//! canonicalized afterwards so symlinks pointing outside the root are caught
//! as well. Symlinks that stay inside the root are allowed.

use std::path::{Component, Path, PathBuf};

use tracing::warn;

/// Resolve `requested` against `root`.
///
/// `root` must exist; it is canonicalized here so the containment check
/// compares canonical forms. A `requested` value that is empty or ends with
/// `/` gets `default_file` appended. Returns `None` whenever containment
/// cannot be proven; callers treat that as a traversal attempt (403).
///
/// The returned path is not guaranteed to exist; a clean miss inside the
/// root is the caller's 404.
pub fn resolve(root: &Path, requested: &str, default_file: &str) -> Option<PathBuf> {
    let canonical_root = match root.canonicalize() {
        Ok(p) => p,
        Err(_) => {
            warn!(root = %root.display(), "Document root cannot be canonicalized");
            return None;
        }
    };

    let mut requested = requested.trim_start_matches('/').to_string();
    if requested.is_empty() || requested.ends_with('/') {
        requested.push_str(default_file);
    }

    // Collapse `.` and `..` lexically before touching the filesystem. A
    // request that pops above the root is rejected outright.
    let mut segments: Vec<&std::ffi::OsStr> = Vec::new();
    for component in Path::new(&requested).components() {
        match component {
            Component::Normal(seg) => segments.push(seg),
            Component::CurDir => {}
            Component::ParentDir => {
                if segments.pop().is_none() {
                    return None;
                }
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }

    let mut joined = canonical_root.clone();
    for seg in segments {
        joined.push(seg);
    }

    match joined.canonicalize() {
        Ok(canonical) => {
            // Component-wise prefix check; `starts_with` respects separator
            // boundaries so `/var/www-evil` never passes for root `/var/www`.
            if canonical == canonical_root || canonical.starts_with(&canonical_root) {
                Some(canonical)
            } else {
                None
            }
        }
        // Nothing on disk yet; lexical normalization already proved
        // containment.
        Err(_) => Some(joined),
    }
}
