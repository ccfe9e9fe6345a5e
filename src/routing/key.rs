//! Dispatch key derivation.
//!
//! # Design Decisions
//! - Request keys: path with leading/trailing slashes stripped, nothing else
//! - Unit keys: relative path, extension stripped, lowercased, '/'-separated
//! - The empty key is the root

use std::path::{Component, Path};

/// Key for a request path. `"/"` and `""` both give the root key `""`.
pub fn dispatch_key(path: &str) -> &str {
    path.trim_matches('/')
}

/// Key for a handler unit at `relative` (relative to the routes directory).
/// `None` for paths that cannot name a unit (absolute, `..`, non-UTF-8).
pub fn unit_key(relative: &Path) -> Option<String> {
    let stem = relative.with_extension("");
    let mut segments = Vec::new();
    for component in stem.components() {
        match component {
            Component::Normal(segment) => segments.push(segment.to_str()?.to_lowercase()),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if segments.is_empty() {
        return None;
    }
    Some(segments.join("/"))
}
