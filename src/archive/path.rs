//! Path sanitization for archive entry names and storage keys.
//!
//! Both `/` and `\` separate segments. Segments that are empty, `.` or `..`
//! once trimmed are dropped, which strips leading slashes and makes traversal
//! impossible. Every other segment is kept as written.

const FALLBACK_NAME: &str = "unnamed";

fn safe_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split(['/', '\\'])
        .filter(|s| !matches!(s.trim(), "" | "." | ".."))
}

/// Normalize an archive entry path, keeping its directory structure.
pub fn sanitize_entry_path(path: &str) -> String {
    let joined = safe_segments(path).collect::<Vec<_>>().join("/");
    if joined.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        joined
    }
}

/// Collapse a storage key into a single file name (segments joined with `_`).
pub fn flatten_storage_key(path: &str) -> String {
    let joined = safe_segments(path).collect::<Vec<_>>().join("_");
    if joined.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        joined
    }
}

/// Relative filesystem components for a storage key, or `None` if nothing safe remains.
pub fn storage_key_components(path: &str) -> Option<Vec<&str>> {
    let parts: Vec<&str> = safe_segments(path).collect();
    if parts.is_empty() { None } else { Some(parts) }
}
