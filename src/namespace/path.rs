//! Namespace path helpers.
//!
//! Every key stored locally is normalized: a single leading `/`, segments
//! joined by `/`, no empty or whitespace-only segments.

/// Key of the namespace root.
pub const ROOT: &str = "/";

/// Normalize a possibly messy path: trims each segment and drops empty ones.
///
/// An input with no usable segments normalizes to [`ROOT`].
pub fn normalize(raw: &str) -> String {
    let segments: Vec<&str> = raw
        .split('/')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    format!("/{}", segments.join("/"))
}

/// Key of a child named `name` under `parent`.
pub fn join(parent: &str, name: &str) -> String {
    normalize(&format!("{parent}/{name}"))
}

/// Parent of a normalized key. The root is its own parent.
pub fn parent(key: &str) -> String {
    match key.rfind('/') {
        Some(0) | None => ROOT.to_string(),
        Some(idx) => key[..idx].to_string(),
    }
}

/// Display title of a normalized key: its last segment, or `/` for the root.
pub fn title(key: &str) -> &str {
    if key == ROOT {
        return ROOT;
    }
    key.rsplit('/').next().unwrap_or(key)
}

/// True when `key` is `ancestor` itself or lies beneath it.
pub fn is_within(key: &str, ancestor: &str) -> bool {
    if ancestor == ROOT {
        return true;
    }
    key == ancestor
        || key
            .strip_prefix(ancestor)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// Case-insensitive ordering used for sibling lists.
pub fn sort_key(key: &str) -> String {
    key.to_lowercase()
}
