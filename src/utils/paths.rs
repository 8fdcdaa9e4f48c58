use std::path::Path;

/// Renders a path with `/` separators, the form canonical index keys use.
#[must_use]
pub fn to_slash(path: &Path) -> String {
    let text = path.to_string_lossy();
    if std::path::MAIN_SEPARATOR == '/' {
        text.into_owned()
    } else {
        text.replace(std::path::MAIN_SEPARATOR, "/")
    }
}

/// Parent of a `/`-separated path, `None` for a single segment.
#[must_use]
pub fn slash_parent(path: &str) -> Option<&str> {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) => Some("/"),
        Some(i) => Some(&trimmed[..i]),
        None => None,
    }
}

/// Joins a segment onto a `/`-separated path.
#[must_use]
pub fn slash_join(base: &str, segment: &str) -> String {
    let segment = segment.trim_start_matches('/');
    if base.is_empty() {
        segment.to_string()
    } else if base.ends_with('/') {
        format!("{base}{segment}")
    } else {
        format!("{base}/{segment}")
    }
}
