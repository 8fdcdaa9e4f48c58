//! Translation between canonical (network) paths and local replica paths.
//!
//! Canonical paths are `/`-separated strings. Backslashes in canonical input
//! are accepted and normalised. Prefixes are only ever matched on whole
//! segments, so `/root/Ab` is not under `/root/A`.

use crate::error::VaultError;
use crate::utils::paths::{slash_join, slash_parent};
use anyhow::Result;
use std::path::{Component, Path, PathBuf};

fn normalise(path: &str) -> String {
    let slashed = path.replace('\\', "/");
    let trimmed = slashed.trim_end_matches('/');
    if trimmed.is_empty() && slashed.starts_with('/') {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Part of `path` below `root`, without a leading separator.
pub fn strip_root<'a>(path: &'a str, root: &str) -> Option<&'a str> {
    if root.is_empty() {
        return Some(path.trim_start_matches('/'));
    }
    let rest = path.strip_prefix(root)?;
    if rest.is_empty() {
        Some(rest)
    } else if root.ends_with('/') {
        Some(rest)
    } else {
        rest.strip_prefix('/')
    }
}

fn mapping_error(path: &str, root: &str) -> anyhow::Error {
    VaultError::Mapping {
        path: path.to_string(),
        root: root.to_string(),
    }
    .into()
}

/// Maps a canonical path into the local replica rooted at `local_root`.
///
/// # Errors
///
/// Returns [`VaultError::Mapping`] if `canonical` is not under `common_root`.
pub fn to_local(canonical: &str, common_root: &str, local_root: &Path) -> Result<PathBuf> {
    let path = normalise(canonical);
    let root = normalise(common_root);
    let rest = strip_root(&path, &root).ok_or_else(|| mapping_error(canonical, common_root))?;

    let mut local = local_root.to_path_buf();
    local.extend(rest.split('/').filter(|s| !s.is_empty()));
    Ok(local)
}

/// Maps a local replica path back to its canonical path.
///
/// # Errors
///
/// Returns [`VaultError::Mapping`] if `local` is not under `local_root`.
pub fn to_canonical(local: &Path, common_root: &str, local_root: &Path) -> Result<String> {
    let rest = local.strip_prefix(local_root).map_err(|_| {
        mapping_error(&local.to_string_lossy(), &local_root.to_string_lossy())
    })?;

    let mut canonical = normalise(common_root);
    for component in rest.components() {
        match component {
            Component::Normal(segment) => {
                canonical = slash_join(&canonical, &segment.to_string_lossy());
            }
            Component::CurDir => {}
            _ => return Err(mapping_error(&local.to_string_lossy(), &local_root.to_string_lossy())),
        }
    }
    Ok(canonical)
}

/// Longest common `/`-separated prefix of `paths`.
///
/// Returns an empty string for an empty set or when nothing is shared.
pub fn common_root<I, S>(paths: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut shared: Option<Vec<String>> = None;

    for path in paths {
        let path = normalise(path.as_ref());
        let segments: Vec<&str> = path.split('/').collect();
        shared = Some(match shared {
            None => segments.iter().map(|s| (*s).to_string()).collect(),
            Some(mut prefix) => {
                let keep = prefix
                    .iter()
                    .zip(&segments)
                    .take_while(|(a, b)| a.as_str() == **b)
                    .count();
                prefix.truncate(keep);
                prefix
            }
        });
    }

    match shared {
        Some(segments) if segments == [""] || segments.is_empty() => String::new(),
        Some(segments) if segments == ["", ""] => "/".to_string(),
        Some(segments) => segments.join("/"),
        None => String::new(),
    }
}

/// Root the project tree hangs from: the common root of the parent
/// directories of all indexed paths.
///
/// For a scanned tree this is the directory that was scanned.
pub fn project_root<'a, I>(paths: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    common_root(
        paths
            .into_iter()
            .map(normalise)
            .filter_map(|path| slash_parent(&path).map(str::to_string)),
    )
}
