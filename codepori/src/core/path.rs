//! Sanitization of model-proposed relative paths.

use std::path::{Component, Path, PathBuf};

use anyhow::{Result, anyhow};

/// Turn a model-provided path into a relative path that stays under the output root.
///
/// Surrounding whitespace and leading `/` or `\` separators are stripped and `.`
/// components are dropped. Empty results and `..` components are rejected.
pub fn sanitize_relative(raw: &str) -> Result<PathBuf> {
    let stripped = raw.trim().trim_start_matches(['/', '\\']);
    let mut clean = PathBuf::new();
    for component in Path::new(stripped).components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(anyhow!("path {raw:?} escapes the output root"));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(anyhow!("path {raw:?} is not relative"));
            }
        }
    }
    if clean.as_os_str().is_empty() {
        return Err(anyhow!("path {raw:?} is empty"));
    }
    Ok(clean)
}
