//! Path scoping for tools that touch the filesystem.
//!
//! Every path a tool receives is resolved against the workspace root.
//! Relative paths are joined onto the root; absolute paths are accepted
//! only when they already live under it. `..` components are rejected
//! outright, and symlinks are resolved before the containment check.

use std::path::{Component, Path, PathBuf};
use stride_core::error::ToolError;

#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `path` to a location inside the workspace or fail with
    /// `PermissionDenied` attributed to `tool_name`.
    pub fn resolve(&self, tool_name: &str, path: &str) -> Result<PathBuf, ToolError> {
        let deny = |reason: String| ToolError::PermissionDenied {
            tool_name: tool_name.to_string(),
            reason,
        };

        if path.trim().is_empty() {
            return Err(ToolError::InvalidArguments("Path must not be empty".into()));
        }

        let requested = Path::new(path);
        if requested.components().any(|c| matches!(c, Component::ParentDir)) {
            return Err(deny(format!("Path traversal not allowed: {path}")));
        }

        let candidate = if requested.is_absolute() {
            requested.to_path_buf()
        } else {
            self.root.join(requested)
        };

        let root = self.root.canonicalize().unwrap_or_else(|_| self.root.clone());
        let resolved = canonicalize_lenient(&candidate);

        if !resolved.starts_with(&root) {
            return Err(deny(format!("Path is outside the workspace: {path}")));
        }
        Ok(resolved)
    }
}

/// Canonicalize the path, or its parent when the file does not exist yet.
fn canonicalize_lenient(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => canonicalize_lenient(parent).join(name),
        _ => path.to_path_buf(),
    }
}
