//! Path Guard - Confines Filesystem Access to One Root
//!
//! Every path a caller can influence passes through [`PathGuard::validate`]
//! before any filesystem operation. The only way to obtain a
//! [`CanonicalPath`] is through the guard, so code holding one has proof
//! that the path lies under the allowed root.
//!
//! # Security Model
//!
//! - The root is canonicalized once, at construction
//! - ".." components (and raw "../" sequences) are denied outright
//! - Symlinks are resolved and the resolved form is checked
//! - Containment is a component-wise prefix check on canonical paths, so a
//!   sibling such as `/srv/files_old` never matches a root of `/srv/files`
//! - Paths that do not exist yet resolve through their deepest existing
//!   ancestor; a dangling symlink anywhere on the way is a violation
//! - Rejections never echo the requested path or the root

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Startup failure for the allowed root. Fatal; never raised per request.
#[derive(Debug, thiserror::Error)]
pub enum RootError {
    #[error("ALLOWED_ROOT is not set")]
    Unset,

    #[error("ALLOWED_ROOT must be an absolute path, got '{0}'")]
    Relative(PathBuf),

    #[error("ALLOWED_ROOT '{path}' is not accessible: {source}")]
    Inaccessible {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("ALLOWED_ROOT '{0}' is not a directory")]
    NotADirectory(PathBuf),
}

/// Why a path was rejected. Only used for logs and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationReason {
    Empty,
    Traversal,
    OutsideRoot,
    Unresolvable,
}

/// A requested path failed confinement.
///
/// Displays as a fixed message so that neither the attempted path nor the
/// root leak to clients.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid path")]
pub struct PathViolation {
    reason: ViolationReason,
}

impl PathViolation {
    fn new(reason: ViolationReason) -> Self {
        Self { reason }
    }

    pub fn reason(&self) -> ViolationReason {
        self.reason
    }
}

/// An absolute, symlink-free path proven to lie under the allowed root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalPath {
    path: PathBuf,
    relative: PathBuf,
}

impl CanonicalPath {
    pub fn as_path(&self) -> &Path {
        &self.path
    }

    /// Path relative to the allowed root (empty for the root itself)
    pub fn relative(&self) -> &Path {
        &self.relative
    }

    pub fn is_root(&self) -> bool {
        self.relative.as_os_str().is_empty()
    }
}

impl AsRef<Path> for CanonicalPath {
    fn as_ref(&self) -> &Path {
        &self.path
    }
}

/// Validates paths against a single allowed root
#[derive(Debug, Clone)]
pub struct PathGuard {
    /// Canonicalized root
    root: PathBuf,
}

impl PathGuard {
    /// Create a guard for `root`.
    ///
    /// The root must be a non-empty absolute path naming an existing
    /// directory.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, RootError> {
        let root = root.as_ref();
        if root.as_os_str().is_empty() {
            return Err(RootError::Unset);
        }
        if !root.is_absolute() {
            return Err(RootError::Relative(root.to_path_buf()));
        }

        let canonical = root.canonicalize().map_err(|source| RootError::Inaccessible {
            path: root.to_path_buf(),
            source,
        })?;
        if !canonical.is_dir() {
            return Err(RootError::NotADirectory(root.to_path_buf()));
        }

        Ok(Self { root: canonical })
    }

    /// The canonical root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Check for explicit traversal attempts in the raw path
    fn contains_traversal(path: &Path) -> bool {
        let raw = path.to_string_lossy();
        raw.contains("../")
            || raw.contains("..\\")
            || path.components().any(|c| matches!(c, Component::ParentDir))
    }

    /// Validate a path that may or may not exist yet.
    ///
    /// Relative paths are taken relative to the root. Returns the canonical
    /// form on success.
    pub fn validate(&self, requested: impl AsRef<Path>) -> Result<CanonicalPath, PathViolation> {
        let requested = requested.as_ref();
        let result = self.resolve(requested);
        if let Err(violation) = &result {
            debug!(
                path = %requested.display(),
                reason = ?violation.reason(),
                "Path rejected"
            );
        }
        result
    }

    /// Validate a path that must already exist.
    pub fn validate_existing(
        &self,
        requested: impl AsRef<Path>,
    ) -> Result<CanonicalPath, PathViolation> {
        let canonical = self.validate(requested)?;
        if fs::symlink_metadata(canonical.as_path()).is_err() {
            return Err(PathViolation::new(ViolationReason::Unresolvable));
        }
        Ok(canonical)
    }

    fn resolve(&self, requested: &Path) -> Result<CanonicalPath, PathViolation> {
        if requested.as_os_str().is_empty() || requested.to_string_lossy().contains('\0') {
            return Err(PathViolation::new(ViolationReason::Empty));
        }
        if Self::contains_traversal(requested) {
            return Err(PathViolation::new(ViolationReason::Traversal));
        }

        let absolute = if requested.is_absolute() {
            requested.to_path_buf()
        } else {
            self.root.join(requested)
        };

        // Walk up to the deepest ancestor that exists, remembering the
        // missing tail so it can be re-attached to the canonical base.
        let mut tail: Vec<OsString> = Vec::new();
        let mut cursor = absolute.as_path();
        let base = loop {
            match cursor.canonicalize() {
                Ok(canonical) => break canonical,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    // Dangling symlink: exists as a link, target does not
                    if fs::symlink_metadata(cursor).is_ok() {
                        return Err(PathViolation::new(ViolationReason::Unresolvable));
                    }
                    let name = cursor
                        .file_name()
                        .ok_or(PathViolation::new(ViolationReason::Unresolvable))?;
                    tail.push(name.to_os_string());
                    cursor = cursor
                        .parent()
                        .ok_or(PathViolation::new(ViolationReason::Unresolvable))?;
                }
                Err(_) => return Err(PathViolation::new(ViolationReason::Unresolvable)),
            }
        };

        let mut canonical = base;
        for name in tail.into_iter().rev() {
            canonical.push(name);
        }

        let relative = canonical
            .strip_prefix(&self.root)
            .map_err(|_| PathViolation::new(ViolationReason::OutsideRoot))?
            .to_path_buf();

        Ok(CanonicalPath {
            path: canonical,
            relative,
        })
    }
}
