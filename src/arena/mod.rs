//! Request-scoped temporary storage.
//!
//! Every request that needs filesystem space opens one [`RequestScope`]
//! through an [`Arena`]. The scope owns a uniquely named directory under the
//! arena base; nested directories are allocated with [`RequestScope::subdir`]
//! and everything is removed when the scope closes. Cleanup is RAII-backed:
//! dropping a scope (normal return, `?`, panic, task cancellation) removes
//! the directory tree best-effort, so no request can leak storage.
//!
//! Uniqueness comes from UUID v4 identifiers rather than counters, so
//! concurrent requests never contend for the same directory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::api::logs::log_warning;
use crate::error::{ArenaError, ArenaResult};

/// Factory for request-scoped working directories.
#[derive(Debug, Clone)]
pub struct Arena {
    base: PathBuf,
}

impl Arena {
    /// Create an arena rooted at `base`. The directory is created lazily
    /// on the first [`Arena::open`].
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// Base directory under which scopes are allocated.
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Allocate a fresh, collision-free working directory.
    pub fn open(&self) -> ArenaResult<RequestScope> {
        fs::create_dir_all(&self.base).map_err(ArenaError::Io)?;
        let id = Uuid::new_v4().to_string();
        let root = self.base.join(&id);
        fs::create_dir(&root).map_err(ArenaError::Io)?;
        Ok(RequestScope {
            id,
            root,
            closed: false,
        })
    }
}

/// An exclusively owned working directory for a single request.
///
/// The directory tree is removed exactly once: either by [`RequestScope::close`]
/// or by `Drop`, whichever comes first. Removal errors never mask the
/// primary result; a leaked directory is reported as a log warning.
#[derive(Debug)]
pub struct RequestScope {
    id: String,
    root: PathBuf,
    closed: bool,
}

impl RequestScope {
    /// Opaque unique identifier of this scope.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Root directory owned by this scope.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Allocate a nested directory on demand. Lives under the scope root,
    /// so it is covered by the single recursive removal on close.
    pub fn subdir(&self, name: &str) -> io::Result<PathBuf> {
        let dir = self.root.join(name);
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Deterministically close the scope, removing its directory tree.
    pub fn close(mut self) {
        self.cleanup();
    }

    fn cleanup(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        // Best-effort: a failed removal must not crash the request, but a
        // leaked directory is worth a warning.
        if let Err(e) = fs::remove_dir_all(&self.root) {
            log_warning(format!("scope {}: cleanup failed: {e}", self.id));
        }
    }
}

impl Drop for RequestScope {
    fn drop(&mut self) {
        self.cleanup();
    }
}
