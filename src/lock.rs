//! Single-instance guard
//!
//! Holds an exclusive PID file for the daemon's lifetime so that a second
//! daemon refuses to start. Stale locks left by a crashed process (dead PID)
//! are reclaimed on the next acquire.

use crate::error::LockError;
use pidlock::Pidlock;
use std::path::{Path, PathBuf};

/// Exclusive per-user daemon lock backed by a PID file.
///
/// Acquire fails immediately when the lock is held elsewhere; there is no
/// waiting or retry. Release removes the PID file so a future process can
/// acquire it, and is safe to call more than once.
pub struct SingleInstanceGuard {
    lock: Pidlock,
    path: PathBuf,
    held: bool,
}

impl SingleInstanceGuard {
    /// Try to acquire the lock at `path`, creating parent directories first.
    pub fn acquire(path: &Path) -> Result<Self, LockError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LockError::LockFile {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        }

        let mut lock = Pidlock::new(&path.to_string_lossy());
        match lock.acquire() {
            Ok(()) => {
                tracing::debug!(
                    "Acquired instance lock: {:?} (pid={})",
                    path,
                    std::process::id()
                );
                Ok(Self {
                    lock,
                    path: path.to_path_buf(),
                    held: true,
                })
            }
            Err(pidlock::PidlockError::LockExists) => {
                Err(LockError::AlreadyRunning(path.display().to_string()))
            }
            Err(e) => Err(LockError::LockFile {
                path: path.display().to_string(),
                reason: format!("{:?}", e),
            }),
        }
    }

    /// Release the lock and remove the PID file. Safe to call repeatedly,
    /// including during shutdown after a partial acquisition failure.
    pub fn release(&mut self) {
        if !self.held {
            return;
        }
        self.held = false;
        if let Err(e) = self.lock.release() {
            tracing::warn!("Failed to release instance lock {:?}: {:?}", self.path, e);
        } else {
            tracing::debug!("Released instance lock: {:?}", self.path);
        }
    }

    /// Whether this guard currently holds the lock
    pub fn is_held(&self) -> bool {
        self.held
    }
}

impl Drop for SingleInstanceGuard {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_release_reacquire() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("voxd.pid");

        let mut guard = SingleInstanceGuard::acquire(&path).unwrap();
        assert!(guard.is_held());
        assert!(path.exists());

        guard.release();
        assert!(!guard.is_held());
        assert!(!path.exists());

        // A new acquire succeeds after release
        let guard2 = SingleInstanceGuard::acquire(&path).unwrap();
        assert!(guard2.is_held());
    }

    #[test]
    fn second_acquire_fails_while_held() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("voxd.pid");

        let _guard = SingleInstanceGuard::acquire(&path).unwrap();

        // Our own PID is alive, so the lock is not stale
        match SingleInstanceGuard::acquire(&path) {
            Err(LockError::AlreadyRunning(p)) => {
                assert!(p.contains("voxd.pid"));
            }
            other => panic!("expected AlreadyRunning, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn release_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("voxd.pid");

        let mut guard = SingleInstanceGuard::acquire(&path).unwrap();
        guard.release();
        guard.release();
        assert!(!guard.is_held());
    }

    #[test]
    fn drop_releases_lock() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("voxd.pid");

        {
            let _guard = SingleInstanceGuard::acquire(&path).unwrap();
            assert!(path.exists());
        }
        assert!(!path.exists());

        // Reacquire works after drop
        let _guard = SingleInstanceGuard::acquire(&path).unwrap();
    }
}
