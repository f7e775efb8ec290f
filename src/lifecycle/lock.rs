//! Singleton guard
//!
//! At most one server runs per identity. The guard holds a non-blocking
//! exclusive `flock` on the identity's lock file for the life of the process;
//! the kernel releases it on exit or crash, so no explicit unlock is needed.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};

use crate::error::{Error, Result};

/// Exclusive lock proving this process is the only server for its identity
pub struct SingletonGuard {
    path: PathBuf,
    _lock: Flock<File>,
}

impl std::fmt::Debug for SingletonGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingletonGuard").field("path", &self.path).finish()
    }
}

impl SingletonGuard {
    /// Open or create the lock file and take the exclusive lock
    ///
    /// Fails with [`Error::AlreadyRunning`] without waiting when another
    /// process holds the lock. Nothing else is touched in that case.
    pub fn acquire(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .mode(0o777)
            .open(&path)
            .map_err(|source| Error::LockFile {
                path: path.clone(),
                source,
            })?;

        match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(lock) => {
                tracing::debug!(lock = %path.display(), "Singleton lock acquired");
                Ok(Self { path, _lock: lock })
            }
            Err((_, Errno::EWOULDBLOCK)) => Err(Error::AlreadyRunning { lock: path }),
            Err((_, errno)) => Err(Error::LockFile {
                path,
                source: errno.into(),
            }),
        }
    }

    /// Path of the lock file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_creates_lock_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fanout.test.lock");

        let guard = SingletonGuard::acquire(&path).unwrap();
        assert!(path.exists());
        assert_eq!(guard.path(), path);
    }

    #[test]
    fn test_second_acquire_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fanout.test.lock");
        let pid_file = dir.path().join("fanout.test.pid");
        std::fs::write(&pid_file, "1234").unwrap();

        let _guard = SingletonGuard::acquire(&path).unwrap();
        let second = SingletonGuard::acquire(&path);
        assert!(matches!(second, Err(Error::AlreadyRunning { .. })));

        // Existing instance's files are untouched
        assert!(path.exists());
        assert_eq!(std::fs::read_to_string(&pid_file).unwrap(), "1234");
    }

    #[test]
    fn test_lock_released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fanout.test.lock");

        let guard = SingletonGuard::acquire(&path).unwrap();
        drop(guard);

        assert!(SingletonGuard::acquire(&path).is_ok());
    }
}
