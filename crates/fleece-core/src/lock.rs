use crate::error::{FleeceError, Result};
use fs2::FileExt;
use std::{
    fs::{self, File, OpenOptions},
    io,
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

/// Lock file name inside `.fleece/`, used outside a git working copy.
pub const SYNC_LOCK_FILE: &str = "sync.lock";

/// Lock file name inside the working copy's `.git` directory.
pub const GIT_DIR_LOCK_FILE: &str = "fleece-sync.lock";

/// RAII guard serializing `fleece` processes that mutate the same checkout.
///
/// Within one process the write queue already orders writes; this advisory
/// lock covers two CLI invocations racing on one working copy (two `sync`
/// runs, or a `create` during a `sync`). Released on drop.
#[derive(Debug)]
pub struct SyncLock {
    file: File,
    path: PathBuf,
}

impl SyncLock {
    /// Acquire the exclusive lock at `<fleece_dir>/sync.lock`, polling until
    /// `timeout` elapses.
    pub fn acquire_in(fleece_dir: &Path, timeout: Duration) -> Result<Self> {
        Self::acquire(&fleece_dir.join(SYNC_LOCK_FILE), timeout)
    }

    /// Acquire an exclusive advisory lock on `path`.
    pub fn acquire(path: &Path, timeout: Duration) -> Result<Self> {
        let parent = path.parent().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "lock path has no parent")
        })?;
        fs::create_dir_all(parent)?;

        let start = Instant::now();
        loop {
            let file = OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .truncate(false)
                .open(path)?;

            if FileExt::try_lock_exclusive(&file).is_ok() {
                tracing::debug!(path = %path.display(), "acquired sync lock");
                return Ok(Self {
                    file,
                    path: path.to_path_buf(),
                });
            }

            if start.elapsed() >= timeout {
                return Err(FleeceError::LockTimeout {
                    path: path.to_path_buf(),
                    waited: start.elapsed(),
                });
            }

            thread::sleep(Duration::from_millis(10));
        }
    }

    /// Explicitly release the lock. Release also happens automatically on drop.
    pub fn release(self) {
        drop(self);
    }

    /// Return the lock file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SyncLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::SyncLock;
    use crate::error::{ErrorCode, FleeceError};
    use std::{
        sync::{Arc, Barrier},
        thread,
        time::Duration,
    };

    #[test]
    fn sync_lock_allows_acquire_and_release() -> Result<(), FleeceError> {
        let dir = tempfile::tempdir()?;
        let lock = SyncLock::acquire_in(dir.path(), Duration::from_millis(50))?;
        assert_eq!(lock.path(), dir.path().join("sync.lock").as_path());
        lock.release();
        Ok(())
    }

    #[test]
    fn sync_lock_times_out_when_held() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("timeout.lock");
        let _guard = SyncLock::acquire(&path, Duration::from_millis(50)).unwrap();
        let err = SyncLock::acquire(&path, Duration::from_millis(20)).unwrap_err();

        assert_eq!(err.code(), ErrorCode::LockContention);
        assert!(matches!(err, FleeceError::LockTimeout { path: p, .. } if p == path));
    }

    #[test]
    fn lock_release_allows_follow_up_lock() -> Result<(), FleeceError> {
        let dir = tempfile::tempdir()?;
        {
            let _first = SyncLock::acquire_in(dir.path(), Duration::from_millis(50))?;
        }

        let _second = SyncLock::acquire_in(dir.path(), Duration::from_millis(50))?;
        Ok(())
    }

    #[test]
    fn creates_missing_parent_directory() -> Result<(), FleeceError> {
        let dir = tempfile::tempdir()?;
        let nested = dir.path().join("repo").join(".fleece");
        let lock = SyncLock::acquire_in(&nested, Duration::from_millis(50))?;
        assert!(nested.is_dir());
        drop(lock);
        Ok(())
    }

    #[test]
    fn contention_is_resolved_after_holder_releases() -> Result<(), FleeceError> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("thread.lock");

        let blocker = Arc::new(Barrier::new(2));
        let waiter = Arc::new(Barrier::new(2));

        let blocker_thread = Arc::clone(&blocker);
        let waiter_thread = Arc::clone(&waiter);
        let path_in_thread = path.clone();
        let handle = thread::spawn(move || {
            let _holder = SyncLock::acquire(&path_in_thread, Duration::from_millis(200)).unwrap();
            blocker_thread.wait();
            waiter_thread.wait();
        });

        blocker.wait();
        assert!(matches!(
            SyncLock::acquire(&path, Duration::from_millis(20)),
            Err(FleeceError::LockTimeout { .. })
        ));
        waiter.wait();
        handle.join().unwrap();

        let follow_up = SyncLock::acquire(&path, Duration::from_millis(50))?;
        follow_up.release();
        Ok(())
    }
}
