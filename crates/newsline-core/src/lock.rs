use crate::error::StoreError;
use fs2::FileExt;
use std::{
    fs::{self, File, OpenOptions},
    io,
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

/// RAII guard for the exclusive advisory lock held across one
/// load-assign-save cycle of the sequence store.
///
/// The lock lives in a sidecar file so the state file itself can be replaced
/// atomically while the lock is held.
#[derive(Debug)]
pub struct CycleLock {
    file: File,
    path: PathBuf,
}

impl CycleLock {
    /// Acquire an exclusive advisory lock on `path`, polling until `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::LockTimeout`] if another holder keeps the lock
    /// past `timeout`, or [`StoreError::Lock`] if the lock file cannot be
    /// created.
    pub fn acquire(path: &Path, timeout: Duration) -> Result<Self, StoreError> {
        let parent = path.parent().ok_or_else(|| {
            StoreError::Lock(io::Error::new(
                io::ErrorKind::InvalidInput,
                "lock path has no parent",
            ))
        })?;
        fs::create_dir_all(parent).map_err(StoreError::Lock)?;

        let start = Instant::now();
        loop {
            let file = OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .truncate(false)
                .open(path)
                .map_err(StoreError::Lock)?;

            if file.try_lock_exclusive().is_ok() {
                return Ok(Self {
                    file,
                    path: path.to_path_buf(),
                });
            }

            if start.elapsed() >= timeout {
                return Err(StoreError::LockTimeout {
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
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for CycleLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::CycleLock;
    use crate::error::{ErrorCode, StoreError};
    use std::{
        sync::{Arc, Barrier},
        thread,
        time::Duration,
    };

    #[test]
    fn lock_allows_acquire_and_release() -> Result<(), StoreError> {
        let dir = tempfile::tempdir().map_err(StoreError::Lock)?;
        let path = dir.path().join("basic.lock");
        let lock = CycleLock::acquire(&path, Duration::from_millis(50))?;
        assert_eq!(lock.path(), path.as_path());
        lock.release();

        let again = CycleLock::acquire(&path, Duration::from_millis(50))?;
        again.release();
        Ok(())
    }

    #[test]
    fn lock_times_out_when_held() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("timeout.lock");
        let _guard = CycleLock::acquire(&path, Duration::from_millis(50)).expect("first lock");
        let err = CycleLock::acquire(&path, Duration::from_millis(20)).expect_err("must time out");

        assert_eq!(err.code(), ErrorCode::LockContention);
        assert!(matches!(err, StoreError::LockTimeout { path: p, .. } if p == path));
    }

    #[test]
    fn contention_is_resolved_after_holder_releases() -> Result<(), StoreError> {
        let dir = tempfile::tempdir().map_err(StoreError::Lock)?;
        let path = dir.path().join("thread.lock");

        let held = Arc::new(Barrier::new(2));
        let done = Arc::new(Barrier::new(2));

        let held_thread = Arc::clone(&held);
        let done_thread = Arc::clone(&done);
        let path_in_thread = path.clone();
        let handle = thread::spawn(move || {
            let _holder = CycleLock::acquire(&path_in_thread, Duration::from_millis(200))
                .expect("holder lock");
            held_thread.wait();
            done_thread.wait();
        });

        held.wait();
        assert!(matches!(
            CycleLock::acquire(&path, Duration::from_millis(20)),
            Err(StoreError::LockTimeout { .. })
        ));
        done.wait();
        handle.join().expect("holder thread");

        let follow_up = CycleLock::acquire(&path, Duration::from_millis(50))?;
        follow_up.release();
        Ok(())
    }
}
