//! Cross-process advisory lock gating a full run.

use std::fs::{File, OpenOptions};
use std::path::PathBuf;

use fs4::FileExt as _;

use crate::errors::*;

/// Holds the lock file open for the lifetime of the guard; the lock is
/// released when the guard is dropped, including during unwind.
pub struct LockGuard {
    _file: File,
}

pub struct FileLock {
    path: PathBuf,
}

impl FileLock {
    pub fn new(name: &str) -> Self {
        Self {
            path: std::env::temp_dir().join(name),
        }
    }

    /// Blocks until the lock is acquired.
    pub fn acquire(&self) -> Result<LockGuard> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&self.path)
            .with_context(|| format!("opening lock file {}", self.path.display()))?;
        file.lock_exclusive()
            .with_context(|| format!("acquiring lock on {}", self.path.display()))?;
        tracing::debug!("lock acquired: {}", self.path.display());
        Ok(LockGuard { _file: file })
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = self._file.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_and_release_does_not_panic() {
        let lock = FileLock::new("seedhelper-test.lock");
        let guard = lock.acquire().unwrap();
        drop(guard);
        let guard2 = lock.acquire().unwrap();
        drop(guard2);
    }
}
