//! Two-layer mutual exclusion around the state document.
//!
//! An async mutex serializes tasks of this process, then an exclusive
//! `flock` on a dedicated lock file serializes cooperating processes. Both are
//! always taken in that order and released in the reverse order.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use fs2::FileExt;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::{JobqError, Result};

#[derive(Debug, Clone)]
pub struct CoordinationLock {
    local: Arc<Mutex<()>>,
    lock_path: PathBuf,
}

/// Held for the duration of one transaction. Dropping it releases the
/// advisory lock first, then the in-process mutex.
#[derive(Debug)]
pub struct LockGuard {
    file: File,
    _local: OwnedMutexGuard<()>,
}

impl CoordinationLock {
    pub fn new(lock_path: PathBuf) -> Self {
        Self {
            local: Arc::new(Mutex::new(())),
            lock_path,
        }
    }

    /// Blocks until both locks are held. There is no timeout; the kernel
    /// drops the `flock` if a holder exits without releasing it.
    pub async fn acquire(&self) -> Result<LockGuard> {
        let local = self.local.clone().lock_owned().await;

        let path = self.lock_path.clone();
        let file = tokio::task::spawn_blocking(move || -> io::Result<File> {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&path)?;
            FileExt::lock_exclusive(&file)?;
            Ok(file)
        })
        .await
        .map_err(|e| JobqError::Internal(format!("lock task failed: {}", e)))??;

        tracing::trace!(path = %self.lock_path.display(), "Acquired coordination lock");

        Ok(LockGuard {
            file,
            _local: local,
        })
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(error = %e, "Failed to release advisory lock");
        }
    }
}
