//! In-process serialization of state-mutating runs per working directory.
//!
//! Only callers sharing one [`DirLocks`] are serialized. Separate processes still
//! rely on the engine's own state lock.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Condvar, Mutex, PoisonError};

use tracing::debug;

#[derive(Debug, Default)]
pub struct DirLocks {
    busy: Mutex<HashSet<PathBuf>>,
    released: Condvar,
}

/// Holds one directory until dropped.
#[derive(Debug)]
pub struct DirGuard<'a> {
    locks: &'a DirLocks,
    key: PathBuf,
}

impl DirLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until `dir` is free, then hold it until the guard drops.
    pub fn lock(&self, dir: &Path) -> DirGuard<'_> {
        let key = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
        let mut busy = self.busy.lock().unwrap_or_else(PoisonError::into_inner);
        while busy.contains(&key) {
            debug!(dir = %key.display(), "waiting for directory lock");
            busy = self
                .released
                .wait(busy)
                .unwrap_or_else(PoisonError::into_inner);
        }
        busy.insert(key.clone());
        DirGuard { locks: self, key }
    }

    pub fn is_locked(&self, dir: &Path) -> bool {
        let key = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
        self.busy
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&key)
    }
}

impl Drop for DirGuard<'_> {
    fn drop(&mut self) {
        let mut busy = self
            .locks
            .busy
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        busy.remove(&self.key);
        self.locks.released.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn guard_releases_on_drop() {
        let temp = tempfile::tempdir().expect("tempdir");
        let locks = DirLocks::new();
        {
            let _guard = locks.lock(temp.path());
            assert!(locks.is_locked(temp.path()));
        }
        assert!(!locks.is_locked(temp.path()));
    }

    #[test]
    fn same_directory_runs_one_at_a_time() {
        let temp = tempfile::tempdir().expect("tempdir");
        let locks = DirLocks::new();
        let active = AtomicUsize::new(0);
        let max_seen = AtomicUsize::new(0);

        thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    let _guard = locks.lock(temp.path());
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(20));
                    active.fetch_sub(1, Ordering::SeqCst);
                });
            }
        });

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn different_directories_do_not_block() {
        let a = tempfile::tempdir().expect("tempdir");
        let b = tempfile::tempdir().expect("tempdir");
        let locks = DirLocks::new();

        let _first = locks.lock(a.path());
        let _second = locks.lock(b.path());
        assert!(locks.is_locked(a.path()));
        assert!(locks.is_locked(b.path()));
    }
}
