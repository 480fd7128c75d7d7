//! File-based locking for single-writer safety.
//!
//! Cross-platform (fs2) advisory locks around the store file. The lock file
//! is a sibling of the store (`<store>.lock`) so recovery can rename the
//! store itself while no writer is active. Lock is released on Drop.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::ffi::OsString;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

pub struct LockGuard {
    file: std::fs::File,
    path: PathBuf,
}

impl LockGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        // fs2 unlock errors on drop are ignored deliberately.
        let _ = self.file.unlock();
    }
}

fn lock_file_path(target: &Path) -> PathBuf {
    let mut os = OsString::from(target.as_os_str());
    os.push(".lock");
    PathBuf::from(os)
}

fn open_lock_file(target: &Path) -> Result<(std::fs::File, PathBuf)> {
    let path = lock_file_path(target);
    let f = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(&path)
        .with_context(|| format!("open lock file {}", path.display()))?;
    Ok((f, path))
}

/// Acquire an exclusive lock next to `target`. Blocks until acquired.
pub fn acquire_exclusive(target: &Path) -> Result<LockGuard> {
    let (file, path) = open_lock_file(target)?;
    file.lock_exclusive()
        .with_context(|| format!("lock_exclusive {}", path.display()))?;
    Ok(LockGuard { file, path })
}

/// Try to acquire an exclusive lock next to `target`. Returns Err if some
/// other process already holds it.
pub fn try_acquire_exclusive(target: &Path) -> Result<LockGuard> {
    let (file, path) = open_lock_file(target)?;
    file.try_lock_exclusive()
        .with_context(|| format!("store is locked by another process ({})", path.display()))?;
    Ok(LockGuard { file, path })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn unique_target(prefix: &str) -> PathBuf {
        let pid = std::process::id();
        let t = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("regfile-{}-{}-{}", prefix, pid, t))
    }

    #[test]
    fn exclusive_lock_excludes_second_holder() {
        let target = unique_target("lock");
        let g1 = try_acquire_exclusive(&target).expect("first lock");
        assert!(try_acquire_exclusive(&target).is_err());
        drop(g1);
        let g2 = try_acquire_exclusive(&target).expect("relock after drop");
        drop(g2);
    }
}
