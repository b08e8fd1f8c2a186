use log::debug;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

pub(crate) const LOCK_FILE_NAME: &str = "coretex_node.lock";

#[derive(Debug, thiserror::Error)]
pub(crate) enum LockError {
    #[error("Another node operation is already running (lock held on {})", .0.display())]
    Held(PathBuf),
    #[error("Failed to open lock file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Exclusive advisory lock on the node's lock file, released when dropped.
/// The generated update script takes the same lock with `flock(1)`.
#[derive(Debug)]
pub(crate) struct NodeLock {
    file: File,
    path: PathBuf,
}

impl NodeLock {
    pub(crate) fn path_in(dir: &Path) -> PathBuf {
        dir.join(LOCK_FILE_NAME)
    }

    /// Fails fast instead of waiting when another process holds the lock.
    pub(crate) fn acquire(dir: &Path) -> Result<Self, LockError> {
        let path = Self::path_in(dir);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|source| LockError::Io {
                path: path.clone(),
                source,
            })?;

        let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if result != 0 {
            let source = io::Error::last_os_error();
            if source.kind() == io::ErrorKind::WouldBlock {
                return Err(LockError::Held(path));
            }
            return Err(LockError::Io { path, source });
        }

        debug!("Acquired node lock {path:?}");
        Ok(Self { file, path })
    }
}

impl Drop for NodeLock {
    fn drop(&mut self) {
        unsafe {
            libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
        }
        debug!("Released node lock {:?}", self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_second_acquire_fails_until_released() {
        let dir = TempDir::new().unwrap();

        let lock = NodeLock::acquire(dir.path()).unwrap();
        assert!(matches!(
            NodeLock::acquire(dir.path()),
            Err(LockError::Held(_))
        ));

        drop(lock);
        assert!(NodeLock::acquire(dir.path()).is_ok());
    }

    #[test]
    fn test_lock_file_location() {
        let dir = TempDir::new().unwrap();
        let _lock = NodeLock::acquire(dir.path()).unwrap();
        assert!(dir.path().join("coretex_node.lock").exists());
    }

    #[test]
    fn test_missing_directory() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("absent");
        assert!(matches!(
            NodeLock::acquire(&missing),
            Err(LockError::Io { .. })
        ));
    }
}
