//! Files announcing a running daemon
//!
//! Besides the lock file holding its PID, the daemon writes its port to a
//! `port` file in the same directory, so a second launch on the same host
//! can report the running instance instead of starting another one.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use gebr_core::lockfile::{is_process_alive, read_lock_file, LockFileGuard};

const PORT_FILE_NAME: &str = "port";

/// Port file next to `lock_path`
pub fn port_path(lock_path: &Path) -> PathBuf {
    lock_path.with_file_name(PORT_FILE_NAME)
}

/// Port of a live daemon recorded at `lock_path`, if any
pub fn running_port(lock_path: &Path) -> io::Result<Option<u16>> {
    let Some(pid) = read_lock_file(lock_path)? else {
        return Ok(None);
    };
    if !is_process_alive(pid) {
        tracing::debug!("Stale lock file {:?} (pid {})", lock_path, pid);
        return Ok(None);
    }
    match fs::read_to_string(port_path(lock_path)) {
        Ok(contents) => Ok(contents.trim().parse().ok()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Lock and port files of this process, removed on drop
pub struct Instance {
    _lock: LockFileGuard,
    port_path: PathBuf,
}

impl Instance {
    pub fn create(lock_path: PathBuf, pid: u32, port: u16) -> io::Result<Self> {
        let lock = LockFileGuard::new(lock_path, pid)?;
        let port_path = port_path(lock.path());
        fs::write(&port_path, format!("{}\n", port))?;
        Ok(Self {
            _lock: lock,
            port_path,
        })
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.port_path) {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!("Failed to remove port file {:?}: {}", self.port_path, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_instance_reports_its_port() {
        let dir = TempDir::new().unwrap();
        let lock = dir.path().join("gebrd/node1/lock");

        assert_eq!(running_port(&lock).unwrap(), None);

        let instance = Instance::create(lock.clone(), std::process::id(), 4312).unwrap();
        assert_eq!(running_port(&lock).unwrap(), Some(4312));

        drop(instance);
        assert!(!lock.exists());
        assert!(!port_path(&lock).exists());
        assert_eq!(running_port(&lock).unwrap(), None);
    }

    #[test]
    fn test_dead_pid_is_ignored() {
        let dir = TempDir::new().unwrap();
        let lock = dir.path().join("lock");
        fs::write(&lock, "999999999\n").unwrap();
        fs::write(port_path(&lock), "4312\n").unwrap();

        assert_eq!(running_port(&lock).unwrap(), None);
    }
}
