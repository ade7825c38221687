//! Server lock files
//!
//! A running server records its process id in
//! `$HOME/.gebr/<binary>/<hostname>/lock`. The id doubles as the process
//! group id, since servers make themselves group leaders at startup, so a
//! client can terminate the whole group by reading the file on the host.

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use crate::config;
use crate::types::ServerRole;

const LOCK_FILE_NAME: &str = "lock";

/// Name of the local host
pub fn local_hostname() -> String {
    gethostname::gethostname().to_string_lossy().into_owned()
}

/// Lock file path below an explicit root directory
pub fn lock_path_in(root: &Path, role: ServerRole, hostname: &str) -> PathBuf {
    root.join(role.binary_name()).join(hostname).join(LOCK_FILE_NAME)
}

/// Lock file path for `role` on this host
pub fn local_lock_path(role: ServerRole) -> PathBuf {
    lock_path_in(&config::default_config_dir(), role, &local_hostname())
}

/// Lock file path as seen by a shell on the target host.
///
/// `$HOME` and the hostname are left for that shell to expand.
pub fn shell_lock_path(role: ServerRole) -> String {
    format!("$HOME/.gebr/{}/$(hostname)/{}", role.binary_name(), LOCK_FILE_NAME)
}

/// Read the PID from a lock file
///
/// Returns `Ok(None)` if the file doesn't exist.
pub fn read_lock_file(path: &Path) -> io::Result<Option<u32>> {
    match fs::File::open(path) {
        Ok(mut file) => {
            let mut contents = String::new();
            file.read_to_string(&mut contents)?;
            let pid = contents
                .trim()
                .parse::<u32>()
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            Ok(Some(pid))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Write a PID to a lock file, creating parent directories
pub fn write_lock_file(path: &Path, pid: u32) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut file = fs::File::create(path)?;
    writeln!(file, "{}", pid)?;
    Ok(())
}

/// Remove a lock file; a missing file is not an error
pub fn remove_lock_file(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Check if a process with the given PID is still alive
#[cfg(unix)]
pub fn is_process_alive(pid: u32) -> bool {
    // EPERM means the process exists but belongs to someone else
    unsafe {
        if libc::kill(pid as libc::pid_t, 0) == 0 {
            return true;
        }
        std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
    }
}

/// Make the calling process the leader of a new session and process group
#[cfg(unix)]
pub fn become_group_leader() -> io::Result<()> {
    // Fails with EPERM when already a group leader, which is fine
    if unsafe { libc::setsid() } == -1 {
        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::EPERM) {
            return Err(err);
        }
    }
    Ok(())
}

/// Guard that removes the lock file when dropped
pub struct LockFileGuard {
    path: PathBuf,
}

impl LockFileGuard {
    /// Write the lock file and return a guard for it
    pub fn new(path: PathBuf, pid: u32) -> io::Result<Self> {
        write_lock_file(&path, pid)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockFileGuard {
    fn drop(&mut self) {
        if let Err(e) = remove_lock_file(&self.path) {
            tracing::warn!("Failed to remove lock file {:?}: {}", self.path, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_lock_path_layout() {
        let path = lock_path_in(Path::new("/home/u/.gebr"), ServerRole::Worker, "node1");
        assert_eq!(path, PathBuf::from("/home/u/.gebr/gebrd/node1/lock"));
    }

    #[test]
    fn test_shell_lock_path() {
        assert_eq!(
            shell_lock_path(ServerRole::Orchestrator),
            "$HOME/.gebr/gebrm/$(hostname)/lock"
        );
    }

    #[test]
    fn test_read_missing_lock_file() {
        let dir = TempDir::new().unwrap();
        assert!(read_lock_file(&dir.path().join("lock")).unwrap().is_none());
    }

    #[test]
    fn test_write_creates_parents() {
        let dir = TempDir::new().unwrap();
        let path = lock_path_in(dir.path(), ServerRole::Worker, "host");

        write_lock_file(&path, 4242).unwrap();
        assert_eq!(read_lock_file(&path).unwrap(), Some(4242));
    }

    #[test]
    fn test_garbage_lock_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lock");
        std::fs::write(&path, "not a pid").unwrap();
        assert!(read_lock_file(&path).is_err());
    }

    #[test]
    fn test_current_process_is_alive() {
        assert!(is_process_alive(std::process::id()));
        assert!(!is_process_alive(999999999));
    }

    #[test]
    fn test_guard_removes_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gebrd").join("lock");

        {
            let guard = LockFileGuard::new(path.clone(), 1).unwrap();
            assert!(guard.path().exists());
        }

        assert!(!path.exists());
        remove_lock_file(&path).unwrap();
    }
}
