//! servicegrid-lock — advisory locks shared between processes.
//!
//! A lock is a file: it is held while the file exists. The file holds
//! the owner's pid. Creation uses `O_CREAT | O_EXCL`, so exactly one
//! process wins a race. Acquisition never blocks or retries.
//!
//! Lock files outlive a crashed owner. By default such a lock stays held
//! until someone deletes the file. With stale recovery enabled, a lock
//! whose recorded pid is no longer alive is removed and taken over. The
//! takeover runs under an `flock` on a `.recover` sidecar file, so two
//! recovering processes never both win.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

/// A named lock file.
#[derive(Debug, Clone)]
pub struct NamedLock {
    name: String,
    path: PathBuf,
    stale_recovery: bool,
}

impl NamedLock {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            stale_recovery: false,
        }
    }

    /// Take over locks left behind by dead processes.
    pub fn with_stale_recovery(mut self, enabled: bool) -> Self {
        self.stale_recovery = enabled;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the lock file currently exists.
    pub fn is_held(&self) -> bool {
        self.path.exists()
    }

    /// Pid recorded in the lock file, if readable.
    pub fn owner_pid(&self) -> Option<u32> {
        std::fs::read_to_string(&self.path)
            .ok()
            .and_then(|s| s.trim().parse().ok())
    }

    /// Try to create the lock file. Returns `false` if it already exists
    /// or cannot be created.
    pub fn acquire(&self) -> bool {
        match self.create() {
            Ok(()) => {
                debug!(lock = %self.name, path = %self.path.display(), "lock acquired");
                true
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                if self.stale_recovery && self.recover_stale() {
                    debug!(lock = %self.name, "lock acquired after stale recovery");
                    return true;
                }
                warn!(lock = %self.name, owner = ?self.owner_pid(), "lock is held by another process");
                false
            }
            Err(e) => {
                error!(lock = %self.name, path = %self.path.display(), error = %e, "could not create lock file");
                false
            }
        }
    }

    /// Delete the lock file. Returns `false` (and logs) if it could not be
    /// removed.
    pub fn release(&self) -> bool {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(lock = %self.name, "lock released");
                true
            }
            Err(e) => {
                error!(lock = %self.name, path = %self.path.display(), error = %e, "could not release lock");
                false
            }
        }
    }

    /// Acquire and return a guard that releases on drop.
    pub fn try_lock(&self) -> Option<LockGuard<'_>> {
        self.acquire().then(|| LockGuard {
            lock: self,
            released: false,
        })
    }

    fn create(&self) -> std::io::Result<()> {
        self.create_with(|file| write!(file, "{}", std::process::id()))
    }

    /// Create the lock file and fill it with `write_owner`. A file that
    /// could not be filled is removed again.
    fn create_with(
        &self,
        write_owner: impl FnOnce(&mut File) -> std::io::Result<()>,
    ) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&self.path)?;
        if let Err(e) = write_owner(&mut file) {
            drop(file);
            let _ = std::fs::remove_file(&self.path);
            return Err(e);
        }
        Ok(())
    }

    /// Sidecar file whose `flock` serialises stale recovery. It is never
    /// removed: unlinking it would let two recoverers lock different inodes.
    fn recovery_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".recover");
        PathBuf::from(name)
    }

    /// Remove a dead owner's lock file and create ours, under the sidecar
    /// lock. Only sidecar holders delete foreign lock files, so the pid read
    /// here still describes the file that gets removed.
    #[cfg(unix)]
    fn recover_stale(&self) -> bool {
        use std::os::unix::io::AsRawFd;

        let sidecar = match OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(self.recovery_path())
        {
            Ok(file) => file,
            Err(e) => {
                error!(lock = %self.name, error = %e, "could not open lock recovery file");
                return false;
            }
        };
        // SAFETY: the descriptor stays open for the duration of the call.
        if unsafe { libc::flock(sidecar.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) } != 0 {
            debug!(lock = %self.name, "another process is recovering this lock");
            return false;
        }

        let acquired = self.clear_if_stale() && self.create().is_ok();
        // Closing the sidecar drops the flock.
        drop(sidecar);
        acquired
    }

    #[cfg(not(unix))]
    fn recover_stale(&self) -> bool {
        false
    }

    #[cfg_attr(not(unix), allow(dead_code))]
    fn clear_if_stale(&self) -> bool {
        let Some(pid) = self.owner_pid() else {
            // Empty or half-written file: the owner may still be writing it.
            return false;
        };
        if process_alive(pid) {
            return false;
        }
        info!(lock = %self.name, pid, "owner is not running, resetting lock");
        match std::fs::remove_file(&self.path) {
            Ok(()) => true,
            Err(e) => {
                error!(lock = %self.name, error = %e, "could not remove stale lock");
                false
            }
        }
    }
}

/// A held lock. Released when dropped unless released explicitly.
#[derive(Debug)]
pub struct LockGuard<'a> {
    lock: &'a NamedLock,
    released: bool,
}

impl LockGuard<'_> {
    pub fn name(&self) -> &str {
        self.lock.name()
    }

    /// Release now and report whether the file was removed.
    pub fn release(mut self) -> bool {
        self.released = true;
        self.lock.release()
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        if !self.released {
            self.lock.release();
        }
    }
}

#[cfg(unix)]
fn process_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if pid <= 0 {
        return false;
    }
    // SAFETY: signal 0 performs permission and existence checks only.
    let rc = unsafe { libc::kill(pid, 0) };
    rc == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
#[allow(dead_code)]
fn process_alive(_pid: u32) -> bool {
    true
}
