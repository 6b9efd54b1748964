//! Pid file: the only guard against a second instance.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;

use crate::core::errors::{PsvError, Result};

/// Pid recorded in `path`, if the file exists and holds a number.
pub fn read_pid(path: &Path) -> Result<Option<i32>> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(text.trim().parse::<i32>().ok().filter(|pid| *pid > 0)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(PsvError::io(path, err)),
    }
}

/// Whether a process with `pid` exists. `EPERM` means it exists but is not ours.
#[must_use]
pub fn process_exists(pid: i32) -> bool {
    match kill(Pid::from_raw(pid), None) {
        Ok(()) | Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

/// Fail with `DuplicateInstance` if `path` names a live process; a missing,
/// unreadable-as-number, or dead pid is stale and ignored.
pub fn check_stale(path: &Path) -> Result<()> {
    match read_pid(path)? {
        Some(pid) if process_exists(pid) => Err(PsvError::DuplicateInstance {
            pid,
            path: path.to_path_buf(),
        }),
        Some(pid) => {
            tracing::debug!(pid, path = %path.display(), "ignoring stale pid file");
            Ok(())
        }
        None => Ok(()),
    }
}

/// A written pid file. Removed exactly once: by [`PidFile::remove`] on clean
/// shutdown, or on drop if an error path unwinds past it.
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
    removed: bool,
}

impl PidFile {
    /// Record `pid` at `path`, replacing any stale file.
    pub fn write(path: &Path, pid: u32) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| PsvError::io(parent, err))?;
        }
        fs::write(path, format!("{pid}\n")).map_err(|err| PsvError::io(path, err))?;
        Ok(Self {
            path: path.to_path_buf(),
            removed: false,
        })
    }

    /// Record the current process id.
    pub fn write_current(path: &Path) -> Result<Self> {
        Self::write(path, std::process::id())
    }

    /// Location of the pid file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the file. Returns whether this call removed it.
    pub fn remove(&mut self) -> bool {
        if self.removed {
            return false;
        }
        self.removed = true;
        match fs::remove_file(&self.path) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "could not remove pid file");
                false
            }
        }
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        self.remove();
    }
}
