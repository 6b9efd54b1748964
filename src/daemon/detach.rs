//! Classic double-fork daemonization.
//!
//! Must run before any thread is spawned: `fork` only carries the calling
//! thread into the child.

use std::fs::File;
use std::os::fd::IntoRawFd;
use std::path::Path;

use nix::sys::resource::{Resource, getrlimit};
use nix::sys::stat::{Mode, umask};
use nix::unistd::{ForkResult, chdir, close, dup2, fork, setsid};

use super::pidfile::{PidFile, check_stale};
use crate::core::errors::{PsvError, Result};

/// Descriptor ceiling used when `RLIMIT_NOFILE` is unbounded.
pub const FALLBACK_MAX_FD: i32 = 1024;

/// Working directory of the detached process.
pub const DAEMON_ROOT: &str = "/";

const DEV_NULL: &str = "/dev/null";

/// Detach from the controlling terminal and record the new pid.
///
/// Returns only in the final daemon process; both intermediate parents exit
/// with status 0. Fails with `DuplicateInstance` before forking if `pid_path`
/// names a live process.
pub fn daemonize(pid_path: &Path) -> Result<PidFile> {
    check_stale(pid_path)?;

    fork_and_exit_parent("first fork")?;
    setsid().map_err(|err| PsvError::Daemonize {
        step: "setsid",
        details: err.to_string(),
    })?;
    // Session leader exits so the daemon can never reacquire a terminal.
    fork_and_exit_parent("second fork")?;

    umask(Mode::empty());
    chdir(DAEMON_ROOT).map_err(|err| PsvError::Daemonize {
        step: "chdir",
        details: err.to_string(),
    })?;

    let pid_file = PidFile::write_current(pid_path)?;
    redirect_standard_streams()?;
    Ok(pid_file)
}

#[allow(unsafe_code)]
fn fork_and_exit_parent(stage: &'static str) -> Result<()> {
    // SAFETY: called before the supervisor spawns any thread, so the child
    // holds no lock owned by a thread that does not exist there.
    match unsafe { fork() } {
        Ok(ForkResult::Parent { .. }) => std::process::exit(0),
        Ok(ForkResult::Child) => Ok(()),
        Err(err) => Err(PsvError::Fork {
            stage,
            details: err.to_string(),
        }),
    }
}

/// Highest descriptor number to close, from the hard `RLIMIT_NOFILE`.
#[must_use]
pub fn max_fd() -> i32 {
    match getrlimit(Resource::RLIMIT_NOFILE) {
        Ok((_, hard)) if hard != libc::RLIM_INFINITY => i32::try_from(hard).unwrap_or(FALLBACK_MAX_FD),
        _ => FALLBACK_MAX_FD,
    }
}

/// Close every inherited descriptor, then point 0/1/2 at `/dev/null`.
fn redirect_standard_streams() -> Result<()> {
    for fd in 0..max_fd() {
        // EBADF for never-opened descriptors is expected.
        let _ = close(fd);
    }

    let null_fd = File::options()
        .read(true)
        .write(true)
        .open(DEV_NULL)
        .map_err(|err| PsvError::io(DEV_NULL, err))?
        .into_raw_fd();
    for target in 0..=2 {
        if target != null_fd {
            dup2(null_fd, target).map_err(|err| PsvError::Daemonize {
                step: "dup2",
                details: err.to_string(),
            })?;
        }
    }
    if null_fd > 2 {
        let _ = close(null_fd);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_fd_is_positive() {
        assert!(max_fd() > 2);
    }

    #[test]
    fn live_instance_blocks_before_forking() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("psvd.pid");
        std::fs::write(&path, format!("{}\n", std::process::id())).expect("seed");
        let err = daemonize(&path).unwrap_err();
        assert!(matches!(err, PsvError::DuplicateInstance { .. }));
    }
}
