//! Shared helpers for driving the `psvd` binary in integration tests.

#![allow(dead_code)]

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;

/// Output of one finished `psvd` run, mirrored to a per-case log file.
pub struct CaseResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub log_path: PathBuf,
}

/// Scratch directory holding one case's config, logs and pid file.
pub struct Case {
    pub name: String,
    pub dir: tempfile::TempDir,
}

impl Case {
    pub fn new(name: &str, config: &str) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("psvd.conf"), config).expect("write config");
        Self {
            name: name.to_string(),
            dir,
        }
    }

    pub fn conf_path(&self) -> PathBuf {
        self.dir.path().join("psvd.conf")
    }

    pub fn pid_path(&self) -> PathBuf {
        self.dir.path().join("psvd.pid")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.dir.path().join("logs")
    }

    fn command(&self, extra: &[&str]) -> Command {
        let mut command = Command::new(env!("CARGO_BIN_EXE_psvd"));
        command
            .arg("--conf")
            .arg(self.conf_path())
            .arg("--log")
            .arg(self.log_dir())
            .arg("--pid")
            .arg(self.pid_path())
            .args(extra)
            .env_remove("PSVD_LOG")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        command
    }

    /// Start `psvd --no-daemon` in the background.
    pub fn spawn_foreground(&self) -> Child {
        self.command(&["--no-daemon"]).spawn().expect("spawn psvd")
    }

    /// Run `psvd` with `extra` args to completion.
    pub fn run(&self, extra: &[&str]) -> CaseResult {
        let output = self.command(extra).output().expect("run psvd");
        self.record(
            output.status,
            String::from_utf8_lossy(&output.stdout).into_owned(),
            String::from_utf8_lossy(&output.stderr).into_owned(),
        )
    }

    /// Send `signal` to `child` `times` times, then collect its output.
    pub fn signal_and_wait(&self, mut child: Child, signal: Signal, times: usize) -> CaseResult {
        let pid = Pid::from_raw(i32::try_from(child.id()).expect("pid fits"));
        for _ in 0..times {
            kill(pid, signal).expect("send signal");
            thread::sleep(Duration::from_millis(20));
        }
        let status = wait_with_deadline(&mut child, Duration::from_secs(20));
        let mut stdout = String::new();
        let mut stderr = String::new();
        if let Some(mut out) = child.stdout.take() {
            out.read_to_string(&mut stdout).expect("stdout");
        }
        if let Some(mut err) = child.stderr.take() {
            err.read_to_string(&mut stderr).expect("stderr");
        }
        self.record(status, stdout, stderr)
    }

    fn record(&self, status: ExitStatus, stdout: String, stderr: String) -> CaseResult {
        let log_dir = Path::new(env!("CARGO_TARGET_TMPDIR")).join("psvd-cases");
        fs::create_dir_all(&log_dir).expect("case log dir");
        let log_path = log_dir.join(format!("{}.log", self.name));
        fs::write(
            &log_path,
            format!("status: {status}\n--- stdout ---\n{stdout}\n--- stderr ---\n{stderr}\n"),
        )
        .expect("write case log");
        CaseResult {
            status,
            stdout,
            stderr,
            log_path,
        }
    }
}

fn wait_with_deadline(child: &mut Child, limit: Duration) -> ExitStatus {
    let deadline = Instant::now() + limit;
    loop {
        if let Some(status) = child.try_wait().expect("try_wait") {
            return status;
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            panic!("psvd did not exit within {limit:?}");
        }
        thread::sleep(Duration::from_millis(20));
    }
}

/// Give a freshly spawned daemon time to start its workers.
pub fn settle() {
    thread::sleep(Duration::from_millis(700));
}
