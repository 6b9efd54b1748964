//! End-to-end lifecycle tests for the `psvd` binary.

mod common;

use std::fs;
use std::thread;
use std::time::{Duration, Instant};

use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;

use common::{Case, settle};

const HEARTBEAT_CONF: &str = "\
[supervisor]
plugins = heartbeat
liveness_interval = 1

[plugin:heartbeat]
message = still here
check_poll = 1
";

#[test]
fn help_lists_flags() {
    let case = Case::new("help_lists_flags", HEARTBEAT_CONF);
    let result = case.run(&["--help"]);
    assert!(result.status.success(), "log: {}", result.log_path.display());
    for flag in ["--conf", "--log", "--pid", "--no-daemon"] {
        assert!(
            result.stdout.contains(flag),
            "missing {flag}; log: {}",
            result.log_path.display()
        );
    }
}

#[test]
fn sigterm_shuts_down_cleanly() {
    let case = Case::new("sigterm_shuts_down_cleanly", HEARTBEAT_CONF);
    let child = case.spawn_foreground();
    settle();
    let result = case.signal_and_wait(child, Signal::SIGTERM, 1);

    assert!(result.status.success(), "log: {}", result.log_path.display());
    assert!(result.stdout.contains("still here"), "log: {}", result.log_path.display());
    assert!(
        result.stdout.contains("received signal"),
        "log: {}",
        result.log_path.display()
    );
    assert!(
        result.stdout.contains("shutdown complete"),
        "log: {}",
        result.log_path.display()
    );
    assert!(!case.pid_path().exists(), "foreground runs write no pid file");
}

#[test]
fn repeated_signals_terminate_once() {
    let case = Case::new("repeated_signals_terminate_once", HEARTBEAT_CONF);
    let child = case.spawn_foreground();
    settle();
    let result = case.signal_and_wait(child, Signal::SIGTERM, 3);

    assert!(result.status.success(), "log: {}", result.log_path.display());
    assert_eq!(
        result.stdout.matches("shutdown complete").count(),
        1,
        "log: {}",
        result.log_path.display()
    );
    assert_eq!(
        result.stdout.matches("phase=Terminated").count(),
        1,
        "log: {}",
        result.log_path.display()
    );
}

#[test]
fn unknown_plugin_is_isolated() {
    let case = Case::new(
        "unknown_plugin_is_isolated",
        "[supervisor]\nplugins = heartbeat, nosuch\nliveness_interval = 1\n\n[plugin:heartbeat]\ncheck_poll = 1\n",
    );
    let mut child = case.spawn_foreground();
    settle();
    assert!(
        child.try_wait().expect("try_wait").is_none(),
        "daemon must keep running after a plugin fails to load"
    );
    let result = case.signal_and_wait(child, Signal::SIGINT, 1);

    assert!(result.status.success(), "log: {}", result.log_path.display());
    let error_lines = result
        .stdout
        .lines()
        .filter(|line| line.contains("ERROR") && line.contains("nosuch"))
        .count();
    assert_eq!(error_lines, 1, "log: {}", result.log_path.display());
    assert!(result.stdout.contains("workers=2"), "log: {}", result.log_path.display());
    assert!(
        result.stdout.contains("request for plugin nosuch finished"),
        "log: {}",
        result.log_path.display()
    );
}

#[test]
fn missing_plugin_list_is_fatal() {
    let case = Case::new("missing_plugin_list_is_fatal", "[supervisor]\ndebug = yes\n");
    let result = case.run(&["--no-daemon"]);
    assert!(!result.status.success(), "log: {}", result.log_path.display());
    assert!(result.stderr.contains("PSV-1003"), "log: {}", result.log_path.display());
}

#[test]
fn invalid_option_type_aborts_before_workers() {
    let case = Case::new(
        "invalid_option_type_aborts_before_workers",
        "[supervisor]\nplugins = heartbeat\n[plugin:heartbeat]\nmax_beats = plenty\n",
    );
    let result = case.run(&["--no-daemon"]);
    assert!(!result.status.success(), "log: {}", result.log_path.display());
    assert!(result.stdout.contains("PSV-1005"), "log: {}", result.log_path.display());
    assert!(
        !result.stdout.contains("worker pool started"),
        "log: {}",
        result.log_path.display()
    );
}

#[test]
fn no_loadable_plugin_aborts_startup() {
    let case = Case::new(
        "no_loadable_plugin_aborts_startup",
        "[supervisor]\nplugins = nosuch, alsonot\nliveness_interval = 1\n",
    );
    let result = case.run(&["--no-daemon"]);
    assert!(!result.status.success(), "log: {}", result.log_path.display());
    assert!(result.stdout.contains("PSV-1007"), "log: {}", result.log_path.display());
    assert!(
        !result.stdout.contains("worker pool started"),
        "log: {}",
        result.log_path.display()
    );
}

#[test]
fn missing_config_file_is_reported() {
    let case = Case::new("missing_config_file_is_reported", "");
    fs::remove_file(case.conf_path()).expect("remove config");
    let result = case.run(&["--no-daemon"]);
    assert!(!result.status.success(), "log: {}", result.log_path.display());
    assert!(result.stderr.contains("PSV-1001"), "log: {}", result.log_path.display());
}

#[test]
fn live_pid_file_blocks_second_instance() {
    let case = Case::new("live_pid_file_blocks_second_instance", HEARTBEAT_CONF);
    let me = std::process::id();
    fs::write(case.pid_path(), format!("{me}\n")).expect("seed pid file");

    let result = case.run(&[]);
    assert!(!result.status.success(), "log: {}", result.log_path.display());
    assert!(result.stderr.contains("PSV-3001"), "log: {}", result.log_path.display());
    assert_eq!(
        fs::read_to_string(case.pid_path()).expect("pid file"),
        format!("{me}\n")
    );
}

fn wait_for(limit: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        thread::sleep(Duration::from_millis(50));
    }
    false
}

#[test]
fn detached_daemon_owns_and_removes_pid_file() {
    let case = Case::new("detached_daemon_owns_and_removes_pid_file", HEARTBEAT_CONF);
    // A stale pid above pid_max must be replaced, not honoured.
    fs::write(case.pid_path(), "999999999\n").expect("seed stale pid");

    let launcher = case.run(&[]);
    assert!(launcher.status.success(), "log: {}", launcher.log_path.display());

    let pid_path = case.pid_path();
    let daemon_pid = {
        let mut pid = None;
        let found = wait_for(Duration::from_secs(10), || {
            pid = fs::read_to_string(&pid_path)
                .ok()
                .and_then(|text| text.trim().parse::<i32>().ok())
                .filter(|pid| *pid != 999_999_999);
            pid.is_some()
        });
        assert!(found, "daemon never rewrote the pid file");
        pid.expect("pid")
    };
    assert!(kill(Pid::from_raw(daemon_pid), None).is_ok(), "daemon should be alive");

    let log_path = case.log_dir().join("psvd.log");
    let labelled = wait_for(Duration::from_secs(10), || {
        fs::read_to_string(&log_path).is_ok_and(|log| log.contains("thread=heartbeat-base"))
    });
    kill(Pid::from_raw(daemon_pid), Signal::SIGTERM).expect("signal daemon");
    let gone = wait_for(Duration::from_secs(20), || !pid_path.exists());
    if !gone {
        let _ = kill(Pid::from_raw(daemon_pid), Signal::SIGKILL);
    }
    assert!(gone, "pid file not removed on shutdown");

    let completed = wait_for(Duration::from_secs(10), || {
        fs::read_to_string(&log_path).is_ok_and(|log| log.contains("shutdown complete"))
    });
    assert!(completed, "daemon log never recorded shutdown");
    let log = fs::read_to_string(&log_path).expect("daemon log");
    assert!(log.contains("supervisor starting"));
    assert!(labelled, "liveness report never named the plugin thread: {log}");

    let plugin_log = case.log_dir().join("heartbeat").join("heartbeat.log");
    let plugin_log = fs::read_to_string(&plugin_log).expect("heartbeat log");
    assert!(plugin_log.contains(" INFO "), "{plugin_log}");
    assert!(plugin_log.contains("still here"), "{plugin_log}");
    assert!(!plugin_log.contains("supervisor starting"), "{plugin_log}");
}
