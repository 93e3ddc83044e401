//! Platform shim - shell discovery and process-group termination
//!
//! portable-pty already puts the child in its own session with the PTY as
//! controlling terminal, so the only OS-specific concerns left are which
//! shell to launch, how to tear down the whole descendant group, and how to
//! probe a PID for liveness.

use std::time::Duration;

/// Escalation pauses between signals when tearing down a process group.
pub const KILL_HUP_PAUSE: Duration = Duration::from_millis(100);
pub const KILL_TERM_PAUSE: Duration = Duration::from_millis(50);

/// Pick the shell to host sessions in.
///
/// Prefers an interactive-capable shell with profile loading disabled so
/// the PTY starts clean (no rc-file banners, no prompt customization).
#[cfg(unix)]
pub fn default_shell() -> (String, Vec<String>) {
    let bash = "/bin/bash";
    if std::path::Path::new(bash).exists() {
        (
            bash.to_string(),
            vec!["--norc".to_string(), "--noprofile".to_string()],
        )
    } else {
        // sh has no --norc
        ("/bin/sh".to_string(), Vec::new())
    }
}

#[cfg(windows)]
pub fn default_shell() -> (String, Vec<String>) {
    ("cmd.exe".to_string(), Vec::new())
}

/// Terminate the child's entire session group.
///
/// The child is a session leader, so signalling the negative PID reaches
/// every descendant. Escalation: SIGHUP (proper TTY hangup), short pause,
/// SIGTERM, short pause, SIGKILL.
#[cfg(unix)]
pub async fn kill_process_group(pid: u32) {
    let pgid = -(pid as libc::pid_t);
    unsafe {
        libc::kill(pgid, libc::SIGHUP);
    }
    tokio::time::sleep(KILL_HUP_PAUSE).await;
    unsafe {
        libc::kill(pgid, libc::SIGTERM);
    }
    tokio::time::sleep(KILL_TERM_PAUSE).await;
    unsafe {
        libc::kill(pgid, libc::SIGKILL);
        // The group id only exists once the child has called setsid; a
        // direct kill covers teardown racing a just-spawned child
        libc::kill(pid as libc::pid_t, libc::SIGKILL);
    }
}

#[cfg(windows)]
pub async fn kill_process_group(pid: u32) {
    // No process groups to signal; force-kill the whole tree instead.
    let _ = tokio::process::Command::new("taskkill")
        .args(["/T", "/F", "/PID", &pid.to_string()])
        .output()
        .await;
}

/// Check whether a process with the given PID is still running.
///
/// Unix convention: signal 0 probes for existence without delivering
/// anything.
#[cfg(unix)]
pub fn is_process_alive(pid: i32) -> bool {
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

#[cfg(windows)]
pub fn is_process_alive(_pid: i32) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_shell_exists() {
        let (shell, _args) = default_shell();
        assert!(
            std::path::Path::new(&shell).exists(),
            "selected shell {shell} should exist"
        );
    }

    #[cfg(unix)]
    #[test]
    fn bash_gets_profile_suppression() {
        let (shell, args) = default_shell();
        if shell == "/bin/bash" {
            assert!(args.contains(&"--norc".to_string()));
            assert!(args.contains(&"--noprofile".to_string()));
        } else {
            assert!(args.is_empty());
        }
    }

    #[cfg(unix)]
    #[test]
    fn liveness_probe_sees_self() {
        assert!(is_process_alive(std::process::id() as i32));
    }

    #[cfg(unix)]
    #[test]
    fn liveness_probe_rejects_bogus_pid() {
        // PID range is bounded well below this on any real system
        assert!(!is_process_alive(999_999_999));
    }
}
