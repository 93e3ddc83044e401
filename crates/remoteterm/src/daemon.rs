//! Daemon supervision: detached background process with a PID file
//!
//! The parent re-executes the binary with an internal `--daemon-child`
//! marker, detached into its own session with output redirected to a log
//! file. The child removes the PID file both on normal exit and from the
//! signal-driven shutdown path (an abrupt exit would bypass destructors).

use std::path::PathBuf;

use remoteterm_core::config;

pub fn pid_file_path() -> PathBuf {
    config::config_dir().join("remote-term.pid")
}

pub fn log_file_path() -> PathBuf {
    config::config_dir().join("remote-term.log")
}

pub fn read_pid_file() -> Option<i32> {
    let contents = std::fs::read_to_string(pid_file_path()).ok()?;
    contents.trim().parse().ok()
}

pub fn write_pid_file(pid: i32) -> std::io::Result<()> {
    std::fs::write(pid_file_path(), pid.to_string())
}

/// Best-effort removal; also safe when the file is already gone.
pub fn remove_pid_file() {
    let _ = std::fs::remove_file(pid_file_path());
}

#[cfg(unix)]
mod unix {
    use std::os::unix::process::CommandExt;
    use std::process::{Command, Stdio};
    use std::time::{Duration, Instant};

    use remoteterm_core::config;
    use remoteterm_core::platform::is_process_alive;

    use super::{log_file_path, pid_file_path, read_pid_file, remove_pid_file, write_pid_file};

    /// Fork-exec the binary as a detached daemon. Refuses when a live
    /// daemon already owns the PID file; stale files are cleaned up.
    pub fn daemonize(extra_args: &[String]) -> ! {
        if let Some(pid) = read_pid_file() {
            if is_process_alive(pid) {
                eprintln!("Daemon is already running (PID {pid}).");
                eprintln!("Use --stop to stop it first.");
                std::process::exit(1);
            }
            remove_pid_file();
        }

        // First-time setup needs an interactive terminal
        if !config::config_path().exists() {
            eprintln!("Error: No configuration found.");
            eprintln!("Run the program interactively first to complete setup,");
            eprintln!("then use --daemon to run in the background.");
            std::process::exit(1);
        }

        let log_path = log_file_path();
        let open_log = || {
            std::fs::OpenOptions::new()
                .append(true)
                .create(true)
                .open(&log_path)
        };
        let (stdout_log, stderr_log) = match (open_log(), open_log()) {
            (Ok(a), Ok(b)) => (a, b),
            _ => {
                eprintln!("Error: Cannot open log file {}", log_path.display());
                std::process::exit(1);
            }
        };

        let exe = match std::env::current_exe() {
            Ok(exe) => exe,
            Err(e) => {
                eprintln!("Error: Cannot resolve own binary path: {e}");
                std::process::exit(1);
            }
        };

        let mut cmd = Command::new(exe);
        cmd.arg("--daemon-child")
            .args(extra_args)
            .stdin(Stdio::null())
            .stdout(stdout_log)
            .stderr(stderr_log);
        unsafe {
            // Detach from the controlling terminal
            cmd.pre_exec(|| {
                libc::setsid();
                Ok(())
            });
        }

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                eprintln!("Error: Failed to start daemon: {e}");
                std::process::exit(1);
            }
        };

        let pid = child.id() as i32;
        if let Err(e) = write_pid_file(pid) {
            eprintln!("Warning: Failed to write PID file: {e}");
        }

        println!("Daemon started (PID {pid}).");
        println!("Log file: {}", log_path.display());
        println!("PID file: {}", pid_file_path().display());
        println!();
        println!("Use --status to check status, --stop to stop.");
        std::process::exit(0);
    }

    /// SIGTERM the daemon, wait up to 5s, escalate to SIGKILL, and remove
    /// the PID file.
    pub fn stop() {
        let Some(pid) = read_pid_file() else {
            println!("No daemon is running (PID file not found).");
            return;
        };

        if !is_process_alive(pid) {
            println!("Daemon (PID {pid}) is not running. Removing stale PID file.");
            remove_pid_file();
            return;
        }

        println!("Stopping daemon (PID {pid})...");
        if unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) } != 0 {
            eprintln!("Error sending SIGTERM to PID {pid}");
            return;
        }

        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if !is_process_alive(pid) {
                println!("Daemon stopped.");
                remove_pid_file();
                return;
            }
            std::thread::sleep(Duration::from_millis(200));
        }

        println!("Daemon did not stop gracefully. Sending SIGKILL...");
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGKILL);
        }
        std::thread::sleep(Duration::from_millis(500));

        if is_process_alive(pid) {
            eprintln!("Warning: Failed to kill daemon (PID {pid}).");
        } else {
            println!("Daemon killed.");
        }
        remove_pid_file();
    }

    pub fn status() {
        let Some(pid) = read_pid_file() else {
            println!("Status: Not running (no PID file).");
            return;
        };

        if is_process_alive(pid) {
            println!("Status: Running (PID {pid})");
            println!("PID file: {}", pid_file_path().display());
            println!("Log file: {}", log_file_path().display());
        } else {
            println!("Status: Not running (stale PID {pid})");
            remove_pid_file();
        }
    }
}

#[cfg(unix)]
pub use unix::{daemonize, status, stop};

#[cfg(not(unix))]
mod stub {
    pub fn daemonize(_extra_args: &[String]) -> ! {
        eprintln!("Daemon mode is not supported on this platform.");
        std::process::exit(1);
    }

    pub fn stop() {
        eprintln!("Daemon mode is not supported on this platform.");
        std::process::exit(1);
    }

    pub fn status() {
        eprintln!("Daemon mode is not supported on this platform.");
        std::process::exit(1);
    }
}

#[cfg(not(unix))]
pub use stub::{daemonize, status, stop};
