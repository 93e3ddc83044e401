//! PTY session - one pseudo-terminal hosting one child shell
//!
//! The child runs as a session leader with the PTY as its controlling
//! terminal, so teardown can signal the whole descendant group. A dedicated
//! blocking reader streams output chunks into a bounded channel; blocking on
//! a full channel is deliberate backpressure against a slow sink.

use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::platform;

/// Nominal terminal size; generous enough for modern full-screen TUIs.
pub const DEFAULT_ROWS: u16 = 50;
pub const DEFAULT_COLS: u16 = 120;

/// Buffered output chunks between the reader and the streamer.
const OUTPUT_CHANNEL_CAPACITY: usize = 100;
/// Read buffer sized for streaming responses from LLMs and TUI redraws.
const READ_BUFFER_SIZE: usize = 8192;
/// Pause between the command text and the carriage return. TUI input
/// frameworks split incoming chunks only on escape sequences; "text\r" in a
/// single read is one event whose trailing \r is never recognized as Enter.
/// Two separate writes force two input events. For a cooked-mode shell the
/// delay is harmless: it line-buffers until the newline arrives.
const ENTER_DELAY: Duration = Duration::from_millis(50);

pub struct PtySession {
    pid: Option<u32>,
    writer: tokio::sync::Mutex<Option<Box<dyn Write + Send>>>,
    master: std::sync::Mutex<Option<Box<dyn MasterPty + Send>>>,
    child: std::sync::Mutex<Option<Box<dyn Child + Send + Sync>>>,
    stop: Arc<AtomicBool>,
    closed: AtomicBool,
}

impl PtySession {
    /// Start a shell in a fresh PTY. Returns the session handle and the
    /// output channel; the caller owns the receiving side and hands it to a
    /// streamer.
    pub fn spawn() -> Result<(Arc<Self>, mpsc::Receiver<Vec<u8>>)> {
        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows: DEFAULT_ROWS,
                cols: DEFAULT_COLS,
                pixel_width: 0,
                pixel_height: 0,
            })
            .context("failed to open PTY")?;

        let (shell, shell_args) = platform::default_shell();
        let mut cmd = CommandBuilder::new(&shell);
        cmd.args(&shell_args);

        // CommandBuilder starts with an empty environment; copy the parent's
        // explicitly, then apply terminal markers on top.
        for (key, value) in std::env::vars() {
            cmd.env(key, value);
        }
        cmd.env("TERM", "xterm-256color");
        cmd.env("COLORTERM", "truecolor");
        cmd.env("PS1", "");
        cmd.env("FORCE_COLOR", "1");
        cmd.env("CLICOLOR", "1");
        cmd.env("CLICOLOR_FORCE", "1");
        cmd.env("NO_UPDATE_NOTIFIER", "1");
        cmd.env("DISABLE_AUTO_UPDATE", "1");
        cmd.env("INTERACTIVE", "1");
        cmd.env("IS_TTY", "1");
        // Allow nested agent sessions inside the bridge
        cmd.env_remove("CLAUDECODE");

        let child = pair
            .slave
            .spawn_command(cmd)
            .with_context(|| format!("failed to start shell: {shell}"))?;
        // Drop the slave half so the reader sees EOF once the child exits
        drop(pair.slave);

        let pid = child.process_id();
        let writer = pair.master.take_writer().context("PTY writer")?;
        let reader = pair.master.try_clone_reader().context("PTY reader")?;

        info!(shell = %shell, pid = ?pid, "PTY session started");

        let (tx, rx) = mpsc::channel::<Vec<u8>>(OUTPUT_CHANNEL_CAPACITY);
        let stop = Arc::new(AtomicBool::new(false));

        let session = Arc::new(Self {
            pid,
            writer: tokio::sync::Mutex::new(Some(writer)),
            master: std::sync::Mutex::new(Some(pair.master)),
            child: std::sync::Mutex::new(Some(child)),
            stop: Arc::clone(&stop),
            closed: AtomicBool::new(false),
        });

        tokio::task::spawn_blocking(move || Self::read_loop(reader, tx, stop));

        Ok((session, rx))
    }

    /// Blocking reader: PTY -> output channel. Exits on EOF (child gone),
    /// read error after teardown, stop signal, or a dropped receiver.
    fn read_loop(
        mut reader: Box<dyn Read + Send>,
        tx: mpsc::Sender<Vec<u8>>,
        stop: Arc<AtomicBool>,
    ) {
        let mut buf = [0u8; READ_BUFFER_SIZE];
        loop {
            if stop.load(Ordering::SeqCst) {
                break;
            }
            match reader.read(&mut buf) {
                Ok(0) => {
                    debug!("PTY reader saw EOF");
                    break;
                }
                Ok(n) => {
                    // Blocks while the channel is full; backpressure is the
                    // right behavior against a slow sink. Errors only when
                    // the streamer dropped the receiver.
                    if tx.blocking_send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    // EIO after the group was killed is the normal unix
                    // end-of-session; anything else is equally final.
                    debug!(error = %e, "PTY read ended");
                    break;
                }
            }
        }
        // tx drops here, closing the channel and signalling downstream
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Send a command line: text first, then Enter as a second write.
    pub async fn send_command(&self, command: &str) -> Result<()> {
        self.write_bytes(command.as_bytes()).await?;
        tokio::time::sleep(ENTER_DELAY).await;
        self.write_bytes(b"\r").await
    }

    /// Write bytes verbatim with no appended newline; the terminal-emulator
    /// client path sends keystrokes through here.
    pub async fn send_raw_input(&self, input: &str) -> Result<()> {
        self.write_bytes(input.as_bytes()).await
    }

    async fn write_bytes(&self, data: &[u8]) -> Result<()> {
        let mut guard = self.writer.lock().await;
        match guard.as_mut() {
            Some(writer) => {
                writer.write_all(data)?;
                writer.flush()?;
                Ok(())
            }
            None => Err(anyhow!("PTY session is closed")),
        }
    }

    /// Change the PTY window size.
    pub fn resize(&self, rows: u16, cols: u16) -> Result<()> {
        let guard = self.master.lock().unwrap_or_else(|e| e.into_inner());
        match guard.as_ref() {
            Some(master) => {
                master.resize(PtySize {
                    rows,
                    cols,
                    pixel_width: 0,
                    pixel_height: 0,
                })?;
                debug!(rows, cols, "PTY resized");
                Ok(())
            }
            None => Err(anyhow!("PTY session is closed")),
        }
    }

    /// Idempotent teardown: stop the reader, terminate the process group,
    /// reap the child, release the PTY. Safe to call repeatedly and
    /// concurrently; only the first caller does the work.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.stop.store(true, Ordering::SeqCst);

        if let Some(pid) = self.pid {
            platform::kill_process_group(pid).await;
        }

        let child = {
            let mut guard = self.child.lock().unwrap_or_else(|e| e.into_inner());
            guard.take()
        };
        if let Some(mut child) = child {
            // Reap the zombie off the async threads
            let result = tokio::task::spawn_blocking(move || child.wait()).await;
            if let Ok(Err(e)) = result {
                warn!(error = %e, "child reap failed");
            }
        }

        *self.writer.lock().await = None;
        self.master
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();

        info!(pid = ?self.pid, "PTY session closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    /// Drain the output channel until the predicate matches or the timeout
    /// elapses, returning everything read.
    async fn drain_until(
        rx: &mut mpsc::Receiver<Vec<u8>>,
        timeout: Duration,
        pred: impl Fn(&str) -> bool,
    ) -> String {
        let mut collected = String::new();
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match tokio::time::timeout(remaining, rx.recv()).await {
                Ok(Some(chunk)) => {
                    collected.push_str(&String::from_utf8_lossy(&chunk));
                    if pred(&collected) {
                        break;
                    }
                }
                _ => break,
            }
        }
        collected
    }

    #[tokio::test]
    async fn echo_round_trip() {
        let (session, mut rx) = PtySession::spawn().unwrap();
        session.send_command("echo PTY_ROUND_TRIP").await.unwrap();

        let output = drain_until(&mut rx, Duration::from_secs(5), |s| {
            // The command itself is echoed; require a second occurrence
            s.matches("PTY_ROUND_TRIP").count() >= 2
        })
        .await;
        assert!(output.contains("PTY_ROUND_TRIP"), "got: {output:?}");

        session.close().await;
    }

    #[tokio::test]
    async fn raw_input_is_not_submitted_without_newline() {
        let (session, mut rx) = PtySession::spawn().unwrap();
        session.send_raw_input("echo RAW_MARKER").await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        session.send_raw_input("\r").await.unwrap();

        let output = drain_until(&mut rx, Duration::from_secs(5), |s| {
            s.matches("RAW_MARKER").count() >= 2
        })
        .await;
        assert!(output.contains("RAW_MARKER"), "got: {output:?}");

        session.close().await;
    }

    #[tokio::test]
    async fn close_is_idempotent_and_kills_the_child() {
        let (session, mut rx) = PtySession::spawn().unwrap();
        let pid = session.pid().expect("child pid");

        session.close().await;
        session.close().await; // second close is a no-op

        // Reader channel drains to closed
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            match tokio::time::timeout(Duration::from_millis(200), rx.recv()).await {
                Ok(None) => break,
                Ok(Some(_)) => continue,
                Err(_) if Instant::now() > deadline => panic!("channel never closed"),
                Err(_) => continue,
            }
        }

        // The shell must be gone (reaped, not a zombie)
        assert!(!platform::is_process_alive(pid as i32) || {
            // Allow a beat for process-table cleanup on slow machines
            tokio::time::sleep(Duration::from_millis(500)).await;
            !platform::is_process_alive(pid as i32)
        });
    }

    #[tokio::test]
    async fn concurrent_close_does_not_panic() {
        let (session, _rx) = PtySession::spawn().unwrap();
        let a = Arc::clone(&session);
        let b = Arc::clone(&session);
        let (ra, rb) = tokio::join!(
            tokio::spawn(async move { a.close().await }),
            tokio::spawn(async move { b.close().await }),
        );
        ra.unwrap();
        rb.unwrap();
    }

    #[tokio::test]
    async fn resize_applies_to_the_pty() {
        let (session, mut rx) = PtySession::spawn().unwrap();
        session.resize(35, 100).unwrap();
        // Give the kernel a beat to propagate the winsize
        tokio::time::sleep(Duration::from_millis(200)).await;
        session.send_command("stty size").await.unwrap();

        let output =
            drain_until(&mut rx, Duration::from_secs(5), |s| s.contains("35 100")).await;
        assert!(output.contains("35 100"), "got: {output:?}");

        session.close().await;
    }

    #[tokio::test]
    async fn writes_after_close_error_instead_of_panicking() {
        let (session, _rx) = PtySession::spawn().unwrap();
        session.close().await;
        assert!(session.send_command("echo nope").await.is_err());
        assert!(session.resize(10, 10).is_err());
    }
}
