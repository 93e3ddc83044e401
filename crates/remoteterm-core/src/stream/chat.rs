//! Chat-variant output streamer
//!
//! Runs PTY output through a virtual terminal so TUI redraws become plain
//! text, strips chrome, and sends only content the user has not seen yet.
//! Messages are paced: quick flush once output settles, forced flush during
//! long streams so progress stays visible.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::pty::{DEFAULT_COLS, DEFAULT_ROWS};
use crate::registry::SessionRegistry;
use crate::screen::{clean_tui_chrome, find_new_content, ScreenReader};
use crate::sink::OutputSink;

/// Screen poll cadence.
const TICK: Duration = Duration::from_millis(200);
/// Silence needed before a settled flush.
const SEND_DELAY: Duration = Duration::from_millis(1500);
/// Force a flush this often while output keeps streaming.
const MAX_SEND_INTERVAL: Duration = Duration::from_secs(5);
/// Typing-indicator refresh while output accumulates (the transport's
/// indicator expires after ~5s).
const TYPING_INTERVAL: Duration = Duration::from_secs(4);
/// Sessions with no output for this long are shut down.
const MAX_IDLE: Duration = Duration::from_secs(30 * 60);

/// One-shot streaming: silence needed before sending a chunk.
const ONESHOT_SILENCE: Duration = Duration::from_millis(1500);
/// One-shot streaming: total silence that ends the command.
const ONESHOT_FINAL_SILENCE: Duration = Duration::from_secs(3);
/// One-shot streaming: absolute cap.
const ONESHOT_MAX_WAIT: Duration = Duration::from_secs(30);

/// Screen-diffing state for one chat session: what the user has seen and
/// how to compute what they have not.
pub struct ChatStreamer {
    screen: ScreenReader,
    last_cleaned: String,
    sent_lines: HashSet<String>,
}

impl Default for ChatStreamer {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatStreamer {
    pub fn new() -> Self {
        Self {
            screen: ScreenReader::new(DEFAULT_COLS as usize, DEFAULT_ROWS as usize),
            last_cleaned: String::new(),
            sent_lines: HashSet::new(),
        }
    }

    /// Feed raw PTY bytes into the virtual terminal.
    pub fn ingest(&mut self, data: &[u8]) {
        self.screen.write(data);
    }

    /// Compute the content the user has not seen yet, advancing the
    /// baseline. Returns `None` when there is nothing new to send.
    pub fn flush(&mut self) -> Option<String> {
        let cleaned = clean_tui_chrome(&self.screen.screen());
        if cleaned.is_empty() {
            return None;
        }

        let mut new_content = find_new_content(&self.last_cleaned, &cleaned);
        if new_content.is_empty() {
            return None;
        }

        // Suffix matching failed (full TUI redraw, or earlier content was
        // collapsed): fall back to line-level dedup against everything sent
        // so far.
        if new_content == cleaned && !self.last_cleaned.is_empty() {
            debug!(tracked = self.sent_lines.len(), "suffix match failed, line dedup");
            let unsent: Vec<&str> = new_content
                .split('\n')
                .filter(|line| {
                    let key = line.trim();
                    !key.is_empty() && !self.sent_lines.contains(key)
                })
                .collect();
            new_content = if unsent.is_empty() {
                String::new()
            } else {
                unsent.join("\n").trim().to_string()
            };
        }

        if !new_content.is_empty() {
            for line in new_content.split('\n') {
                let key = line.trim();
                if !key.is_empty() {
                    self.sent_lines.insert(key.to_string());
                }
            }
        }

        self.last_cleaned = cleaned;
        if new_content.is_empty() {
            None
        } else {
            Some(new_content)
        }
    }
}

/// Per-session streaming worker for a persistent chat session. Exits on
/// stop signal, child exit, or idle timeout; always deactivates the record,
/// removes it from the registry, and closes the PTY (never under the lock).
pub async fn run_session(
    registry: Arc<SessionRegistry>,
    chat_id: i64,
    mut output: mpsc::Receiver<Vec<u8>>,
) {
    let Some(record) = registry.get(chat_id).await else {
        warn!(chat_id, "session stream: record not found");
        return;
    };

    info!(chat_id, "session streaming started");

    let mut streamer = ChatStreamer::new();
    let mut stop_rx = record.subscribe_stop();
    let mut ticker = tokio::time::interval(TICK);

    let mut has_new_data = false;
    let mut last_output = Instant::now();
    let mut last_send = Instant::now();
    let mut last_typing = Instant::now();

    loop {
        tokio::select! {
            _ = stop_rx.recv() => {
                info!(chat_id, "session manually stopped");
                if has_new_data {
                    if let Some(content) = streamer.flush() {
                        record.sink.send_output(&content).await;
                    }
                }
                break;
            }

            chunk = output.recv() => match chunk {
                Some(data) => {
                    streamer.ingest(&data);
                    has_new_data = true;
                    last_output = Instant::now();
                }
                None => {
                    info!(chat_id, "terminal exited");
                    if has_new_data {
                        if let Some(content) = streamer.flush() {
                            record.sink.send_output(&content).await;
                        }
                    }
                    record.sink.send_status("🔴 Session ended (program exited)").await;
                    break;
                }
            },

            _ = ticker.tick() => {
                // Keep the transport's typing indicator alive while output
                // is still accumulating
                if has_new_data && last_typing.elapsed() > TYPING_INTERVAL {
                    record.sink.send_typing().await;
                    last_typing = Instant::now();
                }

                let settled = has_new_data && last_output.elapsed() > SEND_DELAY;
                let forced = has_new_data && last_send.elapsed() > MAX_SEND_INTERVAL;
                if settled || forced {
                    if let Some(content) = streamer.flush() {
                        record.sink.send_output(&content).await;
                    }
                    has_new_data = false;
                    last_send = Instant::now();
                }

                if last_output.elapsed() > MAX_IDLE {
                    info!(chat_id, "session idle timeout");
                    record.sink.send_status("⏱️ Session timed out (30min idle)").await;
                    break;
                }
            }
        }
    }

    if record.deactivate() {
        registry.remove(chat_id).await;
    }
    record.terminal.close().await;
    info!(chat_id, "session streaming ended");
}

/// One-shot command streaming: collect output until it settles, clean it,
/// send, and return. The receiver is borrowed so standalone mode can keep
/// issuing commands on the same terminal.
pub async fn stream_once(output: &mut mpsc::Receiver<Vec<u8>>, sink: &dyn OutputSink) {
    let mut screen = ScreenReader::new(DEFAULT_COLS as usize, DEFAULT_ROWS as usize);
    let mut ticker = tokio::time::interval(TICK);

    let start = Instant::now();
    let mut last_output = Instant::now();
    let mut has_new_data = false;

    loop {
        tokio::select! {
            chunk = output.recv() => match chunk {
                Some(data) => {
                    screen.write(&data);
                    has_new_data = true;
                    last_output = Instant::now();
                }
                None => {
                    flush_diff(&mut screen, sink).await;
                    return;
                }
            },

            _ = ticker.tick() => {
                if has_new_data && last_output.elapsed() > ONESHOT_SILENCE {
                    flush_diff(&mut screen, sink).await;
                    has_new_data = false;
                }

                if start.elapsed() > ONESHOT_MAX_WAIT {
                    if has_new_data {
                        flush_diff(&mut screen, sink).await;
                    }
                    return;
                }

                if !has_new_data && last_output.elapsed() > ONESHOT_FINAL_SILENCE {
                    return;
                }
            }
        }
    }
}

async fn flush_diff(screen: &mut ScreenReader, sink: &dyn OutputSink) {
    let cleaned = clean_tui_chrome(&screen.diff());
    if !cleaned.is_empty() {
        sink.send_output(&cleaned).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MockSink;

    #[test]
    fn first_flush_sends_full_screen() {
        let mut streamer = ChatStreamer::new();
        streamer.ingest(b"hello world\r\n");
        assert_eq!(streamer.flush().as_deref(), Some("hello world"));
    }

    #[test]
    fn unchanged_screen_flushes_nothing() {
        let mut streamer = ChatStreamer::new();
        streamer.ingest(b"static\r\n");
        streamer.flush();
        assert_eq!(streamer.flush(), None);
    }

    #[test]
    fn appended_output_flushes_only_the_new_lines() {
        let mut streamer = ChatStreamer::new();
        streamer.ingest(b"first line\r\n");
        assert_eq!(streamer.flush().as_deref(), Some("first line"));

        streamer.ingest(b"second line\r\n");
        assert_eq!(streamer.flush().as_deref(), Some("second line"));
    }

    #[test]
    fn chrome_is_stripped_before_sending() {
        let mut streamer = ChatStreamer::new();
        streamer.ingest(b"\x1b[31mresult\x1b[0m\r\n");
        streamer.ingest("────────────────\r\n".as_bytes());
        streamer.ingest("✶ Pondering…\r\n".as_bytes());
        assert_eq!(streamer.flush().as_deref(), Some("result"));
    }

    #[test]
    fn full_redraw_dedups_already_sent_lines() {
        let mut streamer = ChatStreamer::new();
        streamer.ingest(b"alpha\r\nbeta\r\n");
        assert!(streamer.flush().is_some());

        // Full-screen redraw: none of the old screen's suffix lines survive,
        // but a previously sent line reappears alongside a new one
        streamer.ingest(b"\x1b[2J\x1b[H");
        streamer.ingest(b"alpha\r\ndelta\r\n");
        let flushed = streamer.flush().expect("new content");
        assert!(flushed.contains("delta"));
        assert!(!flushed.contains("alpha"));
    }

    #[test]
    fn redraw_with_nothing_new_flushes_nothing() {
        let mut streamer = ChatStreamer::new();
        streamer.ingest(b"alpha\r\nbeta\r\n");
        streamer.flush();

        // Redraw shows only a line the user has already seen
        streamer.ingest(b"\x1b[2J\x1b[H");
        streamer.ingest(b"alpha\r\n");
        assert_eq!(streamer.flush(), None);
    }

    #[test]
    fn blank_screen_flushes_nothing() {
        let mut streamer = ChatStreamer::new();
        assert_eq!(streamer.flush(), None);
    }

    #[test]
    fn conversation_progression_sends_each_answer_once() {
        let mut streamer = ChatStreamer::new();
        streamer.ingest(b"The answer is 4.\r\n");
        assert_eq!(streamer.flush().as_deref(), Some("The answer is 4."));

        // The TUI redraws the whole transcript plus the next answer; only
        // the next answer goes out
        streamer.ingest(b"\x1b[2J\x1b[H");
        streamer.ingest(b"The answer is 4.\r\nThe square is 16.\r\n");
        assert_eq!(streamer.flush().as_deref(), Some("The square is 16."));

        assert_eq!(streamer.flush(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn stream_once_sends_settled_output() {
        let (tx, mut rx) = mpsc::channel::<Vec<u8>>(10);
        let sink = MockSink::new();

        tx.send(b"ONE_SHOT_OUTPUT\r\n".to_vec()).await.unwrap();
        drop(tx);

        stream_once(&mut rx, &sink).await;

        let outputs = sink.outputs().await;
        assert!(
            outputs.iter().any(|o| o.contains("ONE_SHOT_OUTPUT")),
            "outputs: {outputs:?}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stream_once_with_no_output_sends_nothing_and_returns() {
        let (tx, mut rx) = mpsc::channel::<Vec<u8>>(1);
        let sink = MockSink::new();

        // Keep the sender alive so termination comes from the silence
        // threshold, not channel close
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            drop(tx);
        });

        stream_once(&mut rx, &sink).await;
        assert!(sink.outputs().await.is_empty());
        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn stream_once_flushes_in_chunks_on_pauses() {
        let (tx, mut rx) = mpsc::channel::<Vec<u8>>(10);
        let sink = MockSink::new();

        let producer = tokio::spawn(async move {
            tx.send(b"chunk one\r\n".to_vec()).await.unwrap();
            tokio::time::sleep(Duration::from_secs(2)).await;
            tx.send(b"chunk two\r\n".to_vec()).await.unwrap();
            tokio::time::sleep(Duration::from_secs(2)).await;
        });

        stream_once(&mut rx, &sink).await;
        producer.await.unwrap();

        let outputs = sink.outputs().await;
        let all = outputs.join("\n");
        assert!(all.contains("chunk one"), "outputs: {outputs:?}");
        assert!(all.contains("chunk two"), "outputs: {outputs:?}");
        assert!(outputs.len() >= 2, "expected separate chunks: {outputs:?}");
    }
}
