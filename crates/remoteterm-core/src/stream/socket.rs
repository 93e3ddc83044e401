//! Socket-variant output streamer
//!
//! The browser client runs a real terminal emulator, so bytes are forwarded
//! verbatim (ANSI sequences intact) with sub-perceptual latency for
//! keystroke echo. No screen emulation, no cleaning, no dedup.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::registry::SessionRegistry;

/// Poll cadence; low enough that echo feels instant.
const TICK: Duration = Duration::from_millis(5);
/// Flush once bytes have stopped arriving for this long.
const FLUSH_SILENCE: Duration = Duration::from_millis(1);
/// Sessions with no output for this long are shut down.
const MAX_IDLE: Duration = Duration::from_secs(30 * 60);

/// Per-connection streaming worker: accumulate bytes, flush on the first
/// quiet tick. Exits on stop signal, child exit, or idle timeout, then
/// cleans the session out of the registry.
pub async fn run_session(
    registry: Arc<SessionRegistry>,
    chat_id: i64,
    mut output: mpsc::Receiver<Vec<u8>>,
) {
    let Some(record) = registry.get(chat_id).await else {
        warn!(chat_id, "socket stream: record not found");
        return;
    };

    info!(chat_id, "socket streaming started");

    let mut stop_rx = record.subscribe_stop();
    let mut ticker = tokio::time::interval(TICK);

    let mut buffer: Vec<u8> = Vec::new();
    let mut last_output = Instant::now();

    loop {
        tokio::select! {
            _ = stop_rx.recv() => {
                info!(chat_id, "socket session manually stopped");
                flush(&record, &mut buffer).await;
                break;
            }

            chunk = output.recv() => match chunk {
                Some(data) => {
                    buffer.extend_from_slice(&data);
                    last_output = Instant::now();
                }
                None => {
                    info!(chat_id, "terminal exited");
                    flush(&record, &mut buffer).await;
                    record.sink.send_status("🔴 Session ended (program exited)").await;
                    break;
                }
            },

            _ = ticker.tick() => {
                if !buffer.is_empty() && last_output.elapsed() > FLUSH_SILENCE {
                    flush(&record, &mut buffer).await;
                }

                if last_output.elapsed() > MAX_IDLE {
                    info!(chat_id, "socket session idle timeout");
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
    info!(chat_id, "socket streaming ended");
}

async fn flush(record: &crate::registry::SessionRecord, buffer: &mut Vec<u8>) {
    if buffer.is_empty() {
        return;
    }
    let text = String::from_utf8_lossy(buffer).into_owned();
    record.sink.send_output(&text).await;
    buffer.clear();
}
