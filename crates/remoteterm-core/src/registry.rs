//! Session registry - maps client ids to live sessions
//!
//! All access goes through a reader/writer lock. The one rule that keeps
//! the bridge responsive: closing a PTY blocks, so it never happens while
//! the lock is held.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Local};
use tokio::sync::{broadcast, RwLock};
use tracing::info;

use crate::pty::PtySession;
use crate::sink::OutputSink;

/// One live session: the PTY, where its output goes, and lifecycle state.
pub struct SessionRecord {
    pub terminal: Arc<PtySession>,
    pub sink: Arc<dyn OutputSink>,
    pub command: String,
    pub started_at: DateTime<Local>,
    active: AtomicBool,
    stop_tx: broadcast::Sender<()>,
    stop_fired: std::sync::Mutex<bool>,
}

impl SessionRecord {
    pub fn new(terminal: Arc<PtySession>, sink: Arc<dyn OutputSink>, command: String) -> Arc<Self> {
        let (stop_tx, _) = broadcast::channel(1);
        Arc::new(Self {
            terminal,
            sink,
            command,
            started_at: Local::now(),
            active: AtomicBool::new(true),
            stop_tx,
            stop_fired: std::sync::Mutex::new(false),
        })
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Flip active -> inactive; returns true for the caller that did it.
    /// A deactivated record may briefly remain observable in the registry
    /// but must not receive new input.
    pub fn deactivate(&self) -> bool {
        self.active.swap(false, Ordering::SeqCst)
    }

    /// Fire the stop signal exactly once; extra calls are no-ops.
    pub fn signal_stop(&self) {
        let mut fired = self.stop_fired.lock().unwrap_or_else(|e| e.into_inner());
        if !*fired {
            *fired = true;
            let _ = self.stop_tx.send(());
        }
    }

    pub fn stop_signalled(&self) -> bool {
        *self.stop_fired.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn subscribe_stop(&self) -> broadcast::Receiver<()> {
        self.stop_tx.subscribe()
    }

    /// Human-readable session summary for `/status`.
    pub fn status_text(&self) -> String {
        let elapsed = Local::now().signed_duration_since(self.started_at);
        let secs = elapsed.num_seconds().max(0);
        format!(
            "📊 Active Session\n\nCommand: {}\nDuration: {}m{}s\nStarted: {}",
            self.command,
            secs / 60,
            secs % 60,
            self.started_at.format("%H:%M:%S"),
        )
    }
}

/// Client-id -> session map behind a reader/writer lock.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<i64, Arc<SessionRecord>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, chat_id: i64, record: Arc<SessionRecord>) {
        self.sessions.write().await.insert(chat_id, record);
    }

    pub async fn get(&self, chat_id: i64) -> Option<Arc<SessionRecord>> {
        self.sessions.read().await.get(&chat_id).cloned()
    }

    pub async fn remove(&self, chat_id: i64) -> Option<Arc<SessionRecord>> {
        self.sessions.write().await.remove(&chat_id)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Stop every active session. Records are collected and the map cleared
    /// under the write lock; the blocking PTY closes happen after it is
    /// released so unrelated lookups never stall behind teardown.
    pub async fn close_all(&self) {
        let records: Vec<Arc<SessionRecord>> = {
            let mut sessions = self.sessions.write().await;
            let records = sessions
                .values()
                .filter(|r| r.deactivate())
                .cloned()
                .collect();
            sessions.clear();
            records
        };

        info!(count = records.len(), "closing all sessions");
        for record in records {
            record.signal_stop();
            record.terminal.close().await;
        }
    }
}
