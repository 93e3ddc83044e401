//! Output sinks - where session output goes
//!
//! One capability set, several transports. Delivery is best-effort by
//! design: a failed send is logged and dropped because the session loop has
//! no useful recovery, and a dead transport will surface through its own
//! read path soon enough.

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::info;

/// Destination for session output and status lines.
#[async_trait]
pub trait OutputSink: Send + Sync {
    /// Deliver terminal output.
    async fn send_output(&self, output: &str);

    /// Deliver an out-of-band status line (session started/ended, errors).
    async fn send_status(&self, status: &str);

    /// Refresh the transport's "typing" indicator, where one exists.
    async fn send_typing(&self) {}
}

/// Prints output to the log; used by standalone mode.
pub struct ConsoleSink;

#[async_trait]
impl OutputSink for ConsoleSink {
    async fn send_output(&self, output: &str) {
        println!("{}", output);
    }

    async fn send_status(&self, status: &str) {
        info!(status = %status, "session status");
    }
}

/// Captures output for assertions in tests.
#[derive(Default)]
pub struct MockSink {
    outputs: Mutex<Vec<String>>,
    statuses: Mutex<Vec<String>>,
}

impl MockSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn outputs(&self) -> Vec<String> {
        self.outputs.lock().await.clone()
    }

    pub async fn statuses(&self) -> Vec<String> {
        self.statuses.lock().await.clone()
    }
}

#[async_trait]
impl OutputSink for MockSink {
    async fn send_output(&self, output: &str) {
        self.outputs.lock().await.push(output.to_string());
    }

    async fn send_status(&self, status: &str) {
        self.statuses.lock().await.push(status.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_sink_captures_in_order() {
        let sink = MockSink::new();
        sink.send_output("first").await;
        sink.send_output("second").await;
        sink.send_status("done").await;

        assert_eq!(sink.outputs().await, vec!["first", "second"]);
        assert_eq!(sink.statuses().await, vec!["done"]);
    }
}
