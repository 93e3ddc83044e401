//! Telegram output sink
//!
//! Chooses a top-level message shape from the content (monospace block for
//! ASCII art, blockquote for markdown, bare text otherwise), splits
//! oversize messages, and serializes sends because the transport rejects
//! overlapping writes on one chat.

use std::time::Duration;

use async_trait::async_trait;
use teloxide::payloads::SendMessageSetters;
use teloxide::prelude::*;
use teloxide::types::{ChatAction, ParseMode};
use tracing::warn;

use crate::format::{
    escape_html, format_markdown_to_html, has_markdown, needs_monospace, split_at_safe_boundary,
    split_formatted_message, split_plain, EXPANDABLE_THRESHOLD, TELEGRAM_MESSAGE_LIMIT,
};
use crate::sink::OutputSink;

/// Pause between consecutive chunks of one split message.
const CHUNK_PAUSE: Duration = Duration::from_millis(100);

/// Split an HTML message into sendable pieces, each independently wrapped
/// in the same top-level tag. `open_tag` is the full opening tag content
/// ("blockquote expandable") so attributes survive splitting. A message
/// within the limit comes back as-is.
pub(crate) fn chunk_html(formatted: &str, open_tag: &str, max_len: usize) -> Vec<String> {
    if formatted.len() <= max_len {
        return vec![formatted.to_string()];
    }

    let close_tag = open_tag.split(' ').next().unwrap_or(open_tag);
    let overhead = open_tag.len() + close_tag.len() + "<></>".len() + 100;
    let raw_max = max_len.saturating_sub(overhead);

    let inner = formatted
        .strip_prefix(&format!("<{open_tag}>"))
        .unwrap_or(formatted);
    let inner = inner
        .strip_suffix(&format!("</{close_tag}>"))
        .unwrap_or(inner);

    // Preformatted content gets byte-exact entity-safe cuts; flowed HTML
    // prefers paragraph and line boundaries
    let pieces = if close_tag == "pre" {
        split_at_safe_boundary(inner, raw_max)
    } else {
        split_formatted_message(inner, raw_max)
    };

    pieces
        .iter()
        .map(|piece| piece.trim())
        .filter(|piece| !piece.is_empty())
        .map(|piece| format!("<{open_tag}>{piece}</{close_tag}>"))
        .collect()
}

pub struct TelegramSink {
    bot: Bot,
    chat_id: ChatId,
    send_lock: tokio::sync::Mutex<()>,
}

impl TelegramSink {
    pub fn new(bot: Bot, chat_id: ChatId) -> Self {
        Self {
            bot,
            chat_id,
            send_lock: tokio::sync::Mutex::new(()),
        }
    }

    async fn send_plain(&self, text: &str) {
        if text.len() <= TELEGRAM_MESSAGE_LIMIT {
            if let Err(e) = self.bot.send_message(self.chat_id, text).await {
                warn!(chat_id = %self.chat_id, error = %e, "failed to send message");
            }
            return;
        }
        for chunk in split_plain(text, TELEGRAM_MESSAGE_LIMIT) {
            let chunk = chunk.trim();
            if chunk.is_empty() {
                continue;
            }
            if let Err(e) = self.bot.send_message(self.chat_id, chunk).await {
                warn!(chat_id = %self.chat_id, error = %e, "failed to send chunk");
            }
            tokio::time::sleep(CHUNK_PAUSE).await;
        }
    }

    async fn send_html(&self, formatted: &str, open_tag: &str) {
        let chunks = chunk_html(formatted, open_tag, TELEGRAM_MESSAGE_LIMIT);
        let single = chunks.len() == 1;

        for chunk in chunks {
            let sent = self
                .bot
                .send_message(self.chat_id, &chunk)
                .parse_mode(ParseMode::Html)
                .await;
            if let Err(e) = sent {
                warn!(chat_id = %self.chat_id, error = %e, "HTML send failed");
                if single {
                    // Degrade to plain text rather than dropping the message
                    let _ = self.bot.send_message(self.chat_id, &chunk).await;
                }
            }
            if !single {
                tokio::time::sleep(CHUNK_PAUSE).await;
            }
        }
    }
}

#[async_trait]
impl OutputSink for TelegramSink {
    async fn send_output(&self, output: &str) {
        let output = output.trim();
        if output.is_empty() {
            // Telegram rejects empty messages
            return;
        }

        let _guard = self.send_lock.lock().await;

        if needs_monospace(output) {
            let formatted = format!("<pre>{}</pre>", escape_html(output));
            self.send_html(&formatted, "pre").await;
        } else if has_markdown(output) {
            let converted = format_markdown_to_html(output);
            let open_tag = if output.len() > EXPANDABLE_THRESHOLD {
                "blockquote expandable"
            } else {
                "blockquote"
            };
            let formatted = format!("<{open_tag}>{converted}</blockquote>");
            self.send_html(&formatted, open_tag).await;
        } else {
            self.send_plain(output).await;
        }
    }

    async fn send_status(&self, status: &str) {
        let _guard = self.send_lock.lock().await;
        self.send_plain(status).await;
    }

    async fn send_typing(&self) {
        if let Err(e) = self
            .bot
            .send_chat_action(self.chat_id, ChatAction::Typing)
            .await
        {
            warn!(chat_id = %self.chat_id, error = %e, "failed to send typing action");
        }
    }
}
