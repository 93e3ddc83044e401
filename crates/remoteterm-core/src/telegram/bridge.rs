//! Telegram bot bridge
//!
//! Routes incoming messages: whitelist gate, slash commands, then either
//! forward into the active session or classify as interactive (persistent
//! session) vs one-shot (transient terminal, stream, tear down).

use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::types::ChatAction;
use tracing::{error, info, warn};

use crate::command::is_interactive_command;
use crate::config::Config;
use crate::pty::PtySession;
use crate::registry::{SessionRecord, SessionRegistry};
use crate::stream;
use crate::telegram::TelegramSink;

const WELCOME_TEXT: &str = "✅ Connected!\n\n\
Just send commands:\n\
• ls, pwd, cat → one-shot commands\n\
• claude, python3, node → auto-starts interactive session\n\
• /exit or /stop → end interactive session\n\
• /status → show session info";

/// Optional teardown callback run after sessions are flushed on shutdown
/// (daemon mode removes its PID file here).
pub type CleanupHook = Arc<dyn Fn() + Send + Sync>;

pub struct TelegramBridge {
    bot: Bot,
    allowed_users: Vec<i64>,
    registry: Arc<SessionRegistry>,
    cleanup_hook: Option<CleanupHook>,
}

impl TelegramBridge {
    pub fn new(bot: Bot, config: &Config) -> Self {
        Self {
            bot,
            allowed_users: config.allowed_users.clone(),
            registry: Arc::new(SessionRegistry::new()),
            cleanup_hook: None,
        }
    }

    pub fn with_cleanup_hook(mut self, hook: CleanupHook) -> Self {
        self.cleanup_hook = Some(hook);
        self
    }

    pub fn registry(&self) -> Arc<SessionRegistry> {
        Arc::clone(&self.registry)
    }

    /// Run the bridge until the process is told to stop. A termination
    /// signal flushes and closes every session, runs the cleanup hook, and
    /// exits.
    pub async fn listen(self: Arc<Self>) {
        {
            let registry = Arc::clone(&self.registry);
            let hook = self.cleanup_hook.clone();
            tokio::spawn(async move {
                wait_for_shutdown_signal().await;
                info!("shutting down gracefully");
                registry.close_all().await;
                if let Some(hook) = hook {
                    hook();
                }
                std::process::exit(0);
            });
        }

        let bridge = Arc::clone(&self);
        let handler = Update::filter_message().endpoint(move |bot: Bot, msg: Message| {
            let bridge = Arc::clone(&bridge);
            async move { bridge.handle_message(bot, msg).await }
        });

        // Unique distribution key per update so input can be forwarded to a
        // session while another command is still streaming.
        Dispatcher::builder(self.bot.clone(), handler)
            .distribution_function(|_| None::<std::convert::Infallible>)
            .build()
            .dispatch()
            .await;
    }

    async fn handle_message(&self, bot: Bot, msg: Message) -> ResponseResult<()> {
        let chat_id = msg.chat.id;
        let Some(text) = msg.text() else {
            return Ok(());
        };
        let Some(user) = msg.from.as_ref() else {
            return Ok(());
        };
        let user_id = user.id.0 as i64;
        let username = user.username.clone().unwrap_or_default();

        if !self.allowed_users.contains(&user_id) {
            warn!(user = %username, user_id, "unauthorized sender");
            let _ = bot.send_message(chat_id, "❌ Unauthorized").await;
            return Ok(());
        }

        match text.trim() {
            "/start" => {
                let _ = bot.send_message(chat_id, WELCOME_TEXT).await;
            }
            "/exit" | "/stop" => self.stop_session(&bot, chat_id, &username).await,
            "/status" => self.show_status(&bot, chat_id).await,
            command => self.handle_command(&bot, chat_id, &username, command).await,
        }
        Ok(())
    }

    /// Route a non-slash message: into the live session if one exists,
    /// otherwise start a session or run it one-shot.
    async fn handle_command(&self, bot: &Bot, chat_id: ChatId, username: &str, text: &str) {
        if let Some(record) = self.registry.get(chat_id.0).await {
            if record.is_active() {
                info!(user = %username, input = %text, "forwarding to session");
                let _ = bot.send_chat_action(chat_id, ChatAction::Typing).await;
                if let Err(e) = record.terminal.send_command(text).await {
                    warn!(chat_id = %chat_id, error = %e, "session write failed");
                }
                return;
            }
        }

        if is_interactive_command(text) {
            self.start_session(bot, chat_id, username, text).await;
        } else {
            self.execute_one_shot(bot.clone(), chat_id, username.to_string(), text.to_string());
        }
    }

    /// Start a persistent interactive session and stream its output.
    async fn start_session(&self, bot: &Bot, chat_id: ChatId, username: &str, command: &str) {
        info!(user = %username, command = %command, "starting session");

        let sink = Arc::new(TelegramSink::new(bot.clone(), chat_id));
        let (terminal, output) = match PtySession::spawn() {
            Ok(v) => v,
            Err(e) => {
                error!(error = %e, "failed to create terminal");
                let _ = bot.send_message(chat_id, "❌ Error creating session").await;
                return;
            }
        };

        let record = SessionRecord::new(Arc::clone(&terminal), sink, command.to_string());
        self.registry.insert(chat_id.0, record).await;

        let _ = bot.send_chat_action(chat_id, ChatAction::Typing).await;
        if let Err(e) = terminal.send_command(command).await {
            warn!(chat_id = %chat_id, error = %e, "initial command write failed");
        }

        // No "session started" banner; the program's own output flows next
        tokio::spawn(stream::chat::run_session(
            Arc::clone(&self.registry),
            chat_id.0,
            output,
        ));
    }

    /// Run a one-shot command on a transient terminal. Spawned as its own
    /// task so slow commands never block update handling.
    fn execute_one_shot(&self, bot: Bot, chat_id: ChatId, username: String, command: String) {
        tokio::spawn(async move {
            info!(user = %username, command = %command, "one-shot command");
            let _ = bot.send_chat_action(chat_id, ChatAction::Typing).await;

            let sink = TelegramSink::new(bot.clone(), chat_id);
            let (terminal, mut output) = match PtySession::spawn() {
                Ok(v) => v,
                Err(e) => {
                    error!(error = %e, "failed to create terminal");
                    let _ = bot.send_message(chat_id, "❌ Error creating terminal").await;
                    return;
                }
            };

            if let Err(e) = terminal.send_command(&command).await {
                warn!(chat_id = %chat_id, error = %e, "one-shot write failed");
            }
            stream::chat::stream_once(&mut output, &sink).await;
            terminal.close().await;
            info!(chat_id = %chat_id, "one-shot complete");
        });
    }

    async fn stop_session(&self, bot: &Bot, chat_id: ChatId, username: &str) {
        let record = self.registry.remove(chat_id.0).await;
        match record {
            Some(record) if record.deactivate() => {
                info!(user = %username, "stopping session");
                record.signal_stop();
                record.terminal.close().await;
                let _ = bot.send_message(chat_id, "✅ Session ended").await;
            }
            _ => {
                let _ = bot.send_message(chat_id, "⚠️ No active session").await;
            }
        }
    }

    async fn show_status(&self, bot: &Bot, chat_id: ChatId) {
        let status = match self.registry.get(chat_id.0).await {
            Some(record) if record.is_active() => record.status_text(),
            _ => "📊 Status: No active session".to_string(),
        };
        let _ = bot.send_message(chat_id, status).await;
    }
}

/// Resolve on SIGINT or SIGTERM.
async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
