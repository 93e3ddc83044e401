//! First-run approval handshake
//!
//! Binds a human to the whitelist: show an 8-digit code on the operator's
//! terminal, long-poll the bot for incoming messages, and whitelist the
//! sender who echoes the code back within the expiry window.

use anyhow::{bail, Context, Result};
use teloxide::payloads::GetUpdatesSetters;
use teloxide::prelude::*;
use teloxide::types::UpdateKind;
use tracing::warn;

use crate::auth::{generate_approval_code, ApprovalOutcome, ApprovalState};
use crate::config::Config;

const BANNER: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

/// Run the approval flow against a fresh bot credential. On success the
/// config (credential + first whitelisted user) is persisted and returned.
pub async fn run_setup(token: &str) -> Result<Config> {
    println!("\n⏳ Connecting to Telegram...");

    let bot = Bot::new(token);
    let me = bot
        .get_me()
        .await
        .context("failed to connect to Telegram")?;
    let bot_username = me.username.clone().unwrap_or_default();

    let mut approval = ApprovalState::new(generate_approval_code()?);

    println!("✅ Connected!");
    println!("🤖 Bot: @{bot_username}");
    println!("\n{BANNER}");
    println!("🔐 SECURITY: First Connection Setup");
    println!("{BANNER}");
    println!("\nGo to Telegram and message @{bot_username}");
    println!("Then send this approval code:");
    println!("\n    👉 {}\n", approval.code());
    println!("Waiting for approval (expires in 15 minutes)...");

    let mut offset: i32 = 0;
    loop {
        let updates = match bot.get_updates().offset(offset).timeout(30).await {
            Ok(updates) => updates,
            Err(e) => {
                warn!(error = %e, "update poll failed, retrying");
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                continue;
            }
        };

        for update in updates {
            offset = offset.max(update.id.0 as i32 + 1);

            let UpdateKind::Message(msg) = update.kind else {
                continue;
            };
            let Some(text) = msg.text() else { continue };
            let Some(user) = msg.from.as_ref() else {
                continue;
            };
            let user_id = user.id.0 as i64;
            let username = user.username.clone().unwrap_or_default();

            match approval.check(text) {
                ApprovalOutcome::Approved => {
                    let config = Config {
                        bot_token: token.to_string(),
                        allowed_users: vec![user_id],
                        webui_password_hash: None,
                    };
                    config.save()?;

                    println!("\n✅ User approved!");
                    println!("   @{username} (ID: {user_id})\n");
                    println!("Whitelist saved. This user can now connect anytime.");

                    let reply = format!(
                        "✅ Approved!\n\n\
                         Terminal connected successfully.\n\
                         User: @{username} (ID: {user_id})\n\n\
                         You can now send commands.\n\
                         Try: ls"
                    );
                    let _ = bot.send_message(msg.chat.id, reply).await;
                    return Ok(config);
                }
                ApprovalOutcome::Invalid { remaining } => {
                    let _ = bot
                        .send_message(
                            msg.chat.id,
                            format!("❌ Invalid approval code. {remaining} attempts remaining."),
                        )
                        .await;
                }
                ApprovalOutcome::Exhausted => {
                    println!("\n❌ Too many failed attempts. Please restart setup.");
                    let _ = bot
                        .send_message(
                            msg.chat.id,
                            "❌ Too many failed attempts. Approval locked. \
                             Please restart the setup process.",
                        )
                        .await;
                    bail!("approval attempts exhausted");
                }
                ApprovalOutcome::Expired => {
                    println!("\n❌ Approval code expired. Please restart setup.");
                    let _ = bot
                        .send_message(
                            msg.chat.id,
                            "❌ Approval code expired. Please restart the setup process.",
                        )
                        .await;
                    bail!("approval code expired");
                }
            }
        }
    }
}
