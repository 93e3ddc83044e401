//! remote-term - interactive shell access over Telegram and a browser
//! terminal
//!
//! With no arguments: first run enters setup, later runs start the bot
//! bridge. `--web` serves the browser terminal, `--standalone` runs a local
//! REPL, `--daemon`/`--stop`/`--status` manage the background daemon.

mod daemon;
mod standalone;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use teloxide::Bot;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

use remoteterm_core::config::{self, Config};
use remoteterm_core::telegram::{run_setup, TelegramBridge};
use remoteterm_core::web;

const BANNER: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

#[derive(Parser, Debug)]
#[command(name = "remote-term", disable_version_flag = true)]
struct Args {
    /// Print version and exit
    #[arg(short = 'v', long)]
    version: bool,

    /// Local read-eval loop, no transport
    #[arg(long)]
    standalone: bool,

    /// Serve the browser terminal on localhost (default port 8080)
    #[arg(long, value_name = "PORT", num_args = 0..=1, default_missing_value = "8080")]
    web: Option<u16>,

    /// Run in the background as a daemon
    #[arg(long)]
    daemon: bool,

    /// Internal: this process is the daemon child
    #[arg(long, hide = true)]
    daemon_child: bool,

    /// Stop a running daemon
    #[arg(long)]
    stop: bool,

    /// Show daemon status
    #[arg(long)]
    status: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.version {
        println!("remote-term v{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }
    if args.stop {
        daemon::stop();
        return Ok(());
    }
    if args.status {
        daemon::status();
        return Ok(());
    }
    if args.daemon {
        // Re-exec as the detached child, passing through everything except
        // the --daemon flag itself (e.g. --web 8080)
        let extra: Vec<String> = std::env::args()
            .skip(1)
            .filter(|arg| arg != "--daemon")
            .collect();
        daemon::daemonize(&extra);
    }

    init_logging(args.daemon_child);

    let result = if args.standalone {
        standalone::run().await
    } else if let Some(port) = args.web {
        run_web(port).await
    } else if config::config_path().exists() {
        run_bridge(args.daemon_child).await
    } else {
        run_first_time_setup(args.daemon_child).await
    };

    if args.daemon_child {
        daemon::remove_pid_file();
    }
    result
}

fn init_logging(daemon_child: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if daemon_child {
        // Parent already pointed stdout/stderr at the log file
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Serve the browser terminal. The config may not exist yet; the web UI
/// runs its own password setup in that case.
async fn run_web(port: u16) -> Result<()> {
    let config = Config::load().unwrap_or_default();
    web::serve(port, config).await
}

/// Normal operation: load config and run the bot bridge until signalled.
async fn run_bridge(daemon_child: bool) -> Result<()> {
    let config = Config::load().context("error loading config")?;
    let bot = Bot::new(&config.bot_token);

    println!("Remote Terminal v{}", env!("CARGO_PKG_VERSION"));
    println!("✅ Configuration loaded");
    println!("👥 Allowed users: {}", config.allowed_users.len());
    print_ready_banner();

    let mut bridge = TelegramBridge::new(bot, &config);
    if daemon_child {
        bridge = bridge.with_cleanup_hook(Arc::new(daemon::remove_pid_file));
    }
    Arc::new(bridge).listen().await;
    Ok(())
}

/// First run: read `/setup <bot-token>` from stdin, run the approval
/// handshake, then start the bridge with the fresh config.
async fn run_first_time_setup(daemon_child: bool) -> Result<()> {
    println!("Remote Terminal v{}", env!("CARGO_PKG_VERSION"));
    println!("\nRun: /setup <bot-token>");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();

        let Some(token) = line.strip_prefix("/setup ") else {
            println!("Usage: /setup <bot-token>");
            continue;
        };

        let config = run_setup(token.trim()).await?;
        print_ready_banner();

        info!("setup complete, starting bridge");
        let bot = Bot::new(&config.bot_token);
        let mut bridge = TelegramBridge::new(bot, &config);
        if daemon_child {
            bridge = bridge.with_cleanup_hook(Arc::new(daemon::remove_pid_file));
        }
        Arc::new(bridge).listen().await;
        return Ok(());
    }
    Ok(())
}

fn print_ready_banner() {
    println!("\n{BANNER}");
    println!("[Ready] Listening for commands...");
    println!("{BANNER}");
    println!();
}
