//! Standalone mode: local read-eval loop with no transport

use std::io::Write;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};

use remoteterm_core::stream;
use remoteterm_core::{ConsoleSink, PtySession};

const BANNER: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

pub async fn run() -> Result<()> {
    println!("Terminal Standalone Mode");
    println!("{BANNER}");
    println!("Commands:");
    println!("  Type any shell command");
    println!("  'exit' to quit");
    println!("{BANNER}");
    println!();

    let sink = ConsoleSink;
    let (terminal, mut output) = PtySession::spawn()?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    print!("$ ");
    std::io::stdout().flush()?;

    while let Some(line) = lines.next_line().await? {
        let command = line.trim();

        if command == "exit" || command == "quit" {
            break;
        }
        if command.is_empty() {
            print!("$ ");
            std::io::stdout().flush()?;
            continue;
        }

        println!("\n→ Executing: {command}\n");
        if let Err(e) = terminal.send_command(command).await {
            eprintln!("❌ Write failed: {e}");
            break;
        }
        stream::chat::stream_once(&mut output, &sink).await;

        println!("\n{BANNER}");
        print!("$ ");
        std::io::stdout().flush()?;
    }

    terminal.close().await;
    println!("\nGoodbye!");
    Ok(())
}
