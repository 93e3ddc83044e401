//! Command classification: one-shot vs interactive session

/// Programs that need a persistent PTY session (REPLs, editors, pagers,
/// monitors, remote shells). Matched against the first word of a command.
const INTERACTIVE_COMMANDS: &[&str] = &[
    // AI assistants
    "claude",
    "claude-code",
    "aider",
    // Language REPLs
    "python",
    "python3",
    "ipython",
    "node",
    "deno",
    "bun",
    "irb",
    "ruby",
    "ghci",
    "stack",
    "lua",
    // Database CLIs
    "psql",
    "mysql",
    "redis-cli",
    // Editors
    "vim",
    "nvim",
    "emacs",
    "nano",
    // Pagers
    "less",
    "more",
    // Monitors
    "top",
    "htop",
    "btop",
    "watch",
    // Remote shells
    "ssh",
    "telnet",
];

/// Whether a command line should get a persistent session instead of a
/// one-shot execution. Exact match on the first whitespace-separated word.
pub fn is_interactive_command(command: &str) -> bool {
    match command.split_whitespace().next() {
        Some(first) => INTERACTIVE_COMMANDS.contains(&first),
        None => false,
    }
}
