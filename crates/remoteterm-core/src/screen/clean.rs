//! TUI chrome filtering and new-content extraction
//!
//! The virtual screen renders everything a TUI draws: separators, prompt
//! bars, status lines, keyboard hints. Chat output only wants the actual
//! content, so screens are cleaned before delivery and diffed against what
//! was already sent.

/// Box-drawing separator runes (solid, dashed, dotted variants).
const SEPARATOR_RUNES: &[char] = &['─', '━', '═', '—', '╌', '╍', '┄', '┅', '┈', '┉'];

/// First runes of transient thinking/spinner indicator lines.
const SPINNER_RUNES: &[char] = &['✶', '✻', '✦', '✧', '✢', '✽', '✳', '·'];

/// Status-bar fragments that identify chrome lines wherever they appear.
const CHROME_FRAGMENTS: &[&str] = &[
    "? for shortcuts",
    "Chrome extension not detected",
    "chrome to install",
    "claude.ai/chrome",
    "ctrl+g to edit in VS Code",
    "MCP server needs auth",
    "/plugin marketplace",
    "/plugin install",
];

/// Keyboard-hint fragments, matched case-insensitively.
const HINT_FRAGMENTS: &[&str] = &[
    "esc to cancel",
    "esc to interrupt",
    "tab to amend",
    "ctrl+o to",
    "ctrl+e to",
    "shift+tab to cycle",
];

/// Remove terminal UI chrome from a rendered screen. Strips separators,
/// echoed prompts, status bars, thinking indicators and keyboard hints that
/// are part of the TUI layout but noise in a chat message.
pub fn clean_tui_chrome(output: &str) -> String {
    let mut cleaned: Vec<String> = Vec::new();

    for line in output.split('\n') {
        let trimmed = line.trim();

        // Pure or prompt-bar separator lines
        if !trimmed.is_empty() && (is_only_separators(trimmed) || is_mostly_separators(trimmed)) {
            continue;
        }

        // Echoed user prompt lines; the user already sees their own message
        if trimmed.starts_with('❯') {
            continue;
        }

        // Response bracket lines are a UI element
        if trimmed.starts_with('⎿') {
            continue;
        }

        if CHROME_FRAGMENTS.iter().any(|f| trimmed.contains(f)) || trimmed.starts_with("Tip:") {
            continue;
        }

        let lower = trimmed.to_lowercase();
        if HINT_FRAGMENTS.iter().any(|f| lower.contains(f)) {
            continue;
        }

        if trimmed == "Checking for updates" {
            continue;
        }

        // Menu navigation arrows and edit-acceptance chrome
        if trimmed.starts_with('⏵') || trimmed.contains("accept edits on") {
            continue;
        }

        // Status bar text rendered twice by the emulator
        if is_duplicated_text(trimmed) {
            continue;
        }

        // Response bullet: "● text" -> "text"; the message shape already
        // marks it as a response.
        let mut line_out = line.to_string();
        if let Some(rest) = trimmed.strip_prefix('●') {
            let rest = rest.trim();
            if rest.is_empty() {
                continue;
            }
            line_out = rest.to_string();
        }

        // Transient thinking indicators ("✶ Pondering…", "* Reticulating…")
        if let Some(first) = trimmed.chars().next() {
            if SPINNER_RUNES.contains(&first) {
                continue;
            }
            if first == '*' && trimmed.contains('…') {
                continue;
            }
        }

        // Short Title Case phrases are conversation titles from the status bar
        if is_status_bar_title(trimmed) {
            continue;
        }

        cleaned.push(line_out);
    }

    let mut result = cleaned.join("\n").trim().to_string();

    // Collapse runs of blank lines left behind by removed chrome
    while result.contains("\n\n\n") {
        result = result.replace("\n\n\n", "\n\n");
    }

    result
}

/// Only separator runes and spaces.
fn is_only_separators(s: &str) -> bool {
    s.chars().all(|r| r == ' ' || SEPARATOR_RUNES.contains(&r))
}

/// More than 60% of non-space runes are separators; catches prompt bars
/// rendered as "────what─is─2+2 ────────────". Lines shorter than 10 runes
/// need the exact match above.
fn is_mostly_separators(s: &str) -> bool {
    let mut sep = 0usize;
    let mut total = 0usize;
    for r in s.chars() {
        if r == ' ' {
            continue;
        }
        total += 1;
        if SEPARATOR_RUNES.contains(&r) {
            sep += 1;
        }
    }
    if total < 10 {
        return false;
    }
    sep as f64 / total as f64 > 0.6
}

/// Short Title Case phrase: at most 4 words, at most 40 chars, every word
/// starting with an uppercase letter, remainder letters/hyphen/apostrophe.
/// Matches conversation titles the status bar injects into the screen.
fn is_status_bar_title(s: &str) -> bool {
    let words: Vec<&str> = s.split_whitespace().collect();
    if words.is_empty() || words.len() > 4 || s.len() > 40 {
        return false;
    }
    for word in words {
        let mut chars = word.chars();
        match chars.next() {
            Some(first) if first.is_ascii_uppercase() => {}
            _ => return false,
        }
        if !chars.all(|r| r.is_ascii_alphabetic() || r == '-' || r == '\'') {
            return false;
        }
    }
    true
}

/// Whole-phrase repetition like "Claude Code Claude Code" — a status-bar
/// rendering artifact.
fn is_duplicated_text(s: &str) -> bool {
    let words: Vec<&str> = s.split_whitespace().collect();
    if words.len() < 2 || words.len() % 2 != 0 {
        return false;
    }
    let half = words.len() / 2;
    words[..half] == words[half..]
}

/// Extract only new content from a cleaned screen by locating where old
/// content ends. Searches for the longest suffix of the old screen as a
/// contiguous line block in the new screen (content may have scrolled up);
/// whatever follows the match is new. Returns the whole current screen when
/// no suffix matches (full TUI redraw) so the caller can fall back to
/// line-level dedup.
pub fn find_new_content(old: &str, current: &str) -> String {
    if old.is_empty() {
        return current.to_string();
    }
    if current == old {
        return String::new();
    }

    let old_lines: Vec<&str> = old.split('\n').collect();
    let new_lines: Vec<&str> = current.split('\n').collect();

    // Trailing whitespace can differ between snapshots of the same line
    let norm = |s: &str| s.trim_end_matches([' ', '\t']).to_string();
    let new_norm: Vec<String> = new_lines.iter().map(|l| norm(l)).collect();

    for suffix_start in 0..old_lines.len() {
        let suffix: Vec<String> = old_lines[suffix_start..].iter().map(|l| norm(l)).collect();

        if suffix.len() > new_norm.len() {
            continue;
        }
        for n_start in 0..=(new_norm.len() - suffix.len()) {
            if new_norm[n_start..n_start + suffix.len()] == suffix[..] {
                let after = n_start + suffix.len();
                if after >= new_lines.len() {
                    return String::new();
                }
                return new_lines[after..].join("\n").trim().to_string();
            }
        }
    }

    current.to_string()
}
