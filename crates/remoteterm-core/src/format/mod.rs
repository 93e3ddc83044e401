//! Chat message formatting: markdown conversion and size-aware splitting

mod markdown;
mod split;

pub use markdown::{escape_html, format_markdown_to_html, has_markdown};
pub use split::{
    split_at_safe_boundary, split_formatted_message, split_plain, TELEGRAM_MESSAGE_LIMIT,
};

/// Raw length above which markdown blocks get the expandable blockquote.
pub const EXPANDABLE_THRESHOLD: usize = 500;

/// Block-art runes that force monospace `<pre>` formatting so alignment
/// survives the proportional chat font.
const MONOSPACE_RUNES: &[char] = &['▐', '▛', '█', '▜', '▌', '▝', '▘', '░', '▒', '▓'];

/// Whether content needs monospace rendering to stay legible.
pub fn needs_monospace(s: &str) -> bool {
    s.chars().any(|r| MONOSPACE_RUNES.contains(&r))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_art_triggers_monospace() {
        assert!(needs_monospace("▓▓▓░░░ progress"));
        assert!(needs_monospace("█ bar chart █"));
        assert!(!needs_monospace("ordinary output"));
        assert!(!needs_monospace("── separators are not block art ──"));
    }
}
