//! Size-aware message splitting
//!
//! Telegram rejects messages over ~4096 characters; chunks are kept under
//! 4000 to leave room for wrapper tags. Splitting prefers paragraph
//! boundaries, then single newlines, then a hard cut that never lands
//! inside an HTML entity.

/// Practical per-message character budget for the chat transport.
pub const TELEGRAM_MESSAGE_LIMIT: usize = 4000;

/// Split formatted HTML into chunks of at most `max_len` bytes, preferring
/// paragraph (`\n\n`) boundaries, then line boundaries, then entity-safe
/// hard cuts for single oversized lines.
pub fn split_formatted_message(formatted: &str, max_len: usize) -> Vec<String> {
    if formatted.len() <= max_len {
        return vec![formatted.to_string()];
    }

    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();

    for para in formatted.split("\n\n") {
        if !current.is_empty() && current.len() + 2 + para.len() > max_len {
            chunks.push(current.trim().to_string());
            current.clear();
        }

        // A single paragraph over the limit gets split on line boundaries
        if para.len() > max_len {
            for line in para.split('\n') {
                if !current.is_empty() && current.len() + 1 + line.len() > max_len {
                    chunks.push(current.trim().to_string());
                    current.clear();
                }
                // A single line over the limit needs a hard cut
                if line.len() > max_len {
                    let sub_chunks = split_at_safe_boundary(line, max_len);
                    let last = sub_chunks.len() - 1;
                    for (j, sc) in sub_chunks.iter().enumerate() {
                        if j == last {
                            if !current.is_empty() {
                                current.push('\n');
                            }
                            current.push_str(sc);
                        } else if !current.is_empty() {
                            current.push('\n');
                            current.push_str(sc);
                            chunks.push(current.trim().to_string());
                            current.clear();
                        } else {
                            chunks.push(sc.trim().to_string());
                        }
                    }
                    continue;
                }
                if !current.is_empty() {
                    current.push('\n');
                }
                current.push_str(line);
            }
            continue;
        }

        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(para);
    }

    if !current.is_empty() {
        chunks.push(current.trim().to_string());
    }

    chunks
}

/// Hard-cut a long string at `max_len` boundaries without breaking HTML
/// entities: each cut point scans back up to 10 characters and retreats
/// before any `&` that has not been closed with `;`. Cuts always land on
/// UTF-8 character boundaries. Concatenating the parts reproduces the
/// input exactly.
pub fn split_at_safe_boundary(s: &str, max_len: usize) -> Vec<String> {
    let mut parts = Vec::new();
    let mut rest = s;

    while rest.len() > max_len {
        let mut end = max_len;
        while end > 0 && !rest.is_char_boundary(end) {
            end -= 1;
        }

        let bytes = rest.as_bytes();
        let low = end.saturating_sub(10);
        let mut j = end;
        while j > low {
            j -= 1;
            if bytes[j] == b';' {
                break; // entity closed before the cut point
            }
            if bytes[j] == b'&' {
                end = j; // entity would straddle the cut; retreat before it
                break;
            }
        }

        // Degenerate input ('&' at offset zero): take the plain cut rather
        // than loop forever
        if end == 0 {
            end = max_len;
            while end > 0 && !rest.is_char_boundary(end) {
                end -= 1;
            }
            if end == 0 {
                end = rest.len();
            }
        }

        parts.push(rest[..end].to_string());
        rest = &rest[end..];
    }

    if !rest.is_empty() {
        parts.push(rest.to_string());
    }

    parts
}

/// Plain-text chunking for unformatted messages: fixed-size cuts on
/// character boundaries.
pub fn split_plain(text: &str, max_len: usize) -> Vec<String> {
    let mut parts = Vec::new();
    let mut rest = text;
    while rest.len() > max_len {
        let mut end = max_len;
        while end > 0 && !rest.is_char_boundary(end) {
            end -= 1;
        }
        if end == 0 {
            end = rest.len();
        }
        parts.push(rest[..end].to_string());
        rest = &rest[end..];
    }
    if !rest.is_empty() {
        parts.push(rest.to_string());
    }
    parts
}
