//! Markdown to Telegram-HTML conversion
//!
//! Runs in five ordered phases so markers inside code never get
//! reinterpreted: extract fenced blocks, extract inline code, HTML-escape,
//! convert remaining markdown patterns, restore the extracted code with
//! proper tags. A cheap lexical probe short-circuits plain text (command
//! output) past the whole pipeline.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static RE_CODE_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(\w*)\n(.*?)\n```").unwrap());
static RE_INLINE_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"`([^`\n]+)`").unwrap());
static RE_HEADER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^#{1,6}\s+(.+)$").unwrap());
static RE_BULLET: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^(\s*)[-*]\s+").unwrap());
static RE_LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[([^\]]+)\]\(([^)]+)\)").unwrap());
static RE_BOLD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*(.+?)\*\*").unwrap());
static RE_STRIKETHROUGH: Lazy<Regex> = Lazy::new(|| Regex::new(r"~~(.+?)~~").unwrap());
static RE_ITALIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|[^*])\*([^*\n]+?)\*(?:[^*]|$)").unwrap());

/// Random placeholder prefix so extracted-code markers cannot collide with
/// real program output. Uniqueness is not a security property, but the
/// prefix still comes from the crypto source to avoid accidental overlap.
static PLACEHOLDER_PREFIX: Lazy<String> = Lazy::new(|| {
    let mut bytes = [0u8; 4];
    let _ = getrandom::getrandom(&mut bytes);
    format!("__PH{:06}__", u32::from_le_bytes(bytes) % 1_000_000)
});

struct CodeBlock {
    language: String,
    code: String,
}

/// Escape the HTML-reserved characters Telegram's parser cares about.
pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Cheap probe for markdown worth converting. Avoids running the regex
/// pipeline on plain text like ls output or a bare path.
pub fn has_markdown(s: &str) -> bool {
    if s.contains("```")
        || s.contains("**")
        || s.contains("~~")
        || s.contains('`')
        || s.contains("](")
    {
        return true;
    }
    for line in s.split('\n').take(20) {
        let trimmed = line.trim();
        let bytes = trimmed.as_bytes();
        if bytes.len() < 2 {
            continue;
        }
        if bytes[0] == b'#' {
            return true;
        }
        if (bytes[0] == b'-' || bytes[0] == b'*') && bytes[1] == b' ' {
            return true;
        }
        if trimmed.contains('*') {
            return true;
        }
    }
    false
}

/// Convert markdown to Telegram-compatible HTML.
pub fn format_markdown_to_html(input: &str) -> String {
    if input.is_empty() {
        return String::new();
    }

    if !has_markdown(input) {
        return escape_html(input);
    }

    let (text, blocks) = extract_code_blocks(input);
    let (text, inline_codes) = extract_inline_code(&text);
    let text = escape_html(&text);
    let text = convert_markdown_patterns(&text);
    let text = restore_code_blocks(&text, &blocks);
    restore_inline_code(&text, &inline_codes)
}

fn extract_code_blocks(input: &str) -> (String, Vec<CodeBlock>) {
    let mut blocks = Vec::new();
    let result = RE_CODE_BLOCK
        .replace_all(input, |caps: &Captures| {
            blocks.push(CodeBlock {
                language: caps[1].to_string(),
                code: caps[2].to_string(),
            });
            format!(
                "{p}CODEBLOCK{i}{p}",
                p = *PLACEHOLDER_PREFIX,
                i = blocks.len() - 1
            )
        })
        .into_owned();
    (result, blocks)
}

fn extract_inline_code(input: &str) -> (String, Vec<String>) {
    let mut codes = Vec::new();
    let result = RE_INLINE_CODE
        .replace_all(input, |caps: &Captures| {
            codes.push(caps[1].to_string());
            format!(
                "{p}INLINECODE{i}{p}",
                p = *PLACEHOLDER_PREFIX,
                i = codes.len() - 1
            )
        })
        .into_owned();
    (result, codes)
}

/// Convert markdown syntax in already-escaped text. Order matters:
/// line-based patterns first, bold before italic so `**` never feeds the
/// single-`*` rule.
fn convert_markdown_patterns(text: &str) -> String {
    let text = RE_HEADER.replace_all(text, "<b>$1</b>");
    let text = RE_BULLET.replace_all(&text, "${1}• ");
    let text = convert_links(&text);
    let text = RE_BOLD.replace_all(&text, "<b>$1</b>");
    let text = RE_STRIKETHROUGH.replace_all(&text, "<s>$1</s>");
    convert_italic(&text)
}

/// `[text](url)` with an allowlisted scheme becomes an anchor; anything else
/// (javascript:, data:, …) is rendered as literal text plus the URL so
/// malicious program output cannot inject a clickable payload.
fn convert_links(text: &str) -> String {
    RE_LINK
        .replace_all(text, |caps: &Captures| {
            let link_text = &caps[1];
            // HTML-escaping already ran, so & in URLs arrives as &amp;
            let url = caps[2].replace("&amp;", "&");
            let lower = url.to_lowercase();
            if lower.starts_with("http://")
                || lower.starts_with("https://")
                || lower.starts_with("tg://")
            {
                format!("<a href=\"{}\">{}</a>", url, link_text)
            } else {
                format!("{} ({})", link_text, url)
            }
        })
        .into_owned()
}

/// `*text*` to `<i>text</i>`. The pattern consumes one context character on
/// each side to avoid already-converted bold markers; those characters are
/// put back around the tag.
fn convert_italic(text: &str) -> String {
    RE_ITALIC
        .replace_all(text, |caps: &Captures| {
            let whole = &caps[0];
            let inner = &caps[1];
            let prefix = whole
                .chars()
                .next()
                .filter(|&c| c != '*')
                .map(String::from)
                .unwrap_or_default();
            let suffix = whole
                .chars()
                .last()
                .filter(|&c| c != '*')
                .map(String::from)
                .unwrap_or_default();
            format!("{}<i>{}</i>{}", prefix, inner, suffix)
        })
        .into_owned()
}

fn restore_code_blocks(text: &str, blocks: &[CodeBlock]) -> String {
    let mut text = text.to_string();
    for (i, block) in blocks.iter().enumerate() {
        let placeholder = format!("{p}CODEBLOCK{i}{p}", p = *PLACEHOLDER_PREFIX);
        let escaped = escape_html(&block.code);
        let replacement = if block.language.is_empty() {
            format!("<pre><code>{}</code></pre>", escaped)
        } else {
            format!(
                "<pre><code class=\"language-{}\">{}</code></pre>",
                block.language, escaped
            )
        };
        text = text.replacen(&placeholder, &replacement, 1);
    }
    text
}

fn restore_inline_code(text: &str, codes: &[String]) -> String {
    let mut text = text.to_string();
    for (i, code) in codes.iter().enumerate() {
        let placeholder = format!("{p}INLINECODE{i}{p}", p = *PLACEHOLDER_PREFIX);
        let replacement = format!("<code>{}</code>", escape_html(code));
        text = text.replacen(&placeholder, &replacement, 1);
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversion_table() {
        let cases: &[(&str, &str, &str)] = &[
            ("empty_input", "", ""),
            ("plain_text", "Hello world", "Hello world"),
            (
                "html_escaping",
                "Use <div> & \"quotes\"",
                "Use &lt;div&gt; &amp; &quot;quotes&quot;",
            ),
            ("bold", "This is **bold** text", "This is <b>bold</b> text"),
            (
                "italic",
                "This is *italic* text",
                "This is <i>italic</i> text",
            ),
            (
                "bold_and_italic",
                "**bold** and *italic*",
                "<b>bold</b> and <i>italic</i>",
            ),
            (
                "strikethrough",
                "This is ~~deleted~~ text",
                "This is <s>deleted</s> text",
            ),
            (
                "inline_code",
                "Use `fmt.Println` here",
                "Use <code>fmt.Println</code> here",
            ),
            (
                "inline_code_with_html",
                "Use `<div>` tag",
                "Use <code>&lt;div&gt;</code> tag",
            ),
            ("header_h1", "# Hello World", "<b>Hello World</b>"),
            ("header_h2", "## Section Title", "<b>Section Title</b>"),
            ("header_h3", "### Sub Section", "<b>Sub Section</b>"),
            (
                "link",
                "See [Google](https://google.com) for more",
                "See <a href=\"https://google.com\">Google</a> for more",
            ),
            (
                "link_with_ampersand",
                "See [results](https://example.com?a=1&b=2)",
                "See <a href=\"https://example.com?a=1&b=2\">results</a>",
            ),
            (
                "bullet_dash",
                "- item one\n- item two",
                "• item one\n• item two",
            ),
            (
                "bullet_asterisk",
                "* item one\n* item two",
                "• item one\n• item two",
            ),
            (
                "code_block_with_language",
                "```rust\nprintln!(\"hello\")\n```",
                "<pre><code class=\"language-rust\">println!(&quot;hello&quot;)</code></pre>",
            ),
            (
                "code_block_without_language",
                "```\nsome code\n```",
                "<pre><code>some code</code></pre>",
            ),
            (
                "markdown_inside_code_block_stays_literal",
                "```\n**not bold** and *not italic*\n```",
                "<pre><code>**not bold** and *not italic*</code></pre>",
            ),
            (
                "markdown_inside_inline_code_stays_literal",
                "Use `**not bold**` here",
                "Use <code>**not bold**</code> here",
            ),
            (
                "multiple_inline_codes",
                "Use `foo` and `bar` functions",
                "Use <code>foo</code> and <code>bar</code> functions",
            ),
        ];

        for (name, input, want) in cases {
            let got = format_markdown_to_html(input);
            assert_eq!(&got, want, "case {name}");
        }
    }

    #[test]
    fn code_block_preserves_html_chars() {
        let input = "```html\n<div class=\"test\">&amp;</div>\n```";
        let want = "<pre><code class=\"language-html\">&lt;div class=&quot;test&quot;&gt;&amp;amp;&lt;/div&gt;</code></pre>";
        assert_eq!(format_markdown_to_html(input), want);
    }

    #[test]
    fn mixed_content_realistic() {
        let input = "# Hello\n\nThis is **bold** with `code` and a [link](https://example.com)\n\n```python\nprint(\"hello\")\n```\n\n- item one\n- item two";
        let want = "<b>Hello</b>\n\nThis is <b>bold</b> with <code>code</code> and a <a href=\"https://example.com\">link</a>\n\n<pre><code class=\"language-python\">print(&quot;hello&quot;)</code></pre>\n\n• item one\n• item two";
        assert_eq!(format_markdown_to_html(input), want);
    }

    #[test]
    fn multiple_code_blocks_restore_in_order() {
        let input = "```go\nfoo()\n```\n\ntext\n\n```python\nbar()\n```";
        let want = "<pre><code class=\"language-go\">foo()</code></pre>\n\ntext\n\n<pre><code class=\"language-python\">bar()</code></pre>";
        assert_eq!(format_markdown_to_html(input), want);
    }

    #[test]
    fn extraction_helpers() {
        let (result, blocks) = extract_code_blocks("before\n```go\nfoo()\n```\nafter");
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].language, "go");
        assert_eq!(blocks[0].code, "foo()");
        assert!(result.contains("CODEBLOCK0"));

        let (result, codes) = extract_inline_code("Use `foo` and `bar`");
        assert_eq!(codes, vec!["foo", "bar"]);
        assert!(result.contains("INLINECODE0"));
        assert!(result.contains("INLINECODE1"));
    }

    #[test]
    fn probe_rejects_plain_and_accepts_markdown() {
        let cases: &[(&str, bool)] = &[
            ("Hello world", false),
            ("file1.txt\nfile2.rs\nmain.rs", false),
            ("/home/user/project", false),
            ("3 items found", false),
            ("non-interactive", false),
            ("This is **bold**", true),
            ("Use `value` here", true),
            ("```sh\ncode\n```", true),
            ("# Title", true),
            ("[click](https://example.com)", true),
            ("- item one", true),
            ("* item one", true),
            ("~~deleted~~", true),
        ];
        for (input, want) in cases {
            assert_eq!(has_markdown(input), *want, "input {input:?}");
        }
    }

    #[test]
    fn probe_false_means_output_is_escaped_input() {
        let inputs = ["plain output", "a < b & c > d", "/usr/local/bin"];
        for input in inputs {
            assert!(!has_markdown(input));
            assert_eq!(format_markdown_to_html(input), escape_html(input));
        }
    }

    #[test]
    fn url_scheme_allowlist() {
        let cases: &[(&str, &str)] = &[
            (
                "[click](https://example.com)",
                "<a href=\"https://example.com\">click</a>",
            ),
            (
                "[click](http://example.com)",
                "<a href=\"http://example.com\">click</a>",
            ),
            (
                "[open](tg://resolve?domain=test)",
                "<a href=\"tg://resolve?domain=test\">open</a>",
            ),
            (
                "[click](javascript:alert(1))",
                "click (javascript:alert(1))",
            ),
            ("[click](data:text/html,test)", "click (data:text/html,test)"),
        ];
        for (input, want) in cases {
            assert_eq!(&format_markdown_to_html(input), want);
        }
    }

    #[test]
    fn formatting_is_idempotent_for_plain_text() {
        // No markdown markers and no HTML-reserved characters: escape is the
        // identity, so a second pass changes nothing.
        let input = "just a sentence with nothing special";
        let once = format_markdown_to_html(input);
        assert_eq!(once, input);
        assert_eq!(format_markdown_to_html(&once), once);
    }

    #[test]
    fn unmatched_bold_markers_pass_through() {
        // `**` makes the probe fire but the pair never closes, so the text
        // survives conversion untouched.
        assert_eq!(
            format_markdown_to_html("This has ** unmatched markers"),
            "This has ** unmatched markers"
        );
    }

    #[test]
    fn bullets_keep_indentation() {
        assert_eq!(
            format_markdown_to_html("  - nested item"),
            "  • nested item"
        );
    }
}
