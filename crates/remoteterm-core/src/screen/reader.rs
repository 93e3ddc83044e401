//! Virtual terminal screen reader
//!
//! Feeds raw PTY bytes through a terminal emulator and reads back the
//! composed screen as plain text. TUI applications position output with
//! absolute cursor moves; stripping escape codes destroys that layout, so
//! instead we keep a virtual screen and read what a human would see.

use alacritty_terminal::event::{Event as TermEvent, EventListener};
use alacritty_terminal::grid::Dimensions;
use alacritty_terminal::index::Line;
use alacritty_terminal::term::cell::Flags;
use alacritty_terminal::term::{Config as TermConfig, Term};
use alacritty_terminal::vte::ansi::Processor;

/// Scrollback kept above the visible area. Only the visible grid is ever
/// read; the headroom just keeps resize/scroll handling well-defined.
const SCROLLBACK_LINES: usize = 10_000;

/// Terminal dimensions handed to the emulator.
struct TermSize {
    cols: usize,
    rows: usize,
}

impl Dimensions for TermSize {
    fn total_lines(&self) -> usize {
        self.rows + SCROLLBACK_LINES
    }

    fn screen_lines(&self) -> usize {
        self.rows
    }

    fn columns(&self) -> usize {
        self.cols
    }
}

/// Event listener that discards emulator events (bells, title changes);
/// only the grid contents matter here.
struct EventProxy;

impl EventListener for EventProxy {
    fn send_event(&self, _event: TermEvent) {}
}

/// Screen-emulating reader over a byte stream of terminal output.
pub struct ScreenReader {
    term: Term<EventProxy>,
    processor: Processor,
    last_screen: String,
}

impl ScreenReader {
    /// Dimensions should match the PTY size so cursor positioning lands on
    /// the same cells the child process targeted.
    pub fn new(cols: usize, rows: usize) -> Self {
        let term = Term::new(
            TermConfig::default(),
            &TermSize { cols, rows },
            EventProxy,
        );
        Self {
            term,
            processor: Processor::new(),
            last_screen: String::new(),
        }
    }

    /// Feed raw PTY output into the emulator.
    pub fn write(&mut self, data: &[u8]) {
        self.processor.advance(&mut self.term, data);
    }

    /// Current visible screen as plain text. Trailing whitespace is trimmed
    /// from each line and trailing empty lines are removed; an all-blank
    /// screen is the empty string.
    pub fn screen(&self) -> String {
        let grid = self.term.grid();
        let rows = grid.screen_lines();
        let mut lines: Vec<String> = Vec::with_capacity(rows);

        for y in 0..rows {
            let Ok(line_idx) = i32::try_from(y) else { break };
            let row = &grid[Line(line_idx)];
            // Wide chars (CJK, emoji) occupy two cells; the second carries a
            // spacer flag and must not become a stray space.
            let text: String = row
                .into_iter()
                .filter(|cell| !cell.flags.contains(Flags::WIDE_CHAR_SPACER))
                .map(|cell| cell.c)
                .collect();
            lines.push(text.trim_end().to_string());
        }

        while lines.last().is_some_and(|l| l.is_empty()) {
            lines.pop();
        }

        lines.join("\n")
    }

    /// Lines that differ from (or lie beyond) the screen captured at the
    /// previous `diff` call. First call returns the full screen; an
    /// unchanged screen returns the empty string.
    pub fn diff(&mut self) -> String {
        let current = self.screen();
        if current == self.last_screen {
            return String::new();
        }
        let diff = diff_screens(&self.last_screen, &current);
        self.last_screen = current;
        diff
    }

    /// Forget the last-seen screen; the next `diff` returns full content.
    pub fn reset(&mut self) {
        self.last_screen.clear();
    }

    pub fn resize(&mut self, rows: usize, cols: usize) {
        self.term.resize(TermSize { cols, rows });
    }
}

/// Line-set difference between two screen states: lines that changed or are
/// new in `current`.
fn diff_screens(old: &str, current: &str) -> String {
    if old.is_empty() {
        return current.to_string();
    }

    let old_lines: Vec<&str> = old.split('\n').collect();
    let mut diff: Vec<&str> = Vec::new();

    for (i, line) in current.split('\n').enumerate() {
        if i >= old_lines.len() || line != old_lines[i] {
            diff.push(line);
        }
    }

    if diff.is_empty() {
        return String::new();
    }
    diff.join("\n").trim().to_string()
}
