//! Screen emulation and TUI chrome cleanup

mod clean;
mod reader;

pub use clean::{clean_tui_chrome, find_new_content};
pub use reader::ScreenReader;
