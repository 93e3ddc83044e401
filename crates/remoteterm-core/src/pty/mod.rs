//! PTY session management

mod session;

pub use session::{PtySession, DEFAULT_COLS, DEFAULT_ROWS};
