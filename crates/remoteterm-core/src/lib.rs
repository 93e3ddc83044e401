//! remoteterm-core - remote terminal bridge engine
//!
//! Architecture: portable-pty (process) + alacritty_terminal (screen
//! emulation) + two transports over one shared core.
//!
//! - `pty`: one pseudo-terminal + child shell per session
//! - `screen`: virtual terminal, TUI chrome cleanup, content diffing
//! - `stream`: chat (screen-diffing) and socket (raw) delivery workers
//! - `registry`: client-id -> session map
//! - `format` / `sink`: message shaping and transport-agnostic delivery
//! - `telegram` / `web`: the two bridges
//! - `auth` / `config` / `platform`: admission, persistence, OS shim

pub mod auth;
pub mod command;
pub mod config;
pub mod format;
pub mod platform;
pub mod pty;
pub mod registry;
pub mod screen;
pub mod sink;
pub mod stream;
pub mod telegram;
pub mod web;

pub use config::Config;
pub use pty::PtySession;
pub use registry::{SessionRecord, SessionRegistry};
pub use sink::{ConsoleSink, MockSink, OutputSink};
