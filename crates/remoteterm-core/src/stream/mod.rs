//! Output streamers: PTY bytes -> sink, one worker per session

pub mod chat;
pub mod socket;
