//! Telegram transport: sink, bridge, first-run approval

mod bridge;
mod setup;
mod sink;

pub use bridge::TelegramBridge;
pub use setup::run_setup;
pub use sink::TelegramSink;
