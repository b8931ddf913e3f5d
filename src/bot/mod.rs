//! Telegram front end.

pub mod handler;
pub mod telegram;

pub use handler::{BotCommand, BotHandler, UpdateQueues};
pub use telegram::{split_message, TelegramClient};
