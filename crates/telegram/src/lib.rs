//! Telegram transport: the subscriber-facing command bot and the alert
//! notifier the evaluator delivers through.

pub mod bot;
pub mod notifier;

pub use bot::{PriceBot, TelegramError};
pub use notifier::TelegramNotifier;
