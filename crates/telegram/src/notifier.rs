//! Alert delivery over the Telegram Bot API.

use async_trait::async_trait;
use pricewatch_core::{display_name, format_price, AlertEvent, Direction};
use pricewatch_engine::{AlertSink, DeliveryError};
use std::time::Duration;
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use teloxide::{ApiError, RequestError};
use tracing::{info, warn};

/// In-tick retry policy for transient transport errors.
const MAX_ATTEMPTS: u32 = 3;
const RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Sends triggered alerts to their chat, with bounded retries.
pub struct TelegramNotifier {
    bot: Bot,
}

impl TelegramNotifier {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

/// Errors that mean the chat can never be reached again. Anything else is
/// worth retrying.
fn unreachable_reason(err: &RequestError) -> Option<String> {
    let RequestError::Api(api) = err else {
        return None;
    };
    match api {
        ApiError::BotBlocked
        | ApiError::ChatNotFound
        | ApiError::UserNotFound
        | ApiError::UserDeactivated
        | ApiError::BotKicked
        | ApiError::BotKickedFromSupergroup
        | ApiError::GroupDeactivated
        | ApiError::CantInitiateConversation => Some(api.to_string()),
        _ => None,
    }
}

/// Format a triggered alert as an HTML message.
pub fn format_alert_message(event: &AlertEvent) -> String {
    let arrow = match event.direction {
        Direction::Above => "\u{1F4C8}",
        Direction::Below => "\u{1F4C9}",
    };

    let mut msg = format!(
        "\u{1F6A8} <b>Price Alert!</b>\n\n\
         <b>{}</b> is now {}\n\
         {} Crossed your <b>{}</b> threshold of {}",
        display_name(&event.asset),
        format_price(event.triggered_price),
        arrow,
        event.direction,
        format_price(event.threshold),
    );

    if event.stale_quote {
        msg.push_str("\n\n\u{26A0} Based on a cached quote; the price feed is unavailable.");
    }

    msg.push_str(&format!(
        "\n\n\u{23F0} {}",
        event.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    msg
}

#[async_trait]
impl AlertSink for TelegramNotifier {
    async fn deliver(&self, event: &AlertEvent) -> Result<(), DeliveryError> {
        let message = format_alert_message(event);
        let chat = ChatId(event.chat_id);

        let mut last_err = String::new();
        for attempt in 1..=MAX_ATTEMPTS {
            match self
                .bot
                .send_message(chat, &message)
                .parse_mode(ParseMode::Html)
                .await
            {
                Ok(_) => {
                    info!(
                        chat_id = event.chat_id,
                        subscription_id = event.subscription_id,
                        "Alert sent"
                    );
                    return Ok(());
                }
                Err(e) => {
                    if let Some(reason) = unreachable_reason(&e) {
                        return Err(DeliveryError::Unreachable(reason));
                    }
                    last_err = e.to_string();
                    if attempt < MAX_ATTEMPTS {
                        warn!(
                            chat_id = event.chat_id,
                            attempt,
                            error = %e,
                            "Alert delivery failed, retrying"
                        );
                        tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                    }
                }
            }
        }
        Err(DeliveryError::Transient(last_err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn event(direction: Direction, stale: bool) -> AlertEvent {
        AlertEvent {
            subscription_id: 1,
            chat_id: 42,
            asset: "bitcoin".into(),
            triggered_price: 52_340.0,
            threshold: 50_000.0,
            direction,
            stale_quote: stale,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_format_alert_above() {
        let msg = format_alert_message(&event(Direction::Above, false));
        assert!(msg.contains("<b>BTC</b>"));
        assert!(msg.contains("$52340.00"));
        assert!(msg.contains("above"));
        assert!(msg.contains("$50000.00"));
        assert!(!msg.contains("cached quote"));
    }

    #[test]
    fn test_format_alert_below() {
        let msg = format_alert_message(&event(Direction::Below, false));
        assert!(msg.contains("below"));
        assert!(msg.contains("\u{1F4C9}"));
    }

    #[test]
    fn test_format_alert_flags_stale_quote() {
        let msg = format_alert_message(&event(Direction::Above, true));
        assert!(msg.contains("cached quote"));
    }
}
