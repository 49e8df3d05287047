//! Telegram bot command handlers.

use chrono::{DateTime, Utc};
use pricewatch_core::{
    display_name, format_price, parse_threshold, resolve_asset, supported_assets_list, Direction,
};
use pricewatch_store::{StoreError, SubscriptionStore};
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use teloxide::utils::command::BotCommands;
use thiserror::Error;
use tracing::{error, info};

#[derive(Error, Debug)]
pub enum TelegramError {
    #[error("Telegram API error: {0}")]
    Api(#[from] teloxide::RequestError),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Bot commands.
#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Available commands:")]
pub enum Command {
    #[command(description = "Start the bot and show supported assets")]
    Start,
    #[command(description = "Set a price alert. Usage: /subscribe btc 50000 [above|below]")]
    Subscribe(String),
    #[command(description = "Remove your alerts for an asset. Usage: /unsubscribe btc")]
    Unsubscribe(String),
    #[command(description = "List your active alerts")]
    List,
    #[command(description = "Show help")]
    Help,
    #[command(description = "Service status (admin only)")]
    Status,
}

/// Telegram bot wrapper around the subscription store.
pub struct PriceBot {
    bot: Bot,
    store: SubscriptionStore,
    admin_chat_id: Option<i64>,
    started_at: DateTime<Utc>,
}

/// Parse `/subscribe` arguments: asset, threshold, optional direction.
/// The error string is the reply sent back to the user.
fn parse_subscribe(input: &str) -> Result<(&'static str, f64, Direction), String> {
    const USAGE: &str = "Usage: /subscribe <asset> <price> [above|below]\n\
                         Example: /subscribe btc 50000";

    let mut parts = input.split_whitespace();
    let (Some(asset_raw), Some(threshold_raw)) = (parts.next(), parts.next()) else {
        return Err(USAGE.to_string());
    };

    let asset = resolve_asset(asset_raw).ok_or_else(|| {
        format!(
            "Unsupported asset '{}'. Supported: {}",
            asset_raw,
            supported_assets_list()
        )
    })?;

    let threshold = parse_threshold(threshold_raw)
        .ok_or_else(|| format!("'{}' is not a valid price. {}", threshold_raw, USAGE))?;

    let direction = match parts.next() {
        Some(word) => word
            .parse::<Direction>()
            .map_err(|_| format!("Direction must be 'above' or 'below', got '{}'", word))?,
        None => Direction::Above,
    };

    if parts.next().is_some() {
        return Err(USAGE.to_string());
    }

    Ok((asset, threshold, direction))
}

impl PriceBot {
    pub fn new(bot: Bot, store: SubscriptionStore, admin_chat_id: Option<i64>) -> Self {
        Self {
            bot,
            store,
            admin_chat_id,
            started_at: Utc::now(),
        }
    }

    /// Run the bot command handler until shutdown.
    pub async fn run(self: Arc<Self>) {
        let bot = self.bot.clone();
        let handler = Update::filter_message().filter_command::<Command>().endpoint(
            move |bot: Bot, msg: Message, cmd: Command| {
                let this = Arc::clone(&self);
                async move { this.handle_command(bot, msg, cmd).await }
            },
        );

        info!("Telegram command dispatcher starting");
        Dispatcher::builder(bot, handler)
            .enable_ctrlc_handler()
            .build()
            .dispatch()
            .await;
    }

    async fn handle_command(
        &self,
        bot: Bot,
        msg: Message,
        cmd: Command,
    ) -> Result<(), TelegramError> {
        let chat_id = msg.chat.id.0;

        match cmd {
            Command::Start => {
                let text = format!(
                    "Welcome to the price alert bot!\n\n\
                     Set an alert with /subscribe, for example:\n\
                     /subscribe btc 50000\n\n\
                     Supported assets: {}\n\n\
                     Use /help to see all commands.",
                    supported_assets_list()
                );
                bot.send_message(msg.chat.id, text).await?;
            }

            Command::Subscribe(args) => {
                let (asset, threshold, direction) = match parse_subscribe(&args) {
                    Ok(parsed) => parsed,
                    Err(reply) => {
                        bot.send_message(msg.chat.id, reply).await?;
                        return Ok(());
                    }
                };

                match self.store.add(chat_id, asset, threshold, direction).await {
                    Ok(sub) => {
                        info!(chat_id, asset, threshold, "Subscription created");
                        let text = format!(
                            "\u{2705} Alert set: <b>{}</b> {} {}",
                            display_name(&sub.asset),
                            sub.direction,
                            format_price(sub.threshold),
                        );
                        bot.send_message(msg.chat.id, text)
                            .parse_mode(ParseMode::Html)
                            .await?;
                    }
                    Err(StoreError::CapacityExceeded { limit, .. }) => {
                        bot.send_message(
                            msg.chat.id,
                            format!(
                                "You already have {} active alerts. \
                                 Remove one with /unsubscribe first.",
                                limit
                            ),
                        )
                        .await?;
                    }
                    Err(StoreError::InvalidThreshold { min, max, .. }) => {
                        bot.send_message(
                            msg.chat.id,
                            format!(
                                "Price must be between {} and {}.",
                                format_price(min),
                                format_price(max)
                            ),
                        )
                        .await?;
                    }
                    Err(e) => {
                        error!(chat_id, error = %e, "Failed to create subscription");
                        bot.send_message(msg.chat.id, "Something went wrong, try again later.")
                            .await?;
                    }
                }
            }

            Command::Unsubscribe(args) => {
                let asset_raw = args.trim();
                if asset_raw.is_empty() {
                    bot.send_message(msg.chat.id, "Usage: /unsubscribe <asset>\nExample: /unsubscribe btc")
                        .await?;
                    return Ok(());
                }

                let Some(asset) = resolve_asset(asset_raw) else {
                    bot.send_message(
                        msg.chat.id,
                        format!(
                            "Unsupported asset '{}'. Supported: {}",
                            asset_raw,
                            supported_assets_list()
                        ),
                    )
                    .await?;
                    return Ok(());
                };

                let removed = self.store.deactivate_by_asset(chat_id, asset).await?;
                let ticker = display_name(asset);
                let text = if removed == 0 {
                    format!("No active alerts for {}.", ticker)
                } else {
                    info!(chat_id, asset, removed, "Subscriptions removed");
                    format!("Removed {} alert(s) for {}.", removed, ticker)
                };
                bot.send_message(msg.chat.id, text).await?;
            }

            Command::List => {
                let subs = self.store.list_active_for_user(chat_id).await?;
                if subs.is_empty() {
                    bot.send_message(
                        msg.chat.id,
                        "You have no active alerts. Set one with /subscribe.",
                    )
                    .await?;
                    return Ok(());
                }

                let mut text = String::from("<b>Your active alerts:</b>\n");
                for sub in &subs {
                    text.push_str(&format!(
                        "\n\u{2022} {} {} {}",
                        display_name(&sub.asset),
                        sub.direction,
                        format_price(sub.threshold),
                    ));
                }
                bot.send_message(msg.chat.id, text)
                    .parse_mode(ParseMode::Html)
                    .await?;
            }

            Command::Help => {
                let text = format!(
                    "{}\n\nSupported assets: {}",
                    Command::descriptions(),
                    supported_assets_list()
                );
                bot.send_message(msg.chat.id, text).await?;
            }

            Command::Status => {
                if self.admin_chat_id != Some(chat_id) {
                    bot.send_message(msg.chat.id, "This command is restricted.")
                        .await?;
                    return Ok(());
                }

                let subscriptions = self.store.count_active().await?;
                let chats = self.store.count_active_chats().await?;
                let uptime = Utc::now() - self.started_at;
                let text = format!(
                    "<b>Service status</b>\n\n\
                     Active alerts: {}\n\
                     Subscribed chats: {}\n\
                     Uptime: {}h {}m",
                    subscriptions,
                    chats,
                    uptime.num_hours(),
                    uptime.num_minutes() % 60,
                );
                bot.send_message(msg.chat.id, text)
                    .parse_mode(ParseMode::Html)
                    .await?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_subscribe_defaults_to_above() {
        let (asset, threshold, direction) = parse_subscribe("btc 50000").unwrap();
        assert_eq!(asset, "bitcoin");
        assert_eq!(threshold, 50_000.0);
        assert_eq!(direction, Direction::Above);
    }

    #[test]
    fn test_parse_subscribe_explicit_direction() {
        let (_, _, direction) = parse_subscribe("eth 3k below").unwrap();
        assert_eq!(direction, Direction::Below);

        let (_, threshold, direction) = parse_subscribe("eth $2,500 under").unwrap();
        assert_eq!(threshold, 2_500.0);
        assert_eq!(direction, Direction::Below);
    }

    #[test]
    fn test_parse_subscribe_missing_args() {
        assert!(parse_subscribe("").unwrap_err().contains("Usage"));
        assert!(parse_subscribe("btc").unwrap_err().contains("Usage"));
        assert!(parse_subscribe("btc 1 above extra")
            .unwrap_err()
            .contains("Usage"));
    }

    #[test]
    fn test_parse_subscribe_unknown_asset() {
        let err = parse_subscribe("notacoin 100").unwrap_err();
        assert!(err.contains("Unsupported asset"));
        assert!(err.contains("BTC"));
    }

    #[test]
    fn test_parse_subscribe_bad_threshold() {
        assert!(parse_subscribe("btc zero").unwrap_err().contains("not a valid price"));
        assert!(parse_subscribe("btc -5").unwrap_err().contains("not a valid price"));
    }

    #[test]
    fn test_parse_subscribe_bad_direction() {
        let err = parse_subscribe("btc 100 sideways").unwrap_err();
        assert!(err.contains("'above' or 'below'"));
    }
}
