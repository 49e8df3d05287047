//! Pricewatch Bot - Headless Server
//!
//! A Telegram bot that watches cryptocurrency prices and fires threshold
//! alerts on a fixed schedule.

mod config;
mod health;

use clap::Parser;
use config::Config;
use health::HealthState;
use pricewatch_engine::Evaluator;
use pricewatch_feed::{FeedConfig, PriceFeed};
use pricewatch_store::{StoreLimits, SubscriptionStore};
use pricewatch_telegram::{PriceBot, TelegramNotifier};
use std::sync::Arc;
use std::time::Duration;
use teloxide::Bot;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Pricewatch Bot CLI
#[derive(Parser, Debug)]
#[command(name = "pricewatch-bot")]
#[command(about = "Telegram crypto price alert bot", long_about = None)]
struct Args {
    /// Log level: trace, debug, info, warn, error
    #[arg(short, long)]
    log_level: Option<String>,

    /// Price check interval in seconds
    #[arg(short, long)]
    interval: Option<u64>,

    /// SQLite database file path
    #[arg(long)]
    db: Option<String>,

    /// Port for the HTTP health probe
    #[arg(long)]
    health_port: Option<u16>,
}

fn init_logging(level: &str) {
    let level = match level {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Drive the evaluator on a fixed period.
///
/// Ticks never overlap: a slow tick delays the next one instead of stacking.
/// Each tick is bounded by the period itself, so a hung upstream cannot
/// stall the loop forever.
async fn run_scheduler(evaluator: Arc<Evaluator>, health: Arc<HealthState>, period: Duration) {
    info!(period_secs = period.as_secs(), "Starting scheduler loop");

    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        match tokio::time::timeout(period, evaluator.run_tick()).await {
            Ok(Ok(_outcome)) => {
                health.record_success();
            }
            Ok(Err(e)) => {
                let failures = health.record_failure();
                error!(error = %e, failures, "Tick failed");
            }
            Err(_) => {
                let failures = health.record_failure();
                warn!(failures, "Tick timed out");
            }
        }
    }
}

#[tokio::main]
async fn main() {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let mut config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(1);
        }
    };

    // CLI flags override the environment.
    if let Some(level) = args.log_level {
        config.log_level = level;
    }
    if let Some(interval) = args.interval {
        match config::non_zero_secs("--interval", interval) {
            Ok(secs) => config.check_interval = Duration::from_secs(secs),
            Err(e) => {
                eprintln!("Configuration error: {e}");
                std::process::exit(1);
            }
        }
    }
    if let Some(db) = args.db {
        config.db_path = db;
    }
    if let Some(port) = args.health_port {
        config.health_port = port;
    }

    init_logging(&config.log_level);

    info!("Pricewatch Bot starting...");
    info!("  Check interval: {}s", config.check_interval.as_secs());
    info!("  Database: {}", config.db_path);
    info!("  Health port: {}", config.health_port);
    info!(
        "  Admin commands: {}",
        if config.admin_chat_id.is_some() {
            "enabled"
        } else {
            "disabled"
        }
    );

    let limits = StoreLimits {
        max_per_user: config.max_subscriptions_per_user,
        min_threshold: config.min_price_threshold,
        max_threshold: config.max_price_threshold,
    };

    // The process must not run without its persisted state.
    let store = match SubscriptionStore::connect(&config.database_url(), limits).await {
        Ok(store) => store,
        Err(e) => {
            error!(error = %e, "Failed to open subscription store");
            std::process::exit(1);
        }
    };

    let feed_config = FeedConfig {
        cache_duration: config.cache_duration,
        api_timeout: config.api_timeout,
        ..Default::default()
    };
    let feed = match PriceFeed::new(feed_config) {
        Ok(feed) => Arc::new(feed),
        Err(e) => {
            error!(error = %e, "Failed to build price feed client");
            std::process::exit(1);
        }
    };

    let bot = Bot::new(&config.telegram_token);
    let notifier = Arc::new(TelegramNotifier::new(bot.clone()));
    let evaluator = Arc::new(Evaluator::new(store.clone(), feed, notifier));

    let health = Arc::new(HealthState::default());

    let health_server = health.clone();
    let health_port = config.health_port;
    let health_handle = tokio::spawn(async move {
        if let Err(e) = health::serve(health_server, health_port).await {
            error!(error = %e, "Health endpoint failed");
        }
    });

    let price_bot = Arc::new(PriceBot::new(bot, store, config.admin_chat_id));
    let bot_handle = tokio::spawn(async move {
        price_bot.run().await;
    });

    let scheduler_health = health.clone();
    let check_interval = config.check_interval;
    let mut scheduler_handle = tokio::spawn(async move {
        run_scheduler(evaluator, scheduler_health, check_interval).await;
    });

    // Handle shutdown
    info!("Press Ctrl+C to stop...");

    // The scheduler loop never returns on its own; if its task ends, the
    // service is no longer doing its job and must die loudly rather than
    // keep answering /health.
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!(error = %e, "Failed to listen for Ctrl+C");
            }
            warn!("Shutdown signal received");
        }
        result = &mut scheduler_handle => {
            error!(panicked = result.is_err(), "Scheduler task exited unexpectedly");
            std::process::exit(1);
        }
    }

    scheduler_handle.abort();
    health_handle.abort();
    // The dispatcher installs its own Ctrl+C handler and drains in-flight
    // updates; give it a moment before tearing the process down.
    let _ = tokio::time::timeout(Duration::from_secs(2), bot_handle).await;

    info!("Pricewatch Bot stopped");
}
