use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use teloxide::dispatching::dialogue::InMemStorage;
use teloxide::error_handlers::LoggingErrorHandler;
use teloxide::prelude::*;
use teloxide::update_listeners::webhooks;
use tracing::info;
use tracing_subscriber::EnvFilter;

use fintracker::bot::{self, BotSettings};
use fintracker::config::AppConfig;
use fintracker::db::LedgerStore;
use fintracker::dialogue::ClearDialogueState;
use fintracker::gemini::GeminiClient;
use fintracker::localization::init_localization;
use fintracker::pipeline::LedgerPipeline;
use fintracker::speech::PlaceholderTranscriber;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    init_tracing();
    info!("Starting FinTracker Telegram Bot");

    let config = AppConfig::from_env()?;
    init_localization().context("Failed to load locale resources")?;

    info!(path = %config.database_path.display(), "Opening ledger database");
    let store = LedgerStore::open(&config.database_path)
        .await
        .with_context(|| {
            format!(
                "Failed to open ledger database at {}",
                config.database_path.display()
            )
        })?;

    let extractor =
        GeminiClient::new(config.extraction.clone()).context("Failed to build extraction client")?;
    let pipeline = Arc::new(LedgerPipeline::new(
        extractor,
        store.clone(),
        Arc::new(PlaceholderTranscriber),
    ));
    let settings = Arc::new(BotSettings {
        admin_chat_ids: config.admin_chat_ids.clone(),
    });

    let client = teloxide::net::default_reqwest_settings()
        .timeout(Duration::from_secs(config.transport_timeout_secs))
        .build()
        .context("Failed to build Telegram HTTP client")?;
    let bot = Bot::with_client(config.telegram_bot_token.clone(), client);

    info!("Bot initialized, starting dispatcher");

    let mut dispatcher = Dispatcher::builder(bot.clone(), bot::schema())
        .dependencies(dptree::deps![
            pipeline,
            settings,
            InMemStorage::<ClearDialogueState>::new()
        ])
        .enable_ctrlc_handler()
        .build();

    match &config.webhook {
        Some(webhook) => {
            let url: reqwest::Url = webhook
                .url
                .parse()
                .with_context(|| format!("WEBHOOK_URL is not a valid URL: {}", webhook.url))?;
            info!(url = %url, addr = %webhook.listen_addr, "Starting in webhook mode");

            let listener = webhooks::axum(bot, webhooks::Options::new(webhook.listen_addr, url))
                .await
                .context("Failed to start webhook listener")?;
            dispatcher
                .dispatch_with_listener(
                    listener,
                    LoggingErrorHandler::with_custom_text("An error from the update listener"),
                )
                .await;
        }
        None => {
            info!("Starting in long-polling mode");
            dispatcher.dispatch().await;
        }
    }

    store.close().await;
    info!("FinTracker bot stopped");
    Ok(())
}
