use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use archive_relay::{
    api,
    bot::Dispatcher,
    config::{BotMode, Config},
    credentials::{ServiceAccountKey, TokenSource, DRIVE_READONLY_SCOPE, SPREADSHEETS_SCOPE},
    ledger::{self, KeyStore, Ledger, SheetsEndpoints, SheetsLedger},
    polling,
    telegram::BotApi,
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    match log_format.to_lowercase().as_str() {
        "gcp" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_stackdriver::layer())
                .init();
        }
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_target(true)
                        .with_span_list(false),
                )
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    info!(version = env!("CARGO_PKG_VERSION"), "archive-relay starting");

    // Load configuration
    let config = Config::load()?;
    info!(
        channel_id = config.bot.channel_id,
        tabs = ?config.ledger.tabs,
        mode = ?config.bot.mode,
        "Loaded configuration"
    );

    let http = reqwest::Client::builder()
        .timeout(config.http_timeout)
        .build()?;

    // Connect to the ledger
    let key = ServiceAccountKey::from_json(&config.ledger.credentials_json)?;
    let tokens = TokenSource::new(
        http.clone(),
        key,
        &[SPREADSHEETS_SCOPE, DRIVE_READONLY_SCOPE],
    );
    info!(account = %tokens.client_email(), "Using service account");

    let sheets: Arc<dyn Ledger> = Arc::new(
        SheetsLedger::connect(
            http.clone(),
            SheetsEndpoints::default(),
            Arc::new(tokens),
            &config.ledger.spreadsheet,
        )
        .await?,
    );

    let key_map = ledger::load_key_map(sheets.as_ref(), &config.ledger.tabs).await?;
    let keys = Arc::new(KeyStore::new(key_map));

    // Connect to Telegram
    let bot = Arc::new(BotApi::new(http, &config.bot.api_url, &config.bot.token));
    let me = bot.get_me().await?;
    info!(
        bot = me.username.as_deref().unwrap_or(&me.first_name),
        "Connected to Telegram"
    );

    let dispatcher = Arc::new(Dispatcher::new(
        &config,
        bot.clone(),
        Arc::clone(&sheets),
        Arc::clone(&keys),
    ));

    let refresher = config.ledger.refresh_interval.map(|interval| {
        info!(interval = ?interval, "Periodic key map refresh enabled");
        ledger::spawn_refresher(
            Arc::clone(&keys),
            Arc::clone(&sheets),
            config.ledger.tabs.clone(),
            interval,
        )
    });

    match config.bot.mode {
        BotMode::Webhook => {
            if let Some(base) = &config.server.webhook_url {
                bot.set_webhook(&format!("{base}/webhook/{}", config.bot.token))
                    .await?;
                info!(url = %base, "Registered webhook");
            }

            let state = Arc::new(AppState {
                config: config.clone(),
                dispatcher,
            });

            // Build and start the HTTP server
            let app = api::create_router(state);
            let listener = tokio::net::TcpListener::bind(&config.server.bind_address).await?;
            info!("Listening on: {}", config.server.bind_address);

            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        }
        BotMode::Polling => {
            // Telegram refuses getUpdates while a webhook is registered
            bot.delete_webhook().await?;
            polling::run(&bot, &dispatcher, shutdown_signal()).await;
        }
    }

    if let Some(handle) = refresher {
        handle.abort();
    }

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
