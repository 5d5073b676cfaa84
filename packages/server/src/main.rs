use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};

use dls_server::config::AppConfig;
use dls_server::consumers::listen_for_poison_messages;
use dls_server::database::init_db;
use dls_server::directory::DbDirectory;
use dls_server::notifications::{LogNotifier, Notifier, WebhookNotifier};
use dls_server::state::AppState;
use mq::init_mq;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    let config = AppConfig::load().context("Failed to load config")?;

    let store = init_mq(&config.mq)
        .await
        .context("Failed to initialize MQ")?;
    info!(url = %config.mq.url, "MQ connected");

    let db = init_db(&config.database)
        .await
        .context("Failed to connect to database")?;
    info!("Database connected");

    let notifier: Arc<dyn Notifier> = match &config.notifications.webhook_url {
        Some(url) => {
            info!(url = %url, "Sending notifications to webhook");
            Arc::new(WebhookNotifier::new(url.clone()))
        }
        None => Arc::new(LogNotifier),
    };

    let state = AppState {
        store: Arc::new(store),
        directory: Arc::new(DbDirectory::new(db)),
        notifier,
        config: config.dls.clone(),
    };

    let mut listener = tokio::spawn(listen_for_poison_messages(state));

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for shutdown signal")?;
            info!("Shutting down");
            listener.abort();
        }
        result = &mut listener => {
            match result {
                Ok(Ok(())) => warn!("Poison message listener stopped"),
                Ok(Err(e)) => error!(error = %e, "Poison message listener failed"),
                Err(e) => error!(error = %e, "Poison message listener panicked"),
            }
        }
    }

    Ok(())
}
