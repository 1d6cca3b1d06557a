//! Wallet activity sync - console runner
//!
//! Hydrates the local transaction cache, syncs it with the wallet backend,
//! keeps a live update stream open and prints the activity feed whenever it
//! changes. Commands on stdin: `r` refresh, `s` toggle stuck transactions,
//! `b`/`f` simulate the app moving to background/foreground, `q` quit.
use activity_sync::{ActivityConfig, ActivityView, AppLifecycle, ConsoleActivityView, ServiceContainer};
use anyhow::Context;
use dotenv::dotenv;
use log::{error, info};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Application entry point
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv().ok();

    // Initialize logging with default level of "info"
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    info!("Starting wallet activity sync v{}", activity_sync::VERSION);

    let config = ActivityConfig::from_env()
        .context("ACTIVITY_API_BASE_URL must be set in environment variables")?;

    info!("Initializing activity services...");
    let services = ServiceContainer::build(config).await?;
    let activity = services.activity_service();
    let presenter = services.presenter();
    let view: Arc<dyn ActivityView> = Arc::new(ConsoleActivityView::new());

    // Render the feed on every change
    let mut feed = presenter.watch_feed().await;
    let feed_view = view.clone();
    tokio::spawn(async move {
        loop {
            let current = feed.borrow_and_update().clone();
            if let Err(e) = feed_view.display_feed(&current).await {
                error!("Failed to render activity: {}", e);
            }
            if feed.changed().await.is_err() {
                break;
            }
        }
    });

    // Report live connection health
    let mut stream_state = services.stream().subscribe_state();
    let state_view = view.clone();
    tokio::spawn(async move {
        while stream_state.changed().await.is_ok() {
            let state = stream_state.borrow_and_update().clone();
            let _ = state_view.display_stream_state(&state).await;
        }
    });

    activity.start().await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => {
                let command = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        error!("Failed to read command: {}", e);
                        break;
                    }
                };

                match command.trim() {
                    "r" => {
                        if let Err(e) = activity.refresh().await {
                            let _ = view.display_error(format!("Refresh failed: {}", e)).await;
                        }
                    }
                    "s" => {
                        let shown = presenter.toggle_show_stuck();
                        info!("Stuck transactions {}", if shown { "shown" } else { "hidden" });
                    }
                    "b" => activity.handle_lifecycle(AppLifecycle::Background).await,
                    "f" => activity.handle_lifecycle(AppLifecycle::Foreground).await,
                    "q" => break,
                    "" => {}
                    other => {
                        let _ = view.display_error(format!("Unknown command: {}", other)).await;
                    }
                }
            }
        }
    }

    info!("Stopping activity services...");
    activity.stop().await;

    Ok(())
}
