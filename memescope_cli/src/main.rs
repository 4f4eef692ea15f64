mod api;
mod watch;

use log::{info, warn};
use memescope_core::{error::CoreError, native::FeedService, FeedKind, Settings};
use std::future::IntoFuture;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const USAGE: &str = "usage: memescope [serve | watch <feed> [base_url]]";

#[tokio::main]
async fn main() -> Result<(), CoreError> {
    env_logger::init();
    // Print an unconditional startup line so users see the binary started
    // even when RUST_LOG is not set.
    println!(
        "memescope starting (pid {}), RUST_LOG={:?}",
        std::process::id(),
        std::env::var("RUST_LOG").ok()
    );

    let config_path =
        std::env::var("MEMESCOPE_CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    let settings = load_settings(&config_path)?;
    settings.validate()?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        None | Some("serve") => serve(settings).await,
        Some("watch") => {
            let feed = args.get(1).ok_or_else(|| CoreError::Validation(USAGE.to_string()))?;
            watch::run(&settings, feed, args.get(2).map(String::as_str)).await
        }
        Some(other) => Err(CoreError::Validation(format!(
            "unknown command '{}'; {}",
            other, USAGE
        ))),
    }
}

fn load_settings(path: &str) -> Result<Settings, CoreError> {
    if Path::new(path).exists() {
        info!("Loading settings from {}", path);
        Settings::from_file(path)
    } else {
        warn!("{} not found, using built-in defaults", path);
        Ok(Settings::default())
    }
}

async fn serve(settings: Settings) -> Result<(), CoreError> {
    let mut feeds: Vec<Arc<FeedService>> = Vec::new();
    for kind in FeedKind::ALL {
        let feed = settings.feeds.get(kind);
        if !feed.enabled {
            info!("{} is disabled", kind);
            continue;
        }
        let service = FeedService::from_settings(kind, &settings)?;
        if feed.autostart {
            service.start();
        }
        feeds.push(service);
    }

    let router = api::create_router(&feeds, Duration::from_secs(settings.server.keep_alive_secs));
    let bind_addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| {
            CoreError::Init(format!("Failed to bind API server to {}: {}", bind_addr, e))
        })?;
    info!("API server listening on {}", bind_addr);

    // Open event streams never end on their own, so shutdown does not wait for them.
    tokio::select! {
        result = axum::serve(listener, router).into_future() => result?,
        _ = tokio::signal::ctrl_c() => info!("Shutdown signal received"),
    }

    for service in &feeds {
        service.stop();
    }
    info!("memescope stopped");
    Ok(())
}
