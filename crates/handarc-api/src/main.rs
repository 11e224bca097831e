//! Axum API server binary.

use std::net::SocketAddr;

use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use handarc_api::{create_router, ApiConfig, AppState};
use handarc_media::cleanup::{cleanup_old_temp_files, TEMP_MAX_AGE};
use handarc_media::{check_ffmpeg, check_ffprobe, check_tesseract, check_ytdlp};

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("handarc=info".parse().expect("valid directive"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting handarc-api");

    // Pipeline runs need these on PATH; missing ones fail at run time,
    // so surface them now
    for (name, check) in [
        ("ffmpeg", check_ffmpeg()),
        ("ffprobe", check_ffprobe()),
        ("tesseract", check_tesseract()),
        ("yt-dlp", check_ytdlp()),
    ] {
        match check {
            Ok(path) => info!("Found {} at {}", name, path.display()),
            Err(_) => warn!("{} not found on PATH", name),
        }
    }

    let config = ApiConfig::from_env();
    info!("API config: host={}, port={}", config.host, config.port);

    let state = match AppState::new(config.clone()).await {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to create application state: {:#}", e);
            std::process::exit(1);
        }
    };

    // Sweep abandoned temp frame directories hourly
    let temp_dir = state.pipeline.temp_dir.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(TEMP_MAX_AGE);
        loop {
            interval.tick().await;
            match cleanup_old_temp_files(&temp_dir, TEMP_MAX_AGE).await {
                Ok(0) => {}
                Ok(removed) => info!("Removed {} stale temp entries", removed),
                Err(e) => warn!("Temp sweep failed: {}", e),
            }
        }
    });

    let app = create_router(state);

    let addr: SocketAddr = match format!("{}:{}", config.host, config.port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!("Invalid bind address: {}", e);
            std::process::exit(1);
        }
    };

    info!("Listening on {}", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", e);
    }

    info!("Server shutdown complete");
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        warn!("Failed to install CTRL+C handler");
        return;
    }
    info!("Received shutdown signal");
}
