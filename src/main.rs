//! Personal CDN - image hosting with public and private buckets

use clap::Parser;
use personal_cdn::api::{router, AppState};
use personal_cdn::config::{AuthMode, Config};
use personal_cdn::session::MemorySessionStore;
use personal_cdn::storage::FilesystemStore;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Personal CDN - session-gated image hosting
#[derive(Parser, Debug)]
#[command(name = "personal_cdn")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<String>,

    /// Listen address (overrides config)
    #[arg(short, long, value_name = "ADDR")]
    listen: Option<String>,

    /// Image root directory (overrides config)
    #[arg(short, long, value_name = "DIR")]
    image_dir: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Load configuration from file if specified, otherwise use default loading
    let mut config = if let Some(ref path) = cli.config {
        Config::from_file(path)?
    } else {
        Config::load()?
    };

    // CLI overrides
    if let Some(ref addr) = cli.listen {
        config.listen_addr = addr.parse()?;
    }
    if let Some(ref dir) = cli.image_dir {
        config.image_dir = dir.into();
    }

    // Initialize tracing
    let log_level = if cli.verbose {
        "personal_cdn=trace,tower_http=trace".to_string()
    } else {
        config.log_level.clone()
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting personal CDN");
    info!("  Listen address: {}", config.listen_addr);
    info!("  Image directory: {:?}", config.image_dir);
    info!(
        "  Session TTL: {}",
        humantime::format_duration(config.session_ttl)
    );
    info!(
        "  Auth mode: {}",
        match config.auth_mode {
            AuthMode::Cookie => "cookie",
            AuthMode::Bearer => "bearer",
        }
    );
    info!("  Allowed origins: {}", config.allowed_origins.join(", "));
    if config.origin_binding {
        info!("  Origin binding: enabled");
    }
    if config.captcha_enabled {
        info!("  Login CAPTCHA: enabled");
    }
    if config.api_key.is_some() {
        warn!("  Legacy API key access is ENABLED for /cdn");
    }
    if config.uses_default_password() {
        warn!("  Administrator is using the default password. Set CDN_ADMIN_PASSWORD or CDN_ADMIN_PASSWORD_HASH.");
    }

    let store = FilesystemStore::new(config.image_dir.clone(), config.filename_policy).await?;
    let sessions = MemorySessionStore::new(config.session_ttl, config.origin_binding);
    let state = Arc::new(AppState::new(&config, Arc::new(sessions), Arc::new(store)));
    let app = router(state, &config);

    // Start server with graceful shutdown
    let listener = TcpListener::bind(&config.listen_addr).await?;
    info!("Personal CDN listening on http://{}", config.listen_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Handle shutdown signals (SIGINT, SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            warn!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}
