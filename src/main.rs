//! Browserver - serve files straight out of a browser tab

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use browserver::{config::Args, server, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("browserver={},info", log_level).into()),
        )
        .with(args.log_json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!args.log_json).then(tracing_subscriber::fmt::layer))
        .init();

    if let Err(e) = args.validate() {
        error!("{}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Browserver {}", env!("CARGO_PKG_VERSION"));
    info!("======================================");
    info!("Listen: {}", args.listen);
    info!("Request timeout: {}ms", args.request_timeout_ms);
    info!("Keep-alive: {}s", args.keepalive_secs);
    info!("Admin client: {}", args.client_dir.display());
    info!("Max upload: {} bytes", args.max_upload_bytes);
    info!("======================================");

    if !args.admin_page().is_file() {
        warn!(
            "Admin page not found at {}; /admin/{{id}} will return 404",
            args.admin_page().display()
        );
    }

    let state = Arc::new(AppState::new(args));

    if let Err(e) = server::run(state).await {
        error!("Server error: {:?}", e);
        std::process::exit(1);
    }

    Ok(())
}
