use anyhow::Context;
use clap::Parser;
use htmlshot::config::Cli;
use htmlshot::discovery::BrowserLocator;
use htmlshot::ratelimit::RateLimiter;
use htmlshot::s3::S3Store;
use htmlshot::server::{self, AppState};
use htmlshot::service::RenderService;
use htmlshot::storage::Publisher;
use log::{info, warn};
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if cli.uses_default_secret() {
        warn!("API_SECRET is not set; using the built-in default secret");
    }

    let publisher = match cli.storage()? {
        Some((s3, storage)) => {
            info!("Uploads go to bucket {} at {}", storage.bucket, s3.endpoint);
            let store = S3Store::new(s3).context("configuring object storage")?;
            Some(Publisher::new(Arc::new(store), storage))
        }
        None => {
            warn!("Object storage is not configured; save=true requests will fail");
            None
        }
    };

    let locator = BrowserLocator::from_env(cli.chrome_path.clone());
    // Startup probe only logs; each request resolves the browser again.
    if let Err(e) = locator.locate() {
        warn!("{}", e);
    }

    let state = Arc::new(AppState {
        service: RenderService::chrome(cli.render_config(), locator, publisher),
        api_secret: cli.api_secret.clone(),
        limiter: RateLimiter::new(cli.rate_limit_max, cli.rate_limit_window()),
    });
    let app = server::router(state);

    let addr = cli.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!("Server running on {}", addr);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving HTTP")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
