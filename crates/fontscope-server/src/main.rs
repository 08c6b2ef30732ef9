//! fontscope HTTP server
//!
//! Loads `.config/fontscope.yaml` (or `--config=PATH`), picks the acquisition
//! strategy, and serves the JSON API until interrupted.

use std::sync::Arc;

use color_eyre::Result;
use fontscope::{Fetcher, Scanner, StaticAcquisition};
use fontscope_server::config::{AcquisitionMode, Overrides, ResolvedConfig, USAGE};
use fontscope_server::routes::build_router;
use tokio::net::TcpListener;
use tracing_subscriber::prelude::*;

fn init_tracing() {
    let filter = tracing_subscriber::filter::EnvFilter::try_from_default_env().unwrap_or_else(
        |_| {
            tracing_subscriber::filter::EnvFilter::new(
                "fontscope=info,fontscope_server=info,chromiumoxide=off",
            )
        },
    );

    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true).compact();
    tracing_subscriber::registry()
        .with(
            fmt_layer
                .with_timer(tracing_subscriber::fmt::time::SystemTime)
                .with_filter(filter),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let overrides = Overrides::from_args(std::env::args().skip(1))?;
    if overrides.help {
        println!("{USAGE}");
        return Ok(());
    }

    init_tracing();

    let config = ResolvedConfig::load(&overrides)?;
    match &config.source {
        Some(path) => tracing::info!(config = %path, "loaded configuration"),
        None => tracing::info!("no configuration file, using defaults"),
    }

    let fetcher = Fetcher::new(&config.scan)?;
    let listener = TcpListener::bind(config.bind).await?;

    match config.acquisition {
        AcquisitionMode::Static => {
            let acquisition = StaticAcquisition::new(fetcher.clone());
            let scanner = Scanner::new(acquisition, fetcher, config.scan);
            serve(listener, build_router(Arc::new(scanner)), "static").await
        }
        AcquisitionMode::Browser => serve_browser(listener, fetcher, &config).await,
    }
}

#[cfg(feature = "browser")]
async fn serve_browser(listener: TcpListener, fetcher: Fetcher, config: &ResolvedConfig) -> Result<()> {
    let acquisition =
        fontscope::BrowserAcquisition::launch(&config.scan, config.browser_sandbox).await?;
    let scanner = Scanner::new(acquisition, fetcher, config.scan.clone());
    serve(listener, build_router(Arc::new(scanner)), "browser").await
}

#[cfg(not(feature = "browser"))]
async fn serve_browser(_: TcpListener, _: Fetcher, _: &ResolvedConfig) -> Result<()> {
    Err(color_eyre::eyre::eyre!(
        "browser acquisition requested but fontscope was built without the `browser` feature"
    ))
}

async fn serve(listener: TcpListener, app: axum::Router, acquisition: &str) -> Result<()> {
    tracing::info!(addr = %listener.local_addr()?, acquisition, "fontscope listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
