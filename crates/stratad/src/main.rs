//! stratad - privileged graph-driver proxy daemon.

use std::sync::Arc;

use clap::Parser;
use strata::ProxyService;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stratad::cli::Args;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| args.log_filter().into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = args.proxy_config()?;
    let listen = args.listen_addr()?;

    let service = Arc::new(ProxyService::new(&config));

    tracing::info!(
        root = %service.root().display(),
        container = service.container_name(),
        %listen,
        "stratad starting"
    );

    stratad::serve(service, &listen, shutdown_signal()).await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
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
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    tracing::info!("Shutdown requested");
}
