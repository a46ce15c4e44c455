//! Binds the HTTP API and runs it until Ctrl-C / SIGTERM.

use tokio::net::TcpListener;

use crate::{AppState, Config, ProfhubResult, Store, router};

pub fn open_store(config: &Config) -> ProfhubResult<Store> {
    match &config.snapshot_path {
        Some(path) => Store::open(path),
        None => Ok(Store::in_memory()),
    }
}

pub async fn serve(config: Config) -> ProfhubResult<()> {
    let store = open_store(&config)?;
    let listener = TcpListener::bind(config.bind).await?;
    let addr = listener.local_addr()?;
    tracing::info!(
        %addr,
        snapshot = ?config.snapshot_path,
        allowed_commands = ?config.allowed_commands,
        "profhub listening"
    );

    let app = router(AppState::new(config, store));
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("profhub stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!("failed to listen for ctrl-c: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                tracing::warn!("failed to listen for SIGTERM: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    tracing::info!("shutdown requested");
}
