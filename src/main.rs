use anyhow::Result;
use cloudassistant_gateway::config::AppConfig;
use cloudassistant_gateway::handlers::build_router;
use cloudassistant_gateway::store::{FileKvStore, InMemoryKvStore, KvStore};
use cloudassistant_gateway::AppState;
use std::sync::Arc;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = AppConfig::load()?;
    let kv: Arc<dyn KvStore> = if config.security.use_in_memory {
        tracing::warn!("using in-memory store; sessions are lost on restart");
        Arc::new(InMemoryKvStore::new())
    } else {
        Arc::new(FileKvStore::new(&config.security.token_store_path)?)
    };

    let state = Arc::new(AppState::new(config, kv)?);
    let bind_address = state.config.server.bind_address.clone();
    let router = build_router(state.clone());
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;

    tracing::info!(
        bind_address = %bind_address,
        public_url = %state.config.server.public_url,
        gemini_configured = state.gemini.ensure_configured().is_ok(),
        "starting server"
    );

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

fn init_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
