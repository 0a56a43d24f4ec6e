use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sygnal::config::AppConfig;
use sygnal::infra::db::Db;
use sygnal::infra::email::EmailPortal;
use sygnal::infra::identity::HttpIdentityResolver;
use sygnal::infra::repository::PgReportRepository;
use sygnal::infra::storage::ObjectStorage;
use sygnal::{http, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;

    let db = Db::connect(&config).await?;
    let storage = ObjectStorage::new(&config).await?;
    tracing::info!(bucket = %storage.bucket(), "object storage ready");

    let state = AppState {
        db: db.clone(),
        repository: Arc::new(PgReportRepository::new(db)),
        blobs: Arc::new(storage),
        identity: Arc::new(HttpIdentityResolver::new(config.identity_endpoint.clone())),
        notifier: Arc::new(EmailPortal::new(config.email_portal_url.clone())),
    };

    let app: Router = http::router(state, config.upload_max_bytes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());
    let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
    tracing::info!("listening on {}", config.http_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
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
