// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use finance_auth::{
    api::router,
    auth::{Role, RoleStore, UserId},
    config::{LogFormat, Settings},
    state::AppState,
    storage::AuthDatabase,
};

const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::from_env()?;
    init_tracing(settings.log_format);
    tracing::info!(?settings, "Starting finance auth server");

    let database_path = settings.database_path();
    let store = Arc::new(AuthDatabase::open(&database_path)?);
    tracing::info!(path = %database_path.display(), "Auth database opened");

    if let Some(user_id) = settings.bootstrap_admin.clone().and_then(UserId::new) {
        store.grant_role(&user_id, &Role::admin()).await?;
        tracing::info!(user_id = %user_id, "Bootstrap admin granted");
    }

    let state = AppState::from_settings(&settings, store);
    let app = router(state, settings.request_timeout);

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutdown signal received");
            shutdown.cancel();
        }
    });

    let listener = TcpListener::bind(settings.bind_address()).await?;
    tracing::info!(addr = %listener.local_addr()?, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}
