//! Tabletop exercise backend entrypoint wiring the REST API, the scenario catalog and the
//! storage backend.

use std::{env, fs, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{Router, http::HeaderValue};
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tabletop_back::{
    config::AppConfig,
    dao::game_store::memory::MemoryStore,
    routes,
    services::scenario_catalog::{self, Catalog},
    state::{AppState, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let catalog_path = config.scenarios_path().clone();
    let catalog_json = fs::read_to_string(&catalog_path)
        .with_context(|| format!("reading scenario catalog {}", catalog_path.display()))?;
    let catalog = scenario_catalog::parse_catalog(&catalog_json)
        .with_context(|| format!("parsing scenario catalog {}", catalog_path.display()))?;

    let cors = cors_layer(config.cors_origins());
    let app_state = AppState::new(config);
    install_storage(&app_state).await;
    tokio::spawn(import_when_ready(app_state.clone(), catalog));

    let app = build_router(app_state, cors);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Use MongoDB under the storage supervisor when `MONGO_URI` is set, the in-memory store
/// otherwise.
async fn install_storage(state: &SharedState) {
    #[cfg(feature = "mongo-store")]
    if env::var("MONGO_URI").is_ok() {
        use tabletop_back::dao::game_store::{
            GameStore,
            mongodb::{MongoConfig, MongoGameStore},
        };
        use tabletop_back::services::storage_supervisor;

        info!("using MongoDB storage");
        tokio::spawn(storage_supervisor::run(state.clone(), || async {
            let config = MongoConfig::from_env().await?;
            let store = MongoGameStore::connect(config).await?;
            Ok(Arc::new(store) as Arc<dyn GameStore>)
        }));
        return;
    }

    info!("MONGO_URI not set; using in-memory storage");
    state.set_game_store(Arc::new(MemoryStore::new())).await;
}

/// Import the scenario catalog as soon as a storage backend is available.
async fn import_when_ready(state: SharedState, catalog: Catalog) {
    let mut degraded = state.degraded_watcher();
    if degraded.wait_for(|degraded| !*degraded).await.is_err() {
        return;
    }

    match scenario_catalog::import_catalog(&state, catalog).await {
        Ok(summary) => info!(
            imported = summary.imported.len(),
            skipped = summary.skipped.len(),
            "scenario catalog ready"
        ),
        Err(err) => error!(error = %err, "scenario catalog import failed"),
    }
}

/// Restrict CORS to the configured origins; an empty list allows any origin.
fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(%origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState, cors: CorsLayer) -> Router<()> {
    routes::router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler; waiting for Ctrl+C");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
