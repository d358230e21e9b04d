//! Pocketci Orchestrator
//!
//! Converts version-control webhooks into pipeline runs executed by a pool
//! of runners. The orchestrator verifies and normalizes each delivery,
//! checks out the repository, selects the pipelines that match the event,
//! and queues them on the in-process dispatcher runners poll through the
//! control-plane API.

use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod api;
pub mod dispatch;
pub mod orchestrator;
pub mod repo;
pub mod select;
pub mod vcs;

use crate::api::AppState;
use crate::dispatch::Dispatcher;
use crate::orchestrator::Orchestrator;
use crate::repo::Fetcher;
use pocketci_engine::EngineCli;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pocketci_orchestrator=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("starting pocketci orchestrator");

    let webhook_secret = std::env::var("X_HUB_SIGNATURE").unwrap_or_default();
    if webhook_secret.is_empty() {
        warn!("X_HUB_SIGNATURE is not set; webhook signatures cannot verify");
    }

    let username = std::env::var("GITHUB_USERNAME").unwrap_or_default();
    let token = std::env::var("GITHUB_TOKEN").unwrap_or_default();
    let credentials = (!username.is_empty()).then_some((username.as_str(), token.as_str()));

    let fetcher = Fetcher::new(credentials).expect("failed to prepare git credentials");

    let engine = EngineCli::from_env();
    engine
        .available()
        .await
        .expect("build engine is not available");
    engine.warmup().await.expect("engine warmup failed");

    let dispatcher = Arc::new(Dispatcher::new());
    let orchestrator = Arc::new(Orchestrator::new(dispatcher, engine, fetcher));

    let app = api::create_router(AppState {
        orchestrator,
        webhook_secret: webhook_secret.into_bytes(),
    });

    let addr =
        std::env::var("ORCHESTRATOR_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

    info!("listening on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind to address");

    axum::serve(listener, app)
        .await
        .expect("failed to start server");
}
