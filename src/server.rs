/// Server setup and initialization
///
/// Wires together all components: storage, external services, the sandbox,
/// the executor, the scheduler and the HTTP routes.

use crate::{
    api::{create_schedule_routes, create_workflow_routes, AppState},
    config::Config,
    runtime::{
        engine::WorkflowExecutor, executor::HandlerRegistry, sandbox::ScriptSandbox,
        scheduler::WorkflowScheduler,
    },
    services::{http::HttpServiceClient, ServiceHub},
    workflow::{
        storage::SqliteStorage,
        store::{ScheduleStore, WorkflowStore},
    },
};
use anyhow::Result;
use axum::{routing::get, Router};
use std::sync::Arc;
use tokio::net::TcpListener;

/// Build the service hub from configured endpoints
///
/// Only providers with a URL are registered.
fn build_services(config: &Config) -> Result<ServiceHub> {
    let mut hub = ServiceHub::new();
    if !config.services.any_configured() {
        tracing::info!("🔌 No external services configured");
        return Ok(hub);
    }

    let client = Arc::new(
        HttpServiceClient::new(config.services.clone())
            .map_err(|e| anyhow::anyhow!("Failed to create service client: {}", e))?,
    );
    if config.services.model_url.is_some() {
        hub = hub.with_model(client.clone());
    }
    if config.services.retrieval_url.is_some() {
        hub = hub.with_retrieval(client.clone());
    }
    if config.services.search_url.is_some() {
        hub = hub.with_search(client);
    }
    Ok(hub)
}

/// Create the main Axum application with all routes
///
/// Returns the router together with the scheduler so the caller can shut it
/// down.
pub async fn create_app(config: Config) -> Result<(Router, WorkflowScheduler)> {
    // STEP 1: Storage
    tracing::info!("📁 Ensuring data directory exists: {}", config.database.data_dir);
    std::fs::create_dir_all(&config.database.data_dir)
        .map_err(|e| anyhow::anyhow!("Failed to create data directory: {}", e))?;

    tracing::info!("📋 Connecting workflow storage");
    let storage = SqliteStorage::connect(&config.database.url)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to open workflow storage: {}", e))?;
    let workflows: Arc<dyn WorkflowStore> = Arc::new(storage.clone());
    let schedules: Arc<dyn ScheduleStore> = Arc::new(storage);

    // STEP 2: Handlers and executor
    tracing::info!("⚙️ Initializing node handlers");
    let services = build_services(&config)?;
    let sandbox = ScriptSandbox::new(config.sandbox.limits());
    let registry = HandlerRegistry::with_defaults(services, sandbox);

    tracing::info!("🚀 Initializing workflow executor");
    let executor = Arc::new(WorkflowExecutor::new(registry));

    // STEP 3: Scheduler
    tracing::info!("⏰ Initializing workflow scheduler");
    let scheduler = WorkflowScheduler::new(
        Arc::clone(&workflows),
        schedules,
        Arc::clone(&executor),
    )
    .await
    .map_err(|e| anyhow::anyhow!("Failed to initialize scheduler: {}", e))?;

    let background = scheduler.clone();
    tokio::spawn(async move {
        if let Err(e) = background.start().await {
            tracing::error!("❌ Failed to start scheduler: {}", e);
        }
    });

    // STEP 4: Routes
    let app_state = AppState {
        workflows,
        executor,
        scheduler: scheduler.clone(),
    };

    tracing::info!("📡 Creating HTTP router with all endpoints");
    let app = Router::new()
        .route("/healthz", get(health_check))
        .merge(create_workflow_routes())
        .merge(create_schedule_routes())
        .with_state(app_state);

    tracing::info!("✅ Application initialized successfully");
    Ok((app, scheduler))
}

/// Start the HTTP server with the given configuration
pub async fn start_server(config: Config) -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .init();

    tracing::info!("Starting Flowsmith server...");

    let (app, scheduler) = create_app(config.clone()).await?;

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&bind_addr).await?;
    tracing::info!("Server listening on http://{}", bind_addr);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("🛑 Shutdown signal received");
        })
        .await?;

    scheduler.shutdown().await?;
    Ok(())
}

/// Health check endpoint handler
async fn health_check() -> &'static str {
    "ok"
}
