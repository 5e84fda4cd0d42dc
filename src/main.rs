/// Flowsmith server entry point
///
/// Loads configuration from `FLOWSMITH_*` environment variables and serves:
/// - Workflow management and execution at /api/workflows/*
/// - Schedule management at /api/schedules/*
/// - Health check at /healthz

use flowsmith::{config::Config, server::start_server};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::default();

    start_server(config).await?;

    Ok(())
}
