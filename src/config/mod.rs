/// Configuration management for the Flowsmith engine
///
/// Handles server configuration, the SQLite store location, sandbox resource
/// limits and external service endpoints. Every value can be overridden with a
/// `FLOWSMITH_*` environment variable.

use crate::runtime::sandbox::SandboxLimits;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Function-node sandbox limits
    pub sandbox: SandboxConfig,
    /// External model / retrieval / search services
    pub services: ServiceConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Server port number
    pub port: u16,
}

/// Workflow and schedule storage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Directory holding the SQLite file (default: "data")
    pub data_dir: String,
    /// sqlx connection URL (default: "sqlite://{data_dir}/flowsmith.db?mode=rwc")
    pub url: String,
}

/// Resource limits for function-node scripts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Lua heap limit in bytes
    pub memory_bytes: usize,
    /// VM instruction budget per run
    pub instruction_limit: u64,
    /// Wall-clock limit per run in milliseconds
    pub timeout_ms: u64,
}

impl SandboxConfig {
    /// Limits in the form the sandbox consumes
    pub fn limits(&self) -> SandboxLimits {
        SandboxLimits {
            memory_bytes: self.memory_bytes,
            instruction_limit: self.instruction_limit,
            timeout: Duration::from_millis(self.timeout_ms),
        }
    }
}

/// Endpoints of the JSON-over-HTTP service adapter
///
/// A missing URL leaves the matching provider unconfigured; nodes that need it
/// fail with a descriptive error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub model_url: Option<String>,
    pub retrieval_url: Option<String>,
    pub search_url: Option<String>,
    /// Sent as a bearer token when present
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Per-request timeout in milliseconds
    pub request_timeout_ms: u64,
}

impl ServiceConfig {
    /// True when at least one endpoint is configured
    pub fn any_configured(&self) -> bool {
        self.model_url.is_some() || self.retrieval_url.is_some() || self.search_url.is_some()
    }
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

impl Default for Config {
    /// Default configuration with ENV_VAR support for container deployment
    fn default() -> Self {
        let data_dir = std::env::var("FLOWSMITH_DATA_DIR").unwrap_or_else(|_| "data".to_string());
        let url = std::env::var("FLOWSMITH_DATABASE_URL")
            .unwrap_or_else(|_| format!("sqlite://{}/flowsmith.db?mode=rwc", data_dir));

        Self {
            server: ServerConfig {
                host: std::env::var("FLOWSMITH_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env_parse("FLOWSMITH_PORT", 3004),
            },
            database: DatabaseConfig { data_dir, url },
            sandbox: SandboxConfig {
                memory_bytes: env_parse("FLOWSMITH_SANDBOX_MEMORY_BYTES", 16 * 1024 * 1024),
                instruction_limit: env_parse("FLOWSMITH_SANDBOX_INSTRUCTIONS", 10_000_000),
                timeout_ms: env_parse("FLOWSMITH_SANDBOX_TIMEOUT_MS", 5_000),
            },
            services: ServiceConfig {
                model_url: env_opt("FLOWSMITH_MODEL_URL"),
                retrieval_url: env_opt("FLOWSMITH_RETRIEVAL_URL"),
                search_url: env_opt("FLOWSMITH_SEARCH_URL"),
                api_key: env_opt("FLOWSMITH_API_KEY"),
                request_timeout_ms: env_parse("FLOWSMITH_REQUEST_TIMEOUT_MS", 60_000),
            },
        }
    }
}
