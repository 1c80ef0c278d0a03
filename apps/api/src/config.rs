//! API server configuration.
//!
//! Configuration is loaded from environment variables with fallback to defaults.

use std::env;

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Address the HTTP server binds to
    pub bind_addr: String,

    /// Path to the SQLite database file
    pub database_path: String,

    /// Allowed CORS origin for the counter frontend, `*` when unset
    pub cors_origin: Option<String>,
}

impl ApiConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Self {
        ApiConfig {
            bind_addr: env::var("DAWA_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".to_string()),
            database_path: env::var("DAWA_DATABASE_PATH")
                .unwrap_or_else(|_| "dawa_pos.db".to_string()),
            cors_origin: env::var("DAWA_CORS_ORIGIN").ok().filter(|v| !v.is_empty()),
        }
    }
}
