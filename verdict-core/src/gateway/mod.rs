//! # HTTP Gateway
//!
//! Exposes the orchestrator over HTTP. `POST /api/analyze` answers with a
//! `text/event-stream` body carrying one session's events; malformed
//! requests are rejected synchronously before any stream is opened.

mod server;

pub use server::{AppState, ErrorBody, ErrorDetail, router as gateway_router, run as run_gateway};

use serde::{Deserialize, Serialize};

/// Configuration for the HTTP gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Origins allowed by CORS. Empty disables the CORS layer.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            allowed_origins: Vec::new(),
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
