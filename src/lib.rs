//! sentry-mcp - stateless MCP gateway for Sentry
//!
//! This library exposes Sentry to AI agents over the Model Context
//! Protocol. It:
//! - Authenticates end users by federating an OAuth 2.1 authorization code
//!   flow to Sentry's OAuth server
//! - Serves JSON-RPC-over-HTTP MCP requests, dispatching to a set of
//!   read/write tools that call Sentry's REST API on the user's behalf
//! - Narrows sessions to one organization/project via the URL path, with
//!   the narrowing verified upstream and enforced over caller arguments
//! - Embeds bounded LLM agents for natural-language search and a generic
//!   "use Sentry for me" orchestrator
//!
//! The gateway holds no end-user data and no MCP session state; every
//! request is resolved, dispatched, and forgotten.

// Core modules
pub mod constants;
pub mod error;
pub mod model;
pub mod permissions;

// Per-request state
pub mod context;

// Upstream access
pub mod upstream;
pub mod verifier;

// Tool surface
pub mod mcp;
pub mod tools;

// Embedded agents
pub mod agent;

// Infrastructure
pub mod config;
pub mod storage;
pub mod telemetry;

// Interface layers
pub mod auth;
pub mod http;

// Re-exports for convenience
pub use config::Config;
pub use error::{GatewayError, Result};

/// Initialize logging for the application
pub fn init_logging() {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "sentry_mcp=info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
