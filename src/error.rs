//! Error types for the gateway
//!
//! The gateway deals in a small, closed error taxonomy: bad caller input,
//! deployment/environment problems, upstream API failures, and everything
//! else. All errors can be converted to GatewayError for unified handling.

use thiserror::Error;

/// Main error type for gateway operations
#[derive(Error, Debug)]
pub enum GatewayError {
    /// The caller supplied bad input (bad query syntax, missing parameter).
    /// Never logged to telemetry.
    #[error("{0}")]
    UserInput(String),

    /// Environmental or deployment problem (DNS, missing token, agent not
    /// configured).
    #[error("{0}")]
    Config(String),

    /// A 4xx/5xx response from the upstream API.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error("OAuth error: {0}")]
    OAuth(String),

    #[error("MCP error: {0}")]
    Mcp(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Transport-layer failures against the upstream.
///
/// Each variant carries a user-facing sentence while preserving the original
/// error as the cause chain for debugging.
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("DNS temporarily unavailable. Please check your connection and try again.")]
    DnsTemporarilyUnavailable(#[source] reqwest::Error),

    #[error("Hostname not found. Please verify the hostname is correct.")]
    HostNotFound(#[source] reqwest::Error),

    #[error("Connection refused. The server may be down or the port blocked.")]
    ConnectionRefused(#[source] reqwest::Error),

    #[error("Connection timed out. The server took too long to respond.")]
    ConnectionTimedOut(#[source] reqwest::Error),

    #[error("Connection reset. The server closed the connection unexpectedly.")]
    ConnectionReset(#[source] reqwest::Error),

    #[error("Unable to connect to {url} - {message}")]
    Other {
        url: String,
        message: String,
        #[source]
        source: reqwest::Error,
    },
}

impl NetworkError {
    /// Classify a reqwest transport error by walking its cause chain.
    ///
    /// Matches the OS-level failure classes (EAI_AGAIN, ENOTFOUND,
    /// ECONNREFUSED, ETIMEDOUT, ECONNRESET) by io::ErrorKind where the
    /// chain exposes one, falling back to message inspection since hyper
    /// flattens some DNS failures into opaque strings.
    pub fn classify(url: &str, err: reqwest::Error) -> Self {
        let mut kinds: Vec<std::io::ErrorKind> = Vec::new();
        let mut messages: Vec<String> = Vec::new();

        let mut source: Option<&(dyn std::error::Error + 'static)> = Some(&err);
        while let Some(cause) = source {
            if let Some(io_err) = cause.downcast_ref::<std::io::Error>() {
                kinds.push(io_err.kind());
            }
            messages.push(cause.to_string());
            source = cause.source();
        }
        let haystack = messages.join(" | ");

        if haystack.contains("EAI_AGAIN") {
            NetworkError::DnsTemporarilyUnavailable(err)
        } else if haystack.contains("ENOTFOUND")
            || haystack.contains("failed to lookup address")
            || haystack.contains("dns error")
        {
            NetworkError::HostNotFound(err)
        } else if kinds.contains(&std::io::ErrorKind::ConnectionRefused)
            || haystack.contains("ECONNREFUSED")
        {
            NetworkError::ConnectionRefused(err)
        } else if err.is_timeout()
            || kinds.contains(&std::io::ErrorKind::TimedOut)
            || haystack.contains("ETIMEDOUT")
        {
            NetworkError::ConnectionTimedOut(err)
        } else if kinds.contains(&std::io::ErrorKind::ConnectionReset)
            || haystack.contains("ECONNRESET")
        {
            NetworkError::ConnectionReset(err)
        } else {
            let message = err.to_string();
            NetworkError::Other {
                url: url.to_string(),
                message,
                source: err,
            }
        }
    }
}

/// Convenient result type for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

impl GatewayError {
    /// Create a user-input error
    #[inline]
    pub fn user_input<S: Into<String>>(msg: S) -> Self {
        GatewayError::UserInput(msg.into())
    }

    /// Create a config error
    #[inline]
    pub fn config<S: Into<String>>(msg: S) -> Self {
        GatewayError::Config(msg.into())
    }

    /// Create an upstream API error
    #[inline]
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        GatewayError::Api {
            status,
            message: message.into(),
        }
    }

    /// Create an auth error
    #[inline]
    pub fn auth<S: Into<String>>(msg: S) -> Self {
        GatewayError::OAuth(msg.into())
    }

    /// Create an MCP protocol error
    #[inline]
    pub fn mcp<S: Into<String>>(msg: S) -> Self {
        GatewayError::Mcp(msg.into())
    }

    /// Create an internal error for unexpected conditions
    #[inline]
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        GatewayError::Internal(msg.into())
    }

    /// Add context to an error
    pub fn context<C: std::fmt::Display>(self, context: C) -> Self {
        match self {
            Self::UserInput(msg) => Self::UserInput(format!("{}: {}", context, msg)),
            Self::Config(msg) => Self::Config(format!("{}: {}", context, msg)),
            Self::OAuth(msg) => Self::OAuth(format!("{}: {}", context, msg)),
            Self::Mcp(msg) => Self::Mcp(format!("{}: {}", context, msg)),
            Self::Internal(msg) => Self::Internal(format!("{}: {}", context, msg)),
            // For errors with source, preserve the source and add context at the top level
            other => Self::Internal(format!("{}: {}", context, other)),
        }
    }
}
