//! Constants used throughout the gateway
//!
//! This module contains all constant values used at runtime, including
//! upstream defaults, cookie names, discovery bodies, and the bot filter
//! vocabulary.

// ============================================================================
// UPSTREAM
// ============================================================================

/// Default upstream host (hostname only, never a URL)
pub const DEFAULT_UPSTREAM_HOST: &str = "sentry.io";

/// Upstream REST API path prefix
pub const API_PREFIX: &str = "/api/0";

/// Every upstream OAuth scope the gateway ever needs. The federated
/// authorize request always asks for the full set; what the MCP client may
/// actually use is narrowed by the granted permissions.
pub const UPSTREAM_OAUTH_SCOPES: &[&str] = &[
    "org:read",
    "org:write",
    "project:read",
    "project:write",
    "project:releases",
    "team:read",
    "team:write",
    "member:read",
    "event:read",
    "event:write",
];

// ============================================================================
// ENVIRONMENT VARIABLES
// ============================================================================

/// Environment variable: upstream hostname
pub const ENV_UPSTREAM_HOST: &str = "UPSTREAM_HOST";

/// Environment variable: OAuth client id registered with the upstream
pub const ENV_UPSTREAM_CLIENT_ID: &str = "UPSTREAM_CLIENT_ID";

/// Environment variable: OAuth client secret registered with the upstream
pub const ENV_UPSTREAM_CLIENT_SECRET: &str = "UPSTREAM_CLIENT_SECRET";

/// Environment variable: secret for signing browser cookies
pub const ENV_COOKIE_SECRET: &str = "COOKIE_SECRET";

/// Environment variable: OpenAI API key (enables the embedded agents)
pub const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";

/// Environment variable: OpenAI model name
pub const ENV_OPENAI_MODEL: &str = "OPENAI_MODEL";

/// Environment variable: OpenAI reasoning effort (low|medium|high|empty)
pub const ENV_OPENAI_REASONING_EFFORT: &str = "OPENAI_REASONING_EFFORT";

/// Default model for the embedded agents
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-5";

// ============================================================================
// COOKIES
// ============================================================================

/// HMAC-signed set of upstream client ids the browser has approved
pub const APPROVED_CLIENTS_COOKIE: &str = "mcp-approved-clients";

/// CSRF nonce for the in-browser chat OAuth dance
pub const CHAT_OAUTH_STATE_COOKIE: &str = "chat_oauth_state";

/// Serialized token set for the browser chat (not part of MCP)
pub const CHAT_AUTH_DATA_COOKIE: &str = "sentry_auth_data";

/// Lifetime of the chat OAuth state cookie, in seconds
pub const CHAT_OAUTH_STATE_MAX_AGE: i64 = 600;

// ============================================================================
// EMBEDDED AGENT
// ============================================================================

/// Upper bound on model-call steps per embedded-agent invocation
pub const AGENT_MAX_STEPS: usize = 5;

/// Requests allowed per rate-limit window for agent-backed tools
pub const AGENT_RATE_LIMIT_REQUESTS: u64 = 20;

/// Rate-limit window for agent-backed tools, in seconds
pub const AGENT_RATE_LIMIT_WINDOW_SECS: i64 = 60;

// ============================================================================
// CONSTRAINT CACHE
// ============================================================================

/// TTL for cached constraint verification results, in seconds
pub const CONSTRAINT_CACHE_TTL_SECS: i64 = 900;

/// Version prefix for constraint cache keys
pub const CONSTRAINT_CACHE_PREFIX: &str = "caps:v1";

/// Deadline for the project lookup during constraint verification
pub const PROJECT_LOOKUP_TIMEOUT_SECS: u64 = 5;

// ============================================================================
// DISCOVERY BODIES
// ============================================================================

/// Body served at GET /robots.txt
pub const ROBOTS_TXT: &str = "User-agent: *\n\
Allow: /$\n\
Allow: /llms.txt\n\
Allow: /robots.txt\n\
Disallow: /oauth/\n\
Disallow: /mcp\n\
Disallow: /sse\n";

/// Deprecation body for the removed SSE transport, served verbatim
pub const SSE_GONE_BODY: &str = r#"{"error":"SSE transport has been removed","message":"The SSE transport endpoint is no longer supported. Please use the HTTP transport at /mcp instead.","migrationGuide":"https://mcp.sentry.dev"}"#;

// ============================================================================
// BOT FILTER
// ============================================================================

/// Known-legitimate bot user-agent substrings (always allowed)
pub const BOT_ALLOW_LIST: &[&str] = &[
    "googlebot",
    "bingbot",
    "slurp",
    "duckduckbot",
    "baiduspider",
    "yandexbot",
    "facebookexternalhit",
    "twitterbot",
    "linkedinbot",
    "whatsapp",
    "telegrambot",
    "postman",
    "insomnia",
    "uptimerobot",
    "pingdom",
    "newrelic",
    "datadog",
    "github-camo",
    "slack-imgproxy",
];

/// Generic HTTP client / scraper user-agent substrings (denied)
pub const BOT_DENY_LIST: &[&str] = &[
    "bot",
    "spider",
    "crawler",
    "scraper",
    "monitor",
    "fetch",
    "curl",
    "wget",
    "python-requests",
    "python-urllib",
    "okhttp",
    "go-http-client",
    "java/",
    "libwww-perl",
    "httpclient",
    "axios",
    "node-fetch",
];

/// Minimum user-agent length before a request is treated as a generic bot
pub const MIN_BROWSER_UA_LENGTH: usize = 10;
