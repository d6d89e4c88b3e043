//! Service configuration, loaded once at startup from the environment.
//!
//! The relay deliberately has no ambient configuration store: everything the
//! pipeline needs is read here and passed into the components by reference.
//!
//! # Environment variables
//!
//! - `DIFY_API_KEY` - API key for the Dify workflow endpoint. Required for
//!   forwarding; if unset, forwarding is skipped and an error is logged.
//! - `DIFY_ENDPOINT` - Workflow-execution endpoint (default: the hosted Dify
//!   API).
//! - `SLACK_SIGNING_SECRET` - Enables the signature verification strategy.
//! - `SLACK_VERIFICATION_TOKEN` - Enables the legacy token strategy.
//! - `DEBUG_MODE` - `"true"` to log full event payloads.
//! - `SKIP_SIGNATURE_VERIFICATION` - `"true"` to bypass authentication
//!   entirely. Unsafe; debugging only.
//! - `DEDUP_TTL_SECS` - Dedup window in seconds (default 60). Should be at
//!   least Slack's retry interval.
//! - `FORWARD_TIMEOUT_SECS` - Outbound HTTP timeout in seconds (default 10).
//! - `LISTEN_ADDR` - Socket address to bind (default `0.0.0.0:3000`).

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

/// Default Dify workflow-execution endpoint.
pub const DEFAULT_DIFY_ENDPOINT: &str = "https://api.dify.ai/v1/workflows/run";

/// Default dedup window. Chosen to cover Slack's retry cadence; a retried
/// delivery arriving after expiry is treated as new (accepted tradeoff).
pub const DEFAULT_DEDUP_TTL_SECS: u64 = 60;

/// Default timeout for the outbound workflow call.
pub const DEFAULT_FORWARD_TIMEOUT_SECS: u64 = 10;

/// Default listen address.
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:3000";

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable held a value that could not be parsed.
    #[error("invalid value for {var}: {value:?}")]
    InvalidValue { var: &'static str, value: String },
}

/// Complete relay configuration.
///
/// Loaded once in `main` and passed by reference into the component
/// constructors; request handlers never consult the environment.
#[derive(Clone)]
pub struct Config {
    /// Address the HTTP server binds to.
    pub listen_addr: SocketAddr,

    /// Dify API key. `None` means forwarding is disabled (deployment error,
    /// logged per request attempt).
    pub dify_api_key: Option<String>,

    /// Dify workflow-execution endpoint URL.
    pub dify_endpoint: String,

    /// Slack signing secret; enables the signature verification strategy.
    pub signing_secret: Option<String>,

    /// Slack verification token; enables the legacy token strategy.
    pub verification_token: Option<String>,

    /// When true, full event payloads are logged.
    pub debug_mode: bool,

    /// When true, authentication is bypassed entirely.
    ///
    /// This exists as a debugging escape hatch and must never be enabled in
    /// production.
    pub skip_signature_verification: bool,

    /// How long an event identity is remembered for duplicate suppression.
    pub dedup_ttl: Duration,

    /// Timeout for the outbound workflow call.
    pub forward_timeout: Duration,
}

impl Config {
    /// Loads configuration from process environment variables.
    pub fn from_env() -> Result<Config, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Loads configuration from an arbitrary lookup function.
    ///
    /// `from_env` delegates here; tests supply a closure over a map so they
    /// don't race on process-global environment state.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Config, ConfigError> {
        let listen_addr = match lookup("LISTEN_ADDR") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
                var: "LISTEN_ADDR",
                value: raw,
            })?,
            None => DEFAULT_LISTEN_ADDR
                .parse()
                .expect("default listen address is valid"),
        };

        let dedup_ttl_secs = parse_secs(&lookup, "DEDUP_TTL_SECS", DEFAULT_DEDUP_TTL_SECS)?;
        let forward_timeout_secs =
            parse_secs(&lookup, "FORWARD_TIMEOUT_SECS", DEFAULT_FORWARD_TIMEOUT_SECS)?;

        Ok(Config {
            listen_addr,
            dify_api_key: non_empty(lookup("DIFY_API_KEY")),
            dify_endpoint: non_empty(lookup("DIFY_ENDPOINT"))
                .unwrap_or_else(|| DEFAULT_DIFY_ENDPOINT.to_string()),
            signing_secret: non_empty(lookup("SLACK_SIGNING_SECRET")),
            verification_token: non_empty(lookup("SLACK_VERIFICATION_TOKEN")),
            debug_mode: flag(&lookup, "DEBUG_MODE"),
            skip_signature_verification: flag(&lookup, "SKIP_SIGNATURE_VERIFICATION"),
            dedup_ttl: Duration::from_secs(dedup_ttl_secs),
            forward_timeout: Duration::from_secs(forward_timeout_secs),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn flag(lookup: &impl Fn(&str) -> Option<String>, var: &str) -> bool {
    lookup(var).is_some_and(|v| v.eq_ignore_ascii_case("true"))
}

fn parse_secs(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: u64,
) -> Result<u64, ConfigError> {
    match lookup(var) {
        Some(raw) => raw
            .parse()
            .map_err(|_| ConfigError::InvalidValue { var, value: raw }),
        None => Ok(default),
    }
}

/// Secrets are redacted; a `Config` in a log line must never expose key material.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("listen_addr", &self.listen_addr)
            .field("dify_api_key", &self.dify_api_key.as_ref().map(|_| "<redacted>"))
            .field("dify_endpoint", &self.dify_endpoint)
            .field(
                "signing_secret",
                &self.signing_secret.as_ref().map(|_| "<redacted>"),
            )
            .field(
                "verification_token",
                &self.verification_token.as_ref().map(|_| "<redacted>"),
            )
            .field("debug_mode", &self.debug_mode)
            .field(
                "skip_signature_verification",
                &self.skip_signature_verification,
            )
            .field("dedup_ttl", &self.dedup_ttl)
            .field("forward_timeout", &self.forward_timeout)
            .finish()
    }
}
