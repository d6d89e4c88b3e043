//! Request authentication for inbound Slack deliveries.
//!
//! Two strategies are tried in order, short-circuiting on the first success:
//!
//! 1. **Signature**: HMAC-SHA256 over `"v0:<timestamp>:<body>"` with the
//!    signing secret, plus a replay-window check on the timestamp.
//! 2. **Token**: the payload's legacy `token` field compared to the configured
//!    verification token.
//!
//! A strategy that cannot run (missing headers, unconfigured secret) reports
//! `Unavailable` and the next one is tried; the hosting transport not exposing
//! headers degrades to the token path rather than erroring. Failure logs never
//! carry secret-derived material.

use std::fmt;
use std::sync::Arc;

use axum::http::HeaderMap;
use tracing::{debug, error, warn};

use crate::clock::Clock;
use crate::config::Config;
use crate::slack::SlackPayload;
use crate::slack::signature::{timestamp_within_window, verify_signature};

/// Header carrying the request timestamp (integer Unix seconds).
const HEADER_TIMESTAMP: &str = "x-slack-request-timestamp";
/// Header carrying the request signature (`v0=<hex>`).
const HEADER_SIGNATURE: &str = "x-slack-signature";

/// Raw request material an authentication strategy may inspect.
///
/// Borrowed from the handler; scoped to one request.
#[derive(Debug, Clone, Copy)]
pub struct InboundEnvelope<'a> {
    pub headers: &'a HeaderMap,
    pub body: &'a [u8],
}

/// Outcome of one authentication strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    /// The strategy positively verified the request.
    Accepted,
    /// The strategy ran and the request failed verification.
    Rejected,
    /// The strategy could not run for this request (missing headers or
    /// missing payload fields).
    Unavailable,
}

/// A single authentication strategy.
trait AuthStrategy: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    fn evaluate(&self, envelope: &InboundEnvelope<'_>, payload: &SlackPayload) -> AuthOutcome;
}

/// Signature verification against the Slack signing secret.
struct SignatureStrategy {
    secret: Vec<u8>,
    clock: Arc<dyn Clock>,
}

impl AuthStrategy for SignatureStrategy {
    fn name(&self) -> &'static str {
        "signature"
    }

    fn evaluate(&self, envelope: &InboundEnvelope<'_>, _payload: &SlackPayload) -> AuthOutcome {
        let timestamp = header_str(envelope.headers, HEADER_TIMESTAMP);
        let signature = header_str(envelope.headers, HEADER_SIGNATURE);
        let (Some(timestamp), Some(signature)) = (timestamp, signature) else {
            debug!("signature headers not present; transport may not expose them");
            return AuthOutcome::Unavailable;
        };

        if !timestamp_within_window(timestamp, self.clock.now()) {
            warn!("request timestamp outside replay window or not an integer");
            return AuthOutcome::Rejected;
        }

        if verify_signature(timestamp, envelope.body, signature, &self.secret) {
            AuthOutcome::Accepted
        } else {
            AuthOutcome::Rejected
        }
    }
}

impl fmt::Debug for SignatureStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignatureStrategy").finish_non_exhaustive()
    }
}

/// Legacy verification-token comparison.
struct TokenStrategy {
    token: String,
}

impl AuthStrategy for TokenStrategy {
    fn name(&self) -> &'static str {
        "token"
    }

    fn evaluate(&self, _envelope: &InboundEnvelope<'_>, payload: &SlackPayload) -> AuthOutcome {
        match &payload.token {
            Some(token) if !token.is_empty() => {
                if *token == self.token {
                    AuthOutcome::Accepted
                } else {
                    AuthOutcome::Rejected
                }
            }
            _ => AuthOutcome::Unavailable,
        }
    }
}

impl fmt::Debug for TokenStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenStrategy").finish_non_exhaustive()
    }
}

/// Validates that an inbound request genuinely originated from Slack.
///
/// Built once at startup from [`Config`]; strategies whose configuration is
/// absent are simply not in the list.
#[derive(Debug)]
pub struct Authenticator {
    strategies: Vec<Box<dyn AuthStrategy>>,
    skip_verification: bool,
}

impl Authenticator {
    /// Builds the strategy list from configuration.
    pub fn from_config(config: &Config, clock: Arc<dyn Clock>) -> Self {
        let mut strategies: Vec<Box<dyn AuthStrategy>> = Vec::new();
        if let Some(secret) = &config.signing_secret {
            strategies.push(Box::new(SignatureStrategy {
                secret: secret.as_bytes().to_vec(),
                clock: Arc::clone(&clock),
            }));
        }
        if let Some(token) = &config.verification_token {
            strategies.push(Box::new(TokenStrategy {
                token: token.clone(),
            }));
        }
        Authenticator {
            strategies,
            skip_verification: config.skip_signature_verification,
        }
    }

    /// Runs the strategies in order; one pass, no retries.
    ///
    /// Returns `true` iff any strategy accepted the request (or verification
    /// is bypassed via `SKIP_SIGNATURE_VERIFICATION`).
    pub fn authenticate(&self, envelope: &InboundEnvelope<'_>, payload: &SlackPayload) -> bool {
        if self.skip_verification {
            warn!("SKIP_SIGNATURE_VERIFICATION is enabled; accepting request without verification");
            return true;
        }

        if self.strategies.is_empty() {
            error!(
                "no authentication strategy configured; set SLACK_SIGNING_SECRET or \
                 SLACK_VERIFICATION_TOKEN"
            );
            return false;
        }

        for strategy in &self.strategies {
            match strategy.evaluate(envelope, payload) {
                AuthOutcome::Accepted => {
                    debug!(strategy = strategy.name(), "request authenticated");
                    return true;
                }
                AuthOutcome::Rejected => {
                    warn!(strategy = strategy.name(), "strategy rejected request");
                }
                AuthOutcome::Unavailable => {
                    debug!(
                        strategy = strategy.name(),
                        "strategy unavailable for this request"
                    );
                }
            }
        }

        warn!("no authentication strategy accepted the request");
        false
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
