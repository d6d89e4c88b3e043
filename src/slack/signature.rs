//! Slack request signature verification using HMAC-SHA256.
//!
//! Slack signs requests with a shared signing secret over the base string
//! `"v0:<timestamp>:<body>"`. The signature arrives in the `X-Slack-Signature`
//! header as `v0=<hex>`, with the timestamp in `X-Slack-Request-Timestamp`.
//!
//! Verification has two parts: the timestamp must be within the replay window
//! (otherwise a captured request could be replayed later), and the HMAC must
//! match under constant-time comparison.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Maximum allowed skew between the request timestamp and receipt time.
pub const REPLAY_WINDOW_SECS: i64 = 300;

/// Parses a Slack signature header (e.g., "v0=abc123...") into raw bytes.
///
/// Returns `None` for malformed headers (missing prefix, invalid hex, etc.).
/// Never panics.
///
/// # Examples
///
/// ```
/// use slack_relay::slack::parse_signature_header;
///
/// assert!(parse_signature_header("v0=abcd1234").is_some());
/// assert!(parse_signature_header("abcd1234").is_none());
/// assert!(parse_signature_header("v1=abcd1234").is_none());
/// assert!(parse_signature_header("v0=xyz").is_none());
/// ```
pub fn parse_signature_header(header: &str) -> Option<Vec<u8>> {
    // Slack uses a "v0=" prefix
    let hex_sig = header.strip_prefix("v0=")?;

    hex::decode(hex_sig).ok()
}

/// Computes the HMAC-SHA256 signature over the Slack base string
/// `"v0:<timestamp>:<body>"`.
///
/// This is also useful in tests for generating expected signatures.
pub fn compute_signature(timestamp: &str, body: &[u8], secret: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(b"v0:");
    mac.update(timestamp.as_bytes());
    mac.update(b":");
    mac.update(body);
    mac.finalize().into_bytes().to_vec()
}

/// Formats a signature as a Slack-style header value (`v0=<hex>`).
pub fn format_signature_header(signature: &[u8]) -> String {
    format!("v0={}", hex::encode(signature))
}

/// Checks whether a request timestamp is within the replay window.
///
/// The timestamp header carries integer Unix seconds; a non-integer value
/// fails the check.
pub fn timestamp_within_window(timestamp: &str, now: DateTime<Utc>) -> bool {
    let Ok(ts) = timestamp.trim().parse::<i64>() else {
        return false;
    };
    (now.timestamp() - ts).abs() <= REPLAY_WINDOW_SECS
}

/// Verifies a Slack request signature against the body and signing secret.
///
/// Returns `true` if the signature is valid, `false` otherwise.
/// Uses constant-time comparison to prevent timing attacks.
///
/// Note: the replay-window check is separate (see [`timestamp_within_window`]);
/// this function only checks the HMAC for the given timestamp.
///
/// # Examples
///
/// ```
/// use slack_relay::slack::{compute_signature, format_signature_header, verify_signature};
///
/// let body = b"payload";
/// let secret = b"signing-secret";
/// let ts = "1712345678";
///
/// let header = format_signature_header(&compute_signature(ts, body, secret));
/// assert!(verify_signature(ts, body, &header, secret));
/// assert!(!verify_signature(ts, body, &header, b"wrong-secret"));
/// ```
pub fn verify_signature(
    timestamp: &str,
    body: &[u8],
    signature_header: &str,
    secret: &[u8],
) -> bool {
    let received_signature = match parse_signature_header(signature_header) {
        Some(sig) => sig,
        None => return false,
    };

    let mut mac = match HmacSha256::new_from_slice(secret) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(b"v0:");
    mac.update(timestamp.as_bytes());
    mac.update(b":");
    mac.update(body);

    // Constant-time comparison via the HMAC library
    mac.verify_slice(&received_signature).is_ok()
}
