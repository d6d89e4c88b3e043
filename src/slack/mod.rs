//! Slack Events API payloads: typed representation, parsing, and request
//! signature verification.

pub mod events;
pub mod parser;
pub mod signature;

pub use events::{EventBody, SlackPayload};
pub use parser::{ParseError, parse_payload};
pub use signature::{
    REPLAY_WINDOW_SECS, compute_signature, format_signature_header, parse_signature_header,
    timestamp_within_window, verify_signature,
};
