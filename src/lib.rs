//! Slack event relay - receives Slack Events API deliveries, authenticates and
//! deduplicates them, and forwards a normalized payload to a Dify workflow.
//!
//! This library provides the validation and exactly-once-acceptance pipeline;
//! the binary in `main.rs` wires it into an axum HTTP server.

pub mod auth;
pub mod clock;
pub mod config;
pub mod dedup;
pub mod forward;
pub mod server;
pub mod slack;
pub mod types;
