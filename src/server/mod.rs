//! HTTP server for the Slack relay.
//!
//! # Endpoints
//!
//! - `POST /slack/events` - Accepts Slack Events API deliveries; always
//!   answers 200 with a short text body (see `events.rs` for the outcomes)
//! - `GET /health` - Returns 200 if the server is running

use std::sync::Arc;

pub mod events;
pub mod health;

pub use events::event_handler;
pub use health::health_handler;

use crate::auth::Authenticator;
use crate::clock::Clock;
use crate::config::Config;
use crate::dedup::Deduplicator;
use crate::forward::{DifyForwarder, WorkflowForwarder};

/// Shared application state, passed to handlers via axum's `State` extractor.
///
/// Holds the pipeline components built once at startup; the dedup cache inside
/// [`Deduplicator`] is the only state shared across requests.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    authenticator: Authenticator,
    deduplicator: Deduplicator,
    forwarder: Arc<dyn WorkflowForwarder>,
    debug_mode: bool,
}

impl AppState {
    /// Creates state from pre-built components.
    ///
    /// Tests use this to substitute a fake clock or a recording forwarder.
    pub fn new(
        authenticator: Authenticator,
        deduplicator: Deduplicator,
        forwarder: Arc<dyn WorkflowForwarder>,
        debug_mode: bool,
    ) -> Self {
        AppState {
            inner: Arc::new(AppStateInner {
                authenticator,
                deduplicator,
                forwarder,
                debug_mode,
            }),
        }
    }

    /// Builds the full production pipeline from configuration.
    pub fn from_config(config: &Config, clock: Arc<dyn Clock>) -> Result<Self, reqwest::Error> {
        let forwarder = Arc::new(DifyForwarder::new(config)?);
        Ok(Self::new(
            Authenticator::from_config(config, Arc::clone(&clock)),
            Deduplicator::new(config.dedup_ttl, clock),
            forwarder,
            config.debug_mode,
        ))
    }

    pub fn authenticator(&self) -> &Authenticator {
        &self.inner.authenticator
    }

    pub fn deduplicator(&self) -> &Deduplicator {
        &self.inner.deduplicator
    }

    /// Returns a cloned handle to the forwarder for spawned tasks.
    pub fn forwarder(&self) -> Arc<dyn WorkflowForwarder> {
        Arc::clone(&self.inner.forwarder)
    }

    pub fn debug_mode(&self) -> bool {
        self.inner.debug_mode
    }
}

/// Builds the axum Router with all endpoints.
pub fn build_router(app_state: AppState) -> axum::Router {
    use axum::routing::{get, post};

    axum::Router::new()
        .route("/slack/events", post(event_handler))
        .route("/health", get(health_handler))
        .with_state(app_state)
}


#[cfg(test)]
mod integration_tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::Router;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::DateTime;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::clock::{ManualClock, SystemClock};
    use crate::dedup::Deduplicator;
    use crate::server::events::{
        RESPONSE_DUPLICATE, RESPONSE_ERROR, RESPONSE_OK, RESPONSE_UNAUTHORIZED,
    };
    use crate::slack::EventBody;
    use crate::slack::signature::{compute_signature, format_signature_header};

    const SECRET: &str = "test-signing-secret";
    const TOKEN: &str = "test-verification-token";
    const NOW_SECS: i64 = 1_712_345_678;

    /// Forwarder fake that records every event it receives.
    #[derive(Debug, Default)]
    struct RecordingForwarder {
        events: Mutex<Vec<EventBody>>,
    }

    impl RecordingForwarder {
        fn count(&self) -> usize {
            self.events.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl WorkflowForwarder for RecordingForwarder {
        async fn forward(&self, event: &EventBody) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    /// Builds a test pipeline with a manual clock and a recording forwarder.
    fn test_state() -> (AppState, ManualClock, Arc<RecordingForwarder>) {
        let clock = ManualClock::new(DateTime::from_timestamp(NOW_SECS, 0).unwrap());
        let mut config = Config::from_lookup(|_| None).unwrap();
        config.signing_secret = Some(SECRET.to_string());
        config.verification_token = Some(TOKEN.to_string());

        let forwarder = Arc::new(RecordingForwarder::default());
        let state = AppState::new(
            Authenticator::from_config(&config, Arc::new(clock.clone())),
            Deduplicator::new(config.dedup_ttl, Arc::new(clock.clone())),
            Arc::clone(&forwarder) as Arc<dyn WorkflowForwarder>,
            false,
        );
        (state, clock, forwarder)
    }

    /// Builds a signed POST to the events endpoint.
    ///
    /// `ts_secs` is the value of the timestamp header; sign with the real
    /// secret (or a wrong one, to exercise rejection).
    fn signed_request(body: &str, ts_secs: i64, secret: &str) -> Request<Body> {
        let ts = ts_secs.to_string();
        let signature =
            format_signature_header(&compute_signature(&ts, body.as_bytes(), secret.as_bytes()));

        Request::builder()
            .method("POST")
            .uri("/slack/events")
            .header("content-type", "application/json")
            .header("x-slack-request-timestamp", ts)
            .header("x-slack-signature", signature)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    /// Builds an unsigned POST (no signature headers at all).
    fn unsigned_request(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/slack/events")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn send(state: AppState, request: Request<Body>) -> (StatusCode, String) {
        let response = build_router(state).oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    /// Lets spawned forward tasks run to completion.
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    fn event_callback_body(event_id: &str, channel: &str, ts: &str) -> String {
        format!(
            r#"{{
                "type": "event_callback",
                "event_id": "{event_id}",
                "event": {{
                    "type": "message",
                    "channel": "{channel}",
                    "user": "U1",
                    "text": "hello",
                    "ts": "{ts}"
                }}
            }}"#
        )
    }

    // ─── Handshake ───

    #[tokio::test]
    async fn handshake_echoes_challenge_verbatim() {
        let (state, _clock, forwarder) = test_state();

        // Deliberately unsigned and carrying a wrong token: the handshake
        // must bypass authentication entirely.
        let body = r#"{"type": "url_verification", "challenge": "ch-42", "token": "wrong"}"#;
        let (status, text) = send(state, unsigned_request(body)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(text, "ch-42");
        settle().await;
        assert_eq!(forwarder.count(), 0);
    }

    #[tokio::test]
    async fn handshake_is_never_deduplicated() {
        let (state, _clock, _forwarder) = test_state();
        let body = r#"{"type": "url_verification", "challenge": "ch-42"}"#;

        let (_, first) = send(state.clone(), unsigned_request(body)).await;
        let (_, second) = send(state, unsigned_request(body)).await;
        assert_eq!(first, "ch-42");
        assert_eq!(second, "ch-42");
    }

    // ─── Authentication ───

    #[tokio::test]
    async fn valid_signature_accepted_with_wrong_token() {
        let (state, _clock, forwarder) = test_state();
        let body = r#"{"type": "event_callback", "token": "wrong", "event_id": "Ev1",
                       "event": {"type": "message", "channel": "C1", "ts": "1.0"}}"#;

        let (status, text) = send(state, signed_request(body, NOW_SECS, SECRET)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(text, RESPONSE_OK);
        settle().await;
        assert_eq!(forwarder.count(), 1);
    }

    #[tokio::test]
    async fn stale_timestamp_is_unauthorized() {
        let (state, _clock, forwarder) = test_state();
        let body = event_callback_body("Ev1", "C1", "1.0");

        // Correct HMAC over a timestamp 301s in the past.
        let (status, text) = send(state, signed_request(&body, NOW_SECS - 301, SECRET)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(text, RESPONSE_UNAUTHORIZED);
        settle().await;
        assert_eq!(forwarder.count(), 0);
    }

    #[tokio::test]
    async fn wrong_secret_is_unauthorized() {
        let (state, _clock, _forwarder) = test_state();
        let body = event_callback_body("Ev1", "C1", "1.0");

        let (_, text) = send(state, signed_request(&body, NOW_SECS, "wrong-secret")).await;
        assert_eq!(text, RESPONSE_UNAUTHORIZED);
    }

    #[tokio::test]
    async fn token_accepted_when_signature_data_absent() {
        let (state, _clock, forwarder) = test_state();
        let body = format!(
            r#"{{"type": "event_callback", "token": "{TOKEN}", "event_id": "Ev1",
                 "event": {{"type": "message", "channel": "C1", "ts": "1.0"}}}}"#
        );

        let (_, text) = send(state, unsigned_request(&body)).await;

        assert_eq!(text, RESPONSE_OK);
        settle().await;
        assert_eq!(forwarder.count(), 1);
    }

    #[tokio::test]
    async fn skip_verification_accepts_anything() {
        let clock = ManualClock::new(DateTime::from_timestamp(NOW_SECS, 0).unwrap());
        let mut config = Config::from_lookup(|_| None).unwrap();
        config.skip_signature_verification = true;

        let forwarder = Arc::new(RecordingForwarder::default());
        let state = AppState::new(
            Authenticator::from_config(&config, Arc::new(clock.clone())),
            Deduplicator::new(config.dedup_ttl, Arc::new(clock)),
            Arc::clone(&forwarder) as Arc<dyn WorkflowForwarder>,
            false,
        );

        let body = event_callback_body("Ev1", "C1", "1.0");
        let (_, text) = send(state, unsigned_request(&body)).await;
        assert_eq!(text, RESPONSE_OK);
    }

    // ─── Deduplication ───

    #[tokio::test]
    async fn duplicate_event_id_suppressed_until_ttl_expires() {
        let (state, clock, forwarder) = test_state();
        let body = event_callback_body("Ev-dup", "C1", "1.0");

        let (_, first) = send(state.clone(), signed_request(&body, NOW_SECS, SECRET)).await;
        assert_eq!(first, RESPONSE_OK);

        let (_, second) = send(state.clone(), signed_request(&body, NOW_SECS, SECRET)).await;
        assert_eq!(second, RESPONSE_DUPLICATE);

        // 61s later the entry has expired; the replay window (300s) still
        // accepts the original timestamp.
        clock.advance(chrono::Duration::seconds(61));
        let (_, third) = send(state, signed_request(&body, NOW_SECS, SECRET)).await;
        assert_eq!(third, RESPONSE_OK);

        settle().await;
        assert_eq!(forwarder.count(), 2);
    }

    #[tokio::test]
    async fn identity_falls_back_to_channel_and_ts() {
        let (state, _clock, _forwarder) = test_state();

        let body_c1 = r#"{"type": "event_callback",
                          "event": {"type": "message", "channel": "C1", "ts": "123"}}"#;
        let body_c2 = r#"{"type": "event_callback",
                          "event": {"type": "message", "channel": "C2", "ts": "123"}}"#;

        let (_, first) = send(state.clone(), signed_request(body_c1, NOW_SECS, SECRET)).await;
        assert_eq!(first, RESPONSE_OK);

        let (_, repeat) = send(state.clone(), signed_request(body_c1, NOW_SECS, SECRET)).await;
        assert_eq!(repeat, RESPONSE_DUPLICATE);

        // Same ts in a different channel is a different event.
        let (_, other) = send(state, signed_request(body_c2, NOW_SECS, SECRET)).await;
        assert_eq!(other, RESPONSE_OK);
    }

    #[tokio::test]
    async fn event_without_identity_is_always_processed() {
        let (state, _clock, forwarder) = test_state();
        let body = r#"{"type": "event_callback", "event": {"type": "message"}}"#;

        let (_, first) = send(state.clone(), signed_request(body, NOW_SECS, SECRET)).await;
        let (_, second) = send(state, signed_request(body, NOW_SECS, SECRET)).await;

        assert_eq!(first, RESPONSE_OK);
        assert_eq!(second, RESPONSE_OK);
        settle().await;
        assert_eq!(forwarder.count(), 2);
    }

    // ─── Degenerate payloads ───

    #[tokio::test]
    async fn payload_without_event_body_is_ok_and_not_forwarded() {
        let (state, _clock, forwarder) = test_state();
        let body = r#"{"type": "event_callback", "event_id": "Ev1"}"#;

        let (_, text) = send(state, signed_request(body, NOW_SECS, SECRET)).await;

        assert_eq!(text, RESPONSE_OK);
        settle().await;
        assert_eq!(forwarder.count(), 0);
    }

    #[tokio::test]
    async fn malformed_json_returns_generic_error() {
        let (state, _clock, forwarder) = test_state();

        let (status, text) = send(state, unsigned_request("this is not json")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(text, RESPONSE_ERROR);
        settle().await;
        assert_eq!(forwarder.count(), 0);
    }

    // ─── Forwarding isolation (real forwarder against a stub server) ───

    /// Spawns a local HTTP server that answers every workflow call with
    /// `status` and counts hits.
    async fn spawn_workflow_stub(
        status: StatusCode,
        hits: Arc<AtomicUsize>,
    ) -> std::net::SocketAddr {
        let app = Router::new().route(
            "/v1/workflows/run",
            axum::routing::post(move || {
                let hits = Arc::clone(&hits);
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    (status, "{}")
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    async fn wait_for_hits(hits: &AtomicUsize, expected: usize) {
        for _ in 0..200 {
            if hits.load(Ordering::SeqCst) >= expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    fn stub_backed_state(addr: std::net::SocketAddr, api_key: Option<&str>) -> AppState {
        let mut config = Config::from_lookup(|_| None).unwrap();
        config.verification_token = Some(TOKEN.to_string());
        config.dify_endpoint = format!("http://{addr}/v1/workflows/run");
        config.dify_api_key = api_key.map(str::to_string);

        AppState::from_config(&config, Arc::new(SystemClock)).unwrap()
    }

    #[tokio::test]
    async fn downstream_500_does_not_change_the_response() {
        let hits = Arc::new(AtomicUsize::new(0));
        let addr = spawn_workflow_stub(StatusCode::INTERNAL_SERVER_ERROR, Arc::clone(&hits)).await;
        let state = stub_backed_state(addr, Some("app-key"));

        let body = format!(
            r#"{{"type": "event_callback", "token": "{TOKEN}", "event_id": "Ev-500",
                 "event": {{"type": "message", "channel": "C1", "ts": "1.0", "text": "hi"}}}}"#
        );
        let (status, text) = send(state, unsigned_request(&body)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(text, RESPONSE_OK);

        // The forward does happen, fails downstream, and is absorbed.
        wait_for_hits(&hits, 1).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_api_key_skips_the_outbound_call() {
        let hits = Arc::new(AtomicUsize::new(0));
        let addr = spawn_workflow_stub(StatusCode::OK, Arc::clone(&hits)).await;
        let state = stub_backed_state(addr, None);

        let body = format!(
            r#"{{"type": "event_callback", "token": "{TOKEN}", "event_id": "Ev-nokey",
                 "event": {{"type": "message", "channel": "C1", "ts": "1.0"}}}}"#
        );
        let (_, text) = send(state, unsigned_request(&body)).await;
        assert_eq!(text, RESPONSE_OK);

        settle().await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    // ─── Health ───

    #[tokio::test]
    async fn health_returns_200() {
        let (state, _clock, _forwarder) = test_state();

        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let response = build_router(state).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"OK");
    }
}
