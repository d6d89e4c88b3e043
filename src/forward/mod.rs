//! Workflow forwarding: the outbound side of the relay.
//!
//! Forwarding is a best-effort side effect. The sender-facing response is
//! decided before the forward is attempted, so every failure here is logged
//! and absorbed at this boundary; nothing propagates to the dispatcher.

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, error};

use crate::config::Config;
use crate::slack::EventBody;

/// Static identifier sent as the `user` field of workflow invocations.
const CALLER_TAG: &str = "slack-relay";

/// Response mode requested from the workflow API. Streaming makes the call
/// return as soon as the workflow is accepted rather than when it completes.
const RESPONSE_MODE: &str = "streaming";

/// Something that can forward an accepted event downstream.
///
/// `forward` never fails observably; implementations own their error
/// handling. The seam exists so tests can substitute a recording fake.
#[async_trait]
pub trait WorkflowForwarder: Send + Sync + fmt::Debug {
    async fn forward(&self, event: &EventBody);
}

/// The input mapping sent to the workflow, nested under `inputs`.
///
/// Missing event fields are normalized to empty strings so the workflow
/// always sees the full set of keys.
#[derive(Debug, Serialize, PartialEq, Eq)]
struct WorkflowInputs {
    slack_text: String,
    channel_id: String,
    timestamp: String,
    user_id: String,
    event_type: String,
}

/// The outbound request body for a workflow run.
#[derive(Debug, Serialize)]
struct WorkflowRequest {
    inputs: WorkflowInputs,
    response_mode: &'static str,
    user: &'static str,
}

impl WorkflowRequest {
    fn from_event(event: &EventBody) -> Self {
        WorkflowRequest {
            inputs: WorkflowInputs {
                slack_text: event.text.clone().unwrap_or_default(),
                channel_id: event
                    .channel
                    .as_ref()
                    .map(|c| c.as_str().to_string())
                    .unwrap_or_default(),
                timestamp: event
                    .ts
                    .as_ref()
                    .map(|ts| ts.as_str().to_string())
                    .unwrap_or_default(),
                user_id: event
                    .user
                    .as_ref()
                    .map(|u| u.as_str().to_string())
                    .unwrap_or_default(),
                event_type: event.kind.clone().unwrap_or_default(),
            },
            response_mode: RESPONSE_MODE,
            user: CALLER_TAG,
        }
    }
}

/// Forwards events to a Dify workflow-execution endpoint.
pub struct DifyForwarder {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl DifyForwarder {
    /// Builds the forwarder from configuration.
    ///
    /// The HTTP client carries a bounded timeout so a slow downstream cannot
    /// pin handler tasks indefinitely.
    pub fn new(config: &Config) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(config.forward_timeout)
            .build()?;
        Ok(DifyForwarder {
            http,
            endpoint: config.dify_endpoint.clone(),
            api_key: config.dify_api_key.clone(),
        })
    }
}

#[async_trait]
impl WorkflowForwarder for DifyForwarder {
    async fn forward(&self, event: &EventBody) {
        // A missing key is a deployment error, not a per-request one.
        let Some(api_key) = &self.api_key else {
            error!("DIFY_API_KEY is not configured; skipping workflow forward");
            return;
        };

        let request = WorkflowRequest::from_event(event);
        debug!(endpoint = %self.endpoint, "forwarding event to workflow");

        let result = self
            .http
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await;

        match result {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    debug!(%status, "workflow run initiated");
                } else {
                    let body = truncated_body(response, 512).await;
                    error!(%status, body, "workflow endpoint returned an error");
                }
            }
            Err(e) => {
                error!(error = %e, "failed to reach workflow endpoint");
            }
        }
    }
}

impl fmt::Debug for DifyForwarder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DifyForwarder")
            .field("endpoint", &self.endpoint)
            .field("api_key_configured", &self.api_key.is_some())
            .finish_non_exhaustive()
    }
}

/// Reads at most `limit` bytes of a response body for the error log.
async fn truncated_body(response: reqwest::Response, limit: usize) -> String {
    let mut body = response.text().await.unwrap_or_default();
    if body.len() > limit {
        let mut cut = limit;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChannelId, EventTs, UserId};
    use serde_json::json;

    fn full_event() -> EventBody {
        EventBody {
            ts: Some(EventTs::from("1712345678.000200")),
            channel: Some(ChannelId::from("C1")),
            user: Some(UserId("U1".to_string())),
            text: Some("hello world".to_string()),
            kind: Some("message".to_string()),
            client_msg_id: None,
        }
    }

    #[test]
    fn request_maps_all_fields() {
        let request = WorkflowRequest::from_event(&full_event());

        assert_eq!(
            request.inputs,
            WorkflowInputs {
                slack_text: "hello world".to_string(),
                channel_id: "C1".to_string(),
                timestamp: "1712345678.000200".to_string(),
                user_id: "U1".to_string(),
                event_type: "message".to_string(),
            }
        );
    }

    #[test]
    fn missing_fields_become_empty_strings() {
        let event = EventBody {
            ts: None,
            channel: None,
            user: None,
            text: None,
            kind: None,
            client_msg_id: None,
        };
        let request = WorkflowRequest::from_event(&event);

        assert_eq!(request.inputs.slack_text, "");
        assert_eq!(request.inputs.channel_id, "");
        assert_eq!(request.inputs.timestamp, "");
        assert_eq!(request.inputs.user_id, "");
        assert_eq!(request.inputs.event_type, "");
    }

    #[test]
    fn serialized_shape_matches_workflow_api() {
        let request = WorkflowRequest::from_event(&full_event());
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(
            value,
            json!({
                "inputs": {
                    "slack_text": "hello world",
                    "channel_id": "C1",
                    "timestamp": "1712345678.000200",
                    "user_id": "U1",
                    "event_type": "message"
                },
                "response_mode": "streaming",
                "user": "slack-relay"
            })
        );
    }

    #[tokio::test]
    async fn missing_api_key_returns_without_sending() {
        // Endpoint points nowhere reachable; if forward attempted the call,
        // the bounded timeout would still let the test finish, but with the
        // key unset it must return immediately.
        let mut config = Config::from_lookup(|_| None).unwrap();
        config.dify_endpoint = "http://127.0.0.1:9/unroutable".to_string();
        config.dify_api_key = None;

        let forwarder = DifyForwarder::new(&config).unwrap();
        forwarder.forward(&full_event()).await;
    }
}
