use reqwest::Client;

/// Outbound notification seam for pipeline events.
///
/// Fire-and-forget, at-most-once: emission failures are logged and swallowed,
/// and must never affect job state. Events fire only after the terminal status
/// write has committed.
#[async_trait::async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: &str, payload: serde_json::Value);
}

/// POSTs events as JSON to a configured webhook URL.
pub struct WebhookEventSink {
    http: Client,
    url: String,
}

impl WebhookEventSink {
    pub fn new(http: Client, url: String) -> Self {
        Self { http, url }
    }
}

#[async_trait::async_trait]
impl EventSink for WebhookEventSink {
    async fn emit(&self, event: &str, payload: serde_json::Value) {
        let body = serde_json::json!({ "event": event, "payload": payload });
        match self.http.post(&self.url).json(&body).send().await {
            Ok(response) if !response.status().is_success() => {
                tracing::warn!(event, status = %response.status(), "event webhook rejected");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(event, error = %e, "event webhook unreachable");
            }
        }
    }
}

/// Used when no webhook is configured.
pub struct NoopEventSink;

#[async_trait::async_trait]
impl EventSink for NoopEventSink {
    async fn emit(&self, event: &str, _payload: serde_json::Value) {
        tracing::debug!(event, "event emitted (no sink configured)");
    }
}
