use base64::Engine;
use reqwest::Client;
use serde::Deserialize;

use super::{
    GenerateRequest, GeneratedImage, ImageProvider, ModerationVerdict, OverlaySource,
    ProviderError,
};

/// Stability AI text-to-image provider. Returns the image inline as base64.
pub struct StabilityProvider {
    http: Client,
    api_key: Option<String>,
}

#[derive(Deserialize)]
struct StabilityResponse {
    artifacts: Vec<Artifact>,
}

#[derive(Deserialize)]
struct Artifact {
    base64: String,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

impl StabilityProvider {
    pub fn new(http: Client, api_key: Option<String>) -> Self {
        Self { http, api_key }
    }

    fn key(&self) -> Result<&str, ProviderError> {
        self.api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or(ProviderError::MissingCredentials)
    }
}

#[async_trait::async_trait]
impl ImageProvider for StabilityProvider {
    fn name(&self) -> &str {
        "stability"
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<GeneratedImage, ProviderError> {
        let key = self.key()?;

        let url = format!(
            "https://api.stability.ai/v1/generation/{}/text-to-image",
            request.model
        );

        let steps = if request.quality == "hd" { 50 } else { 30 };
        let body = serde_json::json!({
            "text_prompts": [
                { "text": request.prompt, "weight": 1.0 },
                { "text": request.negative_prompt, "weight": -1.0 },
            ],
            "width": request.width,
            "height": request.height,
            "samples": 1,
            "steps": steps,
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api { status, message });
        }

        let raw: serde_json::Value = response.json().await?;
        let parsed: StabilityResponse = serde_json::from_value(raw.clone())?;
        let artifact = parsed
            .artifacts
            .into_iter()
            .next()
            .ok_or(ProviderError::EmptyResponse)?;

        // Stability filters unsafe generations server-side and reports it in
        // the finish reason.
        if artifact.finish_reason.as_deref() == Some("CONTENT_FILTERED") {
            return Err(ProviderError::ModerationBlocked(
                "generation filtered by provider safety system".to_string(),
            ));
        }

        let bytes = base64::engine::general_purpose::STANDARD.decode(artifact.base64)?;

        Ok(GeneratedImage {
            image: OverlaySource::Bytes(bytes),
            cost_cents: self.estimate_cost_cents(request),
            tokens_used: None,
            raw: redact_artifacts(raw),
        })
    }

    fn estimate_cost_cents(&self, request: &GenerateRequest) -> i32 {
        if request.quality == "hd" {
            5
        } else {
            3
        }
    }

    async fn is_available(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }

    async fn moderate_prompt(&self, _prompt: &str) -> Result<ModerationVerdict, ProviderError> {
        // No standalone moderation endpoint; safety filtering happens inside
        // generate() via the finish reason.
        Ok(ModerationVerdict::approve())
    }
}

/// Drop inline base64 payloads before persisting the raw response; megabytes of
/// image data do not belong in the job record.
fn redact_artifacts(mut raw: serde_json::Value) -> serde_json::Value {
    if let Some(artifacts) = raw.get_mut("artifacts").and_then(|a| a.as_array_mut()) {
        for artifact in artifacts {
            if let Some(obj) = artifact.as_object_mut() {
                obj.remove("base64");
            }
        }
    }
    raw
}
