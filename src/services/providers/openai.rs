use reqwest::Client;
use serde::Deserialize;

use super::{
    GenerateRequest, GeneratedImage, ImageProvider, ModerationVerdict, OverlaySource,
    ProviderError,
};

const IMAGES_URL: &str = "https://api.openai.com/v1/images/generations";
const MODERATIONS_URL: &str = "https://api.openai.com/v1/moderations";

/// OpenAI Images API provider (DALL·E family).
pub struct OpenAiProvider {
    http: Client,
    api_key: Option<String>,
}

#[derive(Deserialize)]
struct ImagesResponse {
    data: Vec<ImageDatum>,
}

#[derive(Deserialize)]
struct ImageDatum {
    url: Option<String>,
    b64_json: Option<String>,
}

#[derive(Deserialize)]
struct ModerationResponse {
    results: Vec<ModerationResult>,
}

#[derive(Deserialize)]
struct ModerationResult {
    flagged: bool,
    categories: serde_json::Value,
}

impl OpenAiProvider {
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
impl ImageProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<GeneratedImage, ProviderError> {
        let key = self.key()?;

        // The Images API has no negative-prompt parameter; fold exclusions
        // into the prompt text.
        let prompt = if request.negative_prompt.is_empty() {
            request.prompt.clone()
        } else {
            format!("{}. Do not include: {}", request.prompt, request.negative_prompt)
        };

        let body = serde_json::json!({
            "model": request.model,
            "prompt": prompt,
            "n": 1,
            "size": format!("{}x{}", request.width, request.height),
            "quality": request.quality,
            "response_format": "url",
        });

        let response = self
            .http
            .post(IMAGES_URL)
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
        let parsed: ImagesResponse = serde_json::from_value(raw.clone())?;
        let datum = parsed.data.into_iter().next().ok_or(ProviderError::EmptyResponse)?;

        let image = if let Some(url) = datum.url {
            OverlaySource::Url(url)
        } else if let Some(b64) = datum.b64_json {
            use base64::Engine;
            OverlaySource::Bytes(base64::engine::general_purpose::STANDARD.decode(b64)?)
        } else {
            return Err(ProviderError::EmptyResponse);
        };

        Ok(GeneratedImage {
            image,
            cost_cents: self.estimate_cost_cents(request),
            tokens_used: None,
            raw,
        })
    }

    fn estimate_cost_cents(&self, request: &GenerateRequest) -> i32 {
        // Published DALL·E 3 pricing; HD and large canvases cost more.
        let large = request.width.max(request.height) > 1024;
        match (request.quality.as_str(), large) {
            ("hd", true) => 12,
            ("hd", false) => 8,
            (_, true) => 8,
            (_, false) => 4,
        }
    }

    async fn is_available(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }

    async fn moderate_prompt(&self, prompt: &str) -> Result<ModerationVerdict, ProviderError> {
        let key = self.key()?;

        let response = self
            .http
            .post(MODERATIONS_URL)
            .bearer_auth(key)
            .json(&serde_json::json!({
                "model": "omni-moderation-latest",
                "input": prompt,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api { status, message });
        }

        let parsed: ModerationResponse = response.json().await?;
        let result = parsed
            .results
            .into_iter()
            .next()
            .ok_or(ProviderError::EmptyResponse)?;

        Ok(ModerationVerdict {
            approved: !result.flagged,
            reason: result.flagged.then(|| result.categories.to_string()),
        })
    }
}
