pub mod openai;
pub mod stability;

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// One generation call, provider-agnostic.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub prompt: String,
    pub negative_prompt: String,
    pub model: String,
    pub quality: String,
    pub width: u32,
    pub height: u32,
}

/// Where the generated overlay lives. Some providers return a CDN URL, others
/// inline base64; the worker handles both.
#[derive(Debug, Clone)]
pub enum OverlaySource {
    Url(String),
    Bytes(Vec<u8>),
}

/// Result of a successful provider call.
#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub image: OverlaySource,
    pub cost_cents: i32,
    pub tokens_used: Option<i32>,
    /// Raw provider response, persisted opaquely on the job record.
    pub raw: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationVerdict {
    pub approved: bool,
    pub reason: Option<String>,
}

impl ModerationVerdict {
    pub fn approve() -> Self {
        Self {
            approved: true,
            reason: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("failed to parse provider response: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("failed to decode provider image payload: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("provider returned no image")]
    EmptyResponse,

    #[error("provider credentials not configured")]
    MissingCredentials,

    #[error("prompt blocked by moderation: {0}")]
    ModerationBlocked(String),
}

/// Capability set every image-generation provider implements.
#[async_trait::async_trait]
pub trait ImageProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, request: &GenerateRequest) -> Result<GeneratedImage, ProviderError>;

    fn estimate_cost_cents(&self, request: &GenerateRequest) -> i32;

    /// Provider outages and missing credentials are expected steady-state
    /// conditions, so this is a plain bool, not a Result.
    async fn is_available(&self) -> bool;

    async fn moderate_prompt(&self, prompt: &str) -> Result<ModerationVerdict, ProviderError>;
}

/// Static name -> provider mapping, populated once at startup.
///
/// Lookups never fail: an unknown name resolves to the default provider with a
/// warning, so a stale provider name on a product can never abort a job before
/// it has started.
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn ImageProvider>>,
    by_name: HashMap<String, usize>,
    default_index: usize,
}

impl ProviderRegistry {
    pub fn new(providers: Vec<Arc<dyn ImageProvider>>, default_name: &str) -> Self {
        assert!(!providers.is_empty(), "provider registry cannot be empty");

        let by_name: HashMap<String, usize> = providers
            .iter()
            .enumerate()
            .map(|(i, p)| (p.name().to_string(), i))
            .collect();

        let default_index = match by_name.get(default_name) {
            Some(&i) => i,
            None => {
                tracing::warn!(
                    default = default_name,
                    fallback = providers[0].name(),
                    "configured default provider not registered, using first registered"
                );
                0
            }
        };

        Self {
            providers,
            by_name,
            default_index,
        }
    }

    pub fn get_by_name(&self, name: &str) -> Arc<dyn ImageProvider> {
        match self.by_name.get(name) {
            Some(&i) => Arc::clone(&self.providers[i]),
            None => {
                let default = &self.providers[self.default_index];
                tracing::warn!(
                    requested = name,
                    default = default.name(),
                    "unknown provider name, falling back to default"
                );
                Arc::clone(default)
            }
        }
    }

    /// Preferred provider if available, else the first available in
    /// registration order, else the default (best-effort; the caller surfaces
    /// the eventual failure).
    pub async fn get_available(&self, preferred: Option<&str>) -> Arc<dyn ImageProvider> {
        if let Some(name) = preferred {
            if let Some(&i) = self.by_name.get(name) {
                let provider = &self.providers[i];
                if provider.is_available().await {
                    return Arc::clone(provider);
                }
                tracing::warn!(provider = name, "preferred provider unavailable");
            }
        }

        for provider in &self.providers {
            if provider.is_available().await {
                return Arc::clone(provider);
            }
        }

        let default = &self.providers[self.default_index];
        tracing::warn!(
            default = default.name(),
            "no provider reports available, returning default"
        );
        Arc::clone(default)
    }

    pub fn names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeProvider {
        name: &'static str,
        available: bool,
    }

    #[async_trait::async_trait]
    impl ImageProvider for FakeProvider {
        fn name(&self) -> &str {
            self.name
        }

        async fn generate(&self, _: &GenerateRequest) -> Result<GeneratedImage, ProviderError> {
            Err(ProviderError::MissingCredentials)
        }

        fn estimate_cost_cents(&self, _: &GenerateRequest) -> i32 {
            1
        }

        async fn is_available(&self) -> bool {
            self.available
        }

        async fn moderate_prompt(&self, _: &str) -> Result<ModerationVerdict, ProviderError> {
            Ok(ModerationVerdict::approve())
        }
    }

    fn registry(specs: &[(&'static str, bool)], default: &str) -> ProviderRegistry {
        let providers: Vec<Arc<dyn ImageProvider>> = specs
            .iter()
            .map(|&(name, available)| {
                Arc::new(FakeProvider { name, available }) as Arc<dyn ImageProvider>
            })
            .collect();
        ProviderRegistry::new(providers, default)
    }

    #[tokio::test]
    async fn unknown_name_falls_back_to_default() {
        let reg = registry(&[("openai", true), ("stability", true)], "stability");
        assert_eq!(reg.get_by_name("does-not-exist").name(), "stability");
    }

    #[tokio::test]
    async fn known_name_resolves_exactly() {
        let reg = registry(&[("openai", true), ("stability", true)], "openai");
        assert_eq!(reg.get_by_name("stability").name(), "stability");
    }

    #[tokio::test]
    async fn preferred_available_wins() {
        let reg = registry(&[("openai", true), ("stability", true)], "openai");
        let p = reg.get_available(Some("stability")).await;
        assert_eq!(p.name(), "stability");
    }

    #[tokio::test]
    async fn unavailable_preferred_scans_registration_order() {
        let reg = registry(&[("openai", false), ("stability", true)], "openai");
        let p = reg.get_available(Some("openai")).await;
        assert_eq!(p.name(), "stability");
    }

    #[tokio::test]
    async fn none_available_returns_default() {
        let reg = registry(&[("openai", false), ("stability", false)], "stability");
        let p = reg.get_available(None).await;
        assert_eq!(p.name(), "stability");
    }
}
