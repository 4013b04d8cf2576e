//! HTTP implementation of [`InferenceClient`]

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

use crate::config::InferenceConfig;
use crate::error::{EmrysError, Result};
use crate::inference::types::{ChatResponseWire, ErrorBody, GroupResponseWire};
use crate::inference::{
    ChatOutcome, ChatRequest, GroupChatRequest, GroupOutcome, InferenceClient, Reflection,
    ReflectionRequest, SynthesisRequest,
};

/// Client for the inference backend's JSON API
///
/// No request timeout is applied unless `inference.timeout_seconds` is set;
/// a hung request keeps the caller waiting until the backend answers.
///
/// # Examples
///
/// ```no_run
/// use emrys::config::InferenceConfig;
/// use emrys::inference::{ApiKey, ChatRequest, HttpInferenceClient, InferenceClient};
///
/// # async fn example() -> emrys::error::Result<()> {
/// let client = HttpInferenceClient::new(&InferenceConfig::default())?;
/// let outcome = client
///     .send_chat(&ChatRequest {
///         user_id: "u1".to_string(),
///         persona_id: "p1".to_string(),
///         message: "Hello".to_string(),
///         api_key: ApiKey::new("sk-or-example"),
///     })
///     .await?;
/// println!("{:?}", outcome);
/// # Ok(())
/// # }
/// ```
pub struct HttpInferenceClient {
    client: Client,
    base_url: String,
}

impl HttpInferenceClient {
    /// Create a new client
    ///
    /// # Errors
    ///
    /// Returns error if HTTP client initialization fails
    pub fn new(config: &InferenceConfig) -> Result<Self> {
        let mut builder = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("emrys/", env!("CARGO_PKG_VERSION")));
        if let Some(secs) = config.timeout_seconds {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder
            .build()
            .map_err(|e| EmrysError::Inference(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Posts `body` and returns the status and raw response text
    async fn post<B: Serialize>(&self, path: &str, body: &B) -> Result<(StatusCode, String)> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!("POST {}", url);

        let response = self.client.post(&url).json(body).send().await.map_err(|e| {
            tracing::error!("Inference request to {} failed: {}", path, e);
            EmrysError::Inference(format!("Request to {} failed: {}", path, e))
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            tracing::error!("Failed to read inference response from {}: {}", path, e);
            EmrysError::Inference(format!("Failed to read response from {}: {}", path, e))
        })?;
        Ok((status, text))
    }

    /// Extracts the backend's `{error}` message from a non-success body
    fn backend_error(path: &str, status: StatusCode, text: &str) -> Option<String> {
        tracing::error!("Inference backend {} returned {}: {}", path, status, text);
        serde_json::from_str::<ErrorBody>(text)
            .ok()
            .map(|body| body.error)
            .filter(|e| !e.trim().is_empty())
    }

    fn parse<T: DeserializeOwned>(path: &str, text: &str) -> Result<T> {
        serde_json::from_str(text).map_err(|e| {
            tracing::error!("Failed to parse inference response from {}: {}", path, e);
            EmrysError::Inference(format!("Unexpected response from {}: {}", path, e)).into()
        })
    }

    /// Posts to an endpoint whose failures are always `Err`
    async fn call<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let (status, text) = self.post(path, body).await?;
        if !status.is_success() {
            let message = Self::backend_error(path, status, &text)
                .unwrap_or_else(|| format!("{} returned {}", path, status));
            return Err(EmrysError::Inference(message).into());
        }
        if let Ok(body) = serde_json::from_str::<ErrorBody>(&text) {
            return Err(EmrysError::Inference(body.error).into());
        }
        Self::parse(path, &text)
    }
}

#[async_trait]
impl InferenceClient for HttpInferenceClient {
    async fn send_chat(&self, request: &ChatRequest) -> Result<ChatOutcome> {
        const PATH: &str = "/api/chat/send";
        let (status, text) = self.post(PATH, request).await?;
        if !status.is_success() {
            return match Self::backend_error(PATH, status, &text) {
                Some(message) => Ok(ChatOutcome::Failed { message }),
                None => Err(EmrysError::Inference(format!("{} returned {}", PATH, status)).into()),
            };
        }
        let wire: ChatResponseWire = Self::parse(PATH, &text)?;
        Ok(wire.validate())
    }

    async fn send_group(&self, request: &GroupChatRequest) -> Result<GroupOutcome> {
        const PATH: &str = "/api/chat/group/send";
        let (status, text) = self.post(PATH, request).await?;
        if !status.is_success() {
            return match Self::backend_error(PATH, status, &text) {
                Some(message) => Ok(GroupOutcome::Failed { message }),
                None => Err(EmrysError::Inference(format!("{} returned {}", PATH, status)).into()),
            };
        }
        let wire: GroupResponseWire = Self::parse(PATH, &text)?;
        Ok(wire.validate())
    }

    async fn synthesize_persona(&self, request: &SynthesisRequest) -> Result<serde_json::Value> {
        let value: serde_json::Value = self.call("/api/persona/synthesize", request).await?;
        if !value.is_object() {
            return Err(EmrysError::Inference(
                "Synthesis returned something other than an object".to_string(),
            )
            .into());
        }
        Ok(value)
    }

    async fn reflect(&self, request: &ReflectionRequest) -> Result<Reflection> {
        self.call("/api/life/reflect", request).await
    }
}
