use ollama_rs::generation::completion::request::GenerationRequest;
use ollama_rs::generation::options::GenerationOptions;
use ollama_rs::Ollama;
use thiserror::Error;
use tokio::time::{timeout, Duration};
use tracing::{debug, warn};

use crate::TARGET_LLM_REQUEST;

const DEFAULT_OLLAMA_PORT: u16 = 11434;

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("invalid Ollama url '{0}'")]
    InvalidUrl(String),

    #[error("Ollama request failed: {0}")]
    Backend(String),

    #[error("Ollama request timed out after {0:?}")]
    Timeout(Duration),
}

/// Sampling settings for one request.
#[derive(Debug, Clone, Copy)]
pub struct GenerationParams {
    pub temperature: f32,
    pub num_predict: i32,
}

/// Non-streaming text generation against one Ollama model.
#[derive(Clone, Debug)]
pub struct OllamaGenerator {
    ollama: Ollama,
    model: String,
    timeout: Duration,
}

/// Splits `http://host:port` into what `Ollama::new` wants.
pub fn ollama_endpoint(base_url: &str) -> Result<(String, u16), GenerationError> {
    let url =
        url::Url::parse(base_url).map_err(|_| GenerationError::InvalidUrl(base_url.to_string()))?;
    let host = url
        .host_str()
        .ok_or_else(|| GenerationError::InvalidUrl(base_url.to_string()))?;
    let host_with_scheme = format!("{}://{}", url.scheme(), host);
    let port = url.port().unwrap_or(DEFAULT_OLLAMA_PORT);
    Ok((host_with_scheme, port))
}

impl OllamaGenerator {
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Result<Self, GenerationError> {
        let (host, port) = ollama_endpoint(base_url)?;
        Ok(Self {
            ollama: Ollama::new(host, port),
            model: model.to_string(),
            timeout,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// One generation request; the raw response text, untrimmed.
    pub async fn generate(
        &self,
        prompt: &str,
        params: GenerationParams,
    ) -> Result<String, GenerationError> {
        let mut request = GenerationRequest::new(self.model.clone(), prompt.to_string());
        request.options = Some(
            GenerationOptions::default()
                .temperature(params.temperature)
                .num_predict(params.num_predict),
        );

        debug!(target: TARGET_LLM_REQUEST, "Sending LLM request to {} ({} chars of prompt)", self.model, prompt.chars().count());

        match timeout(self.timeout, self.ollama.generate(request)).await {
            Ok(Ok(response)) => {
                debug!(target: TARGET_LLM_REQUEST, "LLM response received: {}", response.response);
                Ok(response.response)
            }
            Ok(Err(e)) => {
                warn!(target: TARGET_LLM_REQUEST, "Error generating response: {}", e);
                Err(GenerationError::Backend(e.to_string()))
            }
            Err(_) => {
                warn!(target: TARGET_LLM_REQUEST, "LLM request timed out after {:?}", self.timeout);
                Err(GenerationError::Timeout(self.timeout))
            }
        }
    }

    /// Whether the server answers its model listing within `limit`.
    pub async fn is_available(&self, limit: Duration) -> bool {
        match timeout(limit, self.ollama.list_local_models()).await {
            Ok(Ok(models)) => {
                debug!(target: TARGET_LLM_REQUEST, "Ollama is up with {} local models", models.len());
                true
            }
            Ok(Err(e)) => {
                warn!(target: TARGET_LLM_REQUEST, "Ollama is not available: {}", e);
                false
            }
            Err(_) => {
                warn!(target: TARGET_LLM_REQUEST, "Ollama availability check timed out after {:?}", limit);
                false
            }
        }
    }
}
