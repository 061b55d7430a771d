//! HTTP client for OpenAI-compatible inference services (vLLM, TEI, OpenAI)

use crate::config::LLMServiceConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Trait for LLM service clients
#[async_trait]
pub trait LLMClient: Send + Sync {
    /// Generate chat completion
    async fn chat_completion(&self, messages: Vec<ChatMessage>) -> Result<String>;

    /// Embed a batch of texts with the given model, in input order
    async fn embed_batch(&self, model: &str, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Relevance scores as `(document index, score)` pairs
    async fn rerank(&self, model: &str, query: &str, documents: &[String]) -> Result<Vec<(usize, f64)>>;

    /// Chat model name
    fn model_name(&self) -> &str;
}

/// Chat message for completion requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// API metrics for monitoring
#[derive(Debug, Default)]
pub struct APIMetrics {
    pub total_requests: AtomicU64,
    pub total_errors: AtomicU64,
    pub total_latency_ms: AtomicU64,
}

/// Snapshot of API metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub total_errors: u64,
    pub avg_latency_ms: f64,
}

/// OpenAI-compatible HTTP client
pub struct HttpLLMClient {
    http_client: reqwest::Client,
    config: LLMServiceConfig,
    metrics: Arc<APIMetrics>,
}

impl HttpLLMClient {
    /// Create new client from configuration
    pub fn new(config: LLMServiceConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http_client,
            config,
            metrics: Arc::new(APIMetrics::default()),
        })
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(LLMServiceConfig::default())
    }

    pub fn config(&self) -> &LLMServiceConfig {
        &self.config
    }

    /// Get current API metrics
    pub fn metrics(&self) -> MetricsSnapshot {
        let total = self.metrics.total_requests.load(Ordering::Relaxed);
        MetricsSnapshot {
            total_requests: total,
            total_errors: self.metrics.total_errors.load(Ordering::Relaxed),
            avg_latency_ms: if total > 0 {
                self.metrics.total_latency_ms.load(Ordering::Relaxed) as f64 / total as f64
            } else {
                0.0
            },
        }
    }

    /// POST `body` as JSON and decode a JSON response. Non-2xx statuses map
    /// to `ExternalError` so the retry policy can inspect them.
    async fn post_json<Req, Resp>(&self, url: &str, body: &Req, service: &str) -> Result<Resp>
    where
        Req: Serialize + Sync,
        Resp: for<'de> Deserialize<'de> + Send,
    {
        let start = Instant::now();
        self.metrics.total_requests.fetch_add(1, Ordering::Relaxed);

        let mut req = self.http_client.post(url).json(body);
        if let Some(ref api_key) = self.config.api_key {
            req = req.header("Authorization", format!("Bearer {}", api_key));
        }

        let result = async {
            let response = req.send().await?;
            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(Error::ExternalError(format!(
                    "{} service error (HTTP {}): {}",
                    service, status, body
                )));
            }
            Ok(response.json::<Resp>().await?)
        }
        .await;

        if result.is_err() {
            self.metrics.total_errors.fetch_add(1, Ordering::Relaxed);
        }
        self.metrics
            .total_latency_ms
            .fetch_add(start.elapsed().as_millis() as u64, Ordering::Relaxed);

        result
    }
}

#[async_trait]
impl LLMClient for HttpLLMClient {
    async fn chat_completion(&self, messages: Vec<ChatMessage>) -> Result<String> {
        #[derive(Serialize)]
        struct ChatRequest {
            model: String,
            messages: Vec<ChatMessage>,
            temperature: f32,
            max_tokens: u32,
        }

        #[derive(Deserialize)]
        struct ChatResponse {
            choices: Vec<ChatChoice>,
        }

        #[derive(Deserialize)]
        struct ChatChoice {
            message: ChatMessage,
        }

        let request = ChatRequest {
            model: self.config.model.clone(),
            messages,
            temperature: 0.2,
            max_tokens: 768,
        };

        let url = format!("{}/v1/chat/completions", self.config.url);
        let response: ChatResponse = self.post_json(&url, &request, "LLM").await?;

        response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| Error::Llm("No response from LLM".to_string()))
    }

    async fn embed_batch(&self, model: &str, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        #[derive(Serialize)]
        struct EmbedRequest<'a> {
            model: &'a str,
            input: &'a [String],
        }

        #[derive(Deserialize)]
        struct EmbedResponse {
            data: Vec<EmbedData>,
        }

        #[derive(Deserialize)]
        struct EmbedData {
            #[serde(default)]
            index: Option<usize>,
            embedding: Vec<f32>,
        }

        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/v1/embeddings", self.config.embeddings_url());
        let response: EmbedResponse = self
            .post_json(&url, &EmbedRequest { model, input: texts }, "Embedding")
            .await?;

        if response.data.len() != texts.len() {
            return Err(Error::EmbeddingProvider(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                response.data.len()
            )));
        }

        // Services may return items out of order; restore input order by index
        let mut data = response.data;
        if data.iter().all(|d| d.index.is_some()) {
            data.sort_by_key(|d| d.index);
        }
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }

    async fn rerank(&self, model: &str, query: &str, documents: &[String]) -> Result<Vec<(usize, f64)>> {
        #[derive(Serialize)]
        struct RerankRequest<'a> {
            model: &'a str,
            query: &'a str,
            documents: &'a [String],
        }

        #[derive(Deserialize)]
        struct RerankResponse {
            results: Vec<RerankItem>,
        }

        #[derive(Deserialize)]
        struct RerankItem {
            index: usize,
            relevance_score: f64,
        }

        let url = format!("{}/v1/rerank", self.config.reranker_url());
        let request = RerankRequest {
            model,
            query,
            documents,
        };
        let response: RerankResponse = self.post_json(&url, &request, "Rerank").await?;

        Ok(response
            .results
            .into_iter()
            .filter(|r| r.index < documents.len())
            .map(|r| (r.index, r.relevance_score))
            .collect())
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

/// Extract the outermost JSON object from an LLM response (tolerates
/// markdown fences and surrounding prose)
pub(crate) fn extract_json(response: &str) -> Option<&str> {
    let start = response.find('{')?;
    let end = response.rfind('}')?;
    (end > start).then(|| &response[start..=end])
}
