//! HTTP-based query expander using external LLM service

use super::client::extract_json;
use super::{ChatMessage, ExpandedQuery, HttpLLMClient, LLMClient, QueryExpander};
use crate::config::LLMServiceConfig;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Query expander using external HTTP LLM service
pub struct HttpQueryExpander {
    client: Arc<dyn LLMClient>,
}

impl HttpQueryExpander {
    /// Create from LLM client
    pub fn new(client: Arc<dyn LLMClient>) -> Self {
        Self { client }
    }

    /// Create from configuration
    pub fn from_config(config: &LLMServiceConfig) -> Result<Self> {
        let client = HttpLLMClient::new(config.clone())?;
        Ok(Self::new(Arc::new(client)))
    }
}

#[async_trait]
impl QueryExpander for HttpQueryExpander {
    async fn expand(&self, query: &str, context: Option<&str>) -> Result<ExpandedQuery> {
        let prompt = build_expansion_prompt(query, context);

        let messages = vec![
            ChatMessage::system(
                "You are a search query expansion expert for a code and documentation index. \
                 Output ONLY valid JSON with these fields: \
                 lexical (array of strings), semantic (array of strings), hyde (string or null)",
            ),
            ChatMessage::user(prompt),
        ];

        let response = self.client.chat_completion(messages).await?;

        Ok(parse_expansion_response(&response))
    }

    fn model_name(&self) -> &str {
        self.client.model_name()
    }
}

fn build_expansion_prompt(query: &str, context: Option<&str>) -> String {
    let context_info = context
        .map(|c| format!("\n\nContext: {}", c))
        .unwrap_or_default();

    format!(
        r#"Expand this search query to improve recall over source code and documentation:

Query: "{}"{}

Generate query variations:
1. Lexical variations: identifiers, synonyms, abbreviations (for keyword matching)
2. Semantic variations: rephrased questions (for vector search)
3. HyDE (optional): a short hypothetical passage or code comment that answers the query

Output JSON with:
- lexical: array of 2-4 keyword variations
- semantic: array of 2-4 semantic variations
- hyde: hypothetical passage (50-150 words) or null

Example:

Input: "retry failed uploads"
Output: {{
  "lexical": ["retry upload", "backoff", "max_attempts"],
  "semantic": ["how are failed uploads retried", "upload retry policy with backoff"],
  "hyde": "Uploads that fail with a transient error are retried with exponential backoff up to a configured number of attempts."
}}

Now expand the query above. Output only JSON:"#,
        query, context_info
    )
}

/// Malformed output degrades to an empty expansion rather than an error
fn parse_expansion_response(response: &str) -> ExpandedQuery {
    let Some(json_str) = extract_json(response) else {
        return ExpandedQuery::default();
    };

    match serde_json::from_str::<ExpandedQuery>(json_str) {
        Ok(mut expanded) => {
            expanded.hyde = expanded.hyde.filter(|s| !s.trim().is_empty());
            expanded
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to parse expansion JSON, using empty expansion");
            tracing::debug!("Raw LLM response: {}", response);
            ExpandedQuery::default()
        }
    }
}
