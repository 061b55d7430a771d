//! Answer synthesis over retrieved passages

use super::{AnswerSynthesizer, ChatMessage, HttpLLMClient, LLMClient, Passage, SynthesizedAnswer};
use crate::config::LLMServiceConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Passages beyond this many are not shown to the model
const MAX_PASSAGES: usize = 8;
const MAX_PASSAGE_CHARS: usize = 1500;

/// Synthesizer that prompts a chat model with numbered passages
pub struct HttpAnswerSynthesizer {
    client: Arc<dyn LLMClient>,
}

impl HttpAnswerSynthesizer {
    pub fn new(client: Arc<dyn LLMClient>) -> Self {
        Self { client }
    }

    pub fn from_config(config: &LLMServiceConfig) -> Result<Self> {
        let client = HttpLLMClient::new(config.clone())?;
        Ok(Self::new(Arc::new(client)))
    }
}

#[async_trait]
impl AnswerSynthesizer for HttpAnswerSynthesizer {
    async fn synthesize(&self, query: &str, passages: &[Passage]) -> Result<SynthesizedAnswer> {
        if passages.is_empty() {
            return Err(Error::InvalidInput(
                "No passages to synthesize from".to_string(),
            ));
        }
        let shown = &passages[..passages.len().min(MAX_PASSAGES)];

        let messages = vec![
            ChatMessage::system(
                "Answer the question using only the numbered passages. \
                 Cite passages inline as [n]. If the passages do not contain the answer, say so.",
            ),
            ChatMessage::user(build_prompt(query, shown)),
        ];

        let text = self.client.chat_completion(messages).await?;
        let citations = extract_citations(&text, shown);
        Ok(SynthesizedAnswer { text, citations })
    }

    fn model_name(&self) -> &str {
        self.client.model_name()
    }
}

fn build_prompt(query: &str, passages: &[Passage]) -> String {
    let mut prompt = format!("Question: {}\n\nPassages:\n", query);
    for (i, passage) in passages.iter().enumerate() {
        let text = if passage.text.len() > MAX_PASSAGE_CHARS {
            let mut end = MAX_PASSAGE_CHARS;
            while !passage.text.is_char_boundary(end) {
                end -= 1;
            }
            &passage.text[..end]
        } else {
            &passage.text
        };
        prompt.push_str(&format!("[{}] ({})\n{}\n\n", i + 1, passage.locator, text));
    }
    prompt.push_str("Answer:");
    prompt
}

/// Chunk ids for every `[n]` marker that names a shown passage, first
/// citation first, without duplicates
fn extract_citations(answer: &str, passages: &[Passage]) -> Vec<String> {
    let mut citations: Vec<String> = Vec::new();
    let mut rest = answer;
    while let Some(open) = rest.find('[') {
        rest = &rest[open + 1..];
        let Some(close) = rest.find(']') else { break };
        for part in rest[..close].split(',') {
            if let Ok(n) = part.trim().parse::<usize>() {
                if let Some(p) = n.checked_sub(1).and_then(|i| passages.get(i)) {
                    if !citations.contains(&p.chunk_id) {
                        citations.push(p.chunk_id.clone());
                    }
                }
            }
        }
        rest = &rest[close + 1..];
    }
    citations
}
