//! Smart query: multi-variation retrieval with optional answer synthesis

use super::hybrid::RetrievalEngine;
use super::{sort_results, QueryRequest, QueryResult};
use crate::error::Result;
use crate::llm::{Passage, SynthesizedAnswer};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Merged results across every query variation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmartQueryResult {
    pub results: Vec<QueryResult>,
    /// Every query text that was run, the original first
    pub variations: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<SynthesizedAnswer>,
}

impl RetrievalEngine {
    /// Expand the query, retrieve once per variation, and merge by chunk id
    /// keeping each chunk's best score.
    ///
    /// Without a query expander, or when expansion fails, only the original
    /// text is run. Variations that fail are skipped; the call fails only if
    /// every variation does. When `synthesize` is set and a synthesizer is
    /// configured, an answer citing merged chunk ids is attached.
    pub async fn smart_query(
        &self,
        request: &QueryRequest,
        synthesize: bool,
    ) -> Result<SmartQueryResult> {
        let variations = self.variations(&request.text).await;
        debug!(count = variations.len(), "Running query variations");

        let runs = join_all(variations.iter().map(|text| {
            let mut varied = request.clone();
            varied.text = text.clone();
            async move { self.query(&varied).await }
        }))
        .await;

        let mut merged: HashMap<String, QueryResult> = HashMap::new();
        let mut first_error = None;
        let mut succeeded = 0;
        for (text, run) in variations.iter().zip(runs) {
            match run {
                Ok(results) => {
                    succeeded += 1;
                    for result in results {
                        match merged.get(&result.chunk_id) {
                            Some(existing) if existing.score >= result.score => {}
                            _ => {
                                merged.insert(result.chunk_id.clone(), result);
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!(variation = %text, error = %e, "Query variation failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        if succeeded == 0 {
            if let Some(error) = first_error {
                return Err(error);
            }
        }

        let mut results: Vec<QueryResult> = merged.into_values().collect();
        sort_results(&mut results);
        results.truncate(request.top_k);

        let answer = if synthesize {
            self.synthesize(&request.text, &results).await
        } else {
            None
        };

        info!(
            variations = variations.len(),
            results = results.len(),
            answered = answer.is_some(),
            "Smart query complete"
        );

        Ok(SmartQueryResult {
            results,
            variations,
            answer,
        })
    }

    async fn variations(&self, query: &str) -> Vec<String> {
        let mut variations = vec![query.to_string()];
        let Some(expander) = &self.providers.expander else {
            return variations;
        };

        match expander.expand(query, None).await {
            Ok(expanded) => {
                for variation in expanded.variations() {
                    if !variations.contains(&variation) {
                        variations.push(variation);
                    }
                }
            }
            Err(e) => warn!(error = %e, "Query expansion failed, using original query"),
        }
        variations
    }

    async fn synthesize(&self, query: &str, results: &[QueryResult]) -> Option<SynthesizedAnswer> {
        let synthesizer = self.providers.synthesizer.as_ref()?;
        if results.is_empty() {
            return None;
        }

        let passages: Vec<Passage> = results
            .iter()
            .map(|r| Passage {
                chunk_id: r.chunk_id.clone(),
                locator: r.locator.clone(),
                text: r.text.clone(),
            })
            .collect();

        match synthesizer.synthesize(query, &passages).await {
            Ok(mut answer) => {
                answer
                    .citations
                    .retain(|id| results.iter().any(|r| &r.chunk_id == id));
                Some(answer)
            }
            Err(e) => {
                warn!(
                    model = synthesizer.model_name(),
                    error = %e,
                    "Answer synthesis failed"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetrievalConfig;
    use crate::db::{chunk_id, file_id, hash_content, IndexStore, MemoryStore};
    use crate::error::Error;
    use crate::llm::{AnswerSynthesizer, Embedder, ExpandedQuery, ProviderSet, QueryExpander};
    use crate::models::{Dataset, DenseKind, FileRecord, IndexedChunk, Scope};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Arc;

    /// One dimension per keyword
    struct KeywordEmbedder;

    fn keyword_vector(text: &str) -> Vec<f32> {
        ["login", "session", "cookie"]
            .iter()
            .map(|w| if text.contains(w) { 1.0 } else { 0.0 })
            .collect()
    }

    #[async_trait]
    impl Embedder for KeywordEmbedder {
        async fn embed_dense(&self, texts: &[String], _kind: DenseKind) -> Result<Vec<Vec<f32>>> {
            if texts.iter().any(|t| t.contains("explode")) {
                return Err(Error::EmbeddingProvider("boom".into()));
            }
            Ok(texts.iter().map(|t| keyword_vector(t)).collect())
        }

        fn model_name(&self) -> &str {
            "keyword"
        }
    }

    struct FixedExpander(Vec<String>);

    #[async_trait]
    impl QueryExpander for FixedExpander {
        async fn expand(&self, _query: &str, _context: Option<&str>) -> Result<ExpandedQuery> {
            Ok(ExpandedQuery {
                semantic: self.0.clone(),
                ..Default::default()
            })
        }

        fn model_name(&self) -> &str {
            "fixed"
        }
    }

    /// Cites the first passage plus an id that was never retrieved
    struct CitingSynthesizer;

    #[async_trait]
    impl AnswerSynthesizer for CitingSynthesizer {
        async fn synthesize(&self, _query: &str, passages: &[Passage]) -> Result<SynthesizedAnswer> {
            Ok(SynthesizedAnswer {
                text: format!("See {}", passages[0].locator),
                citations: vec![passages[0].chunk_id.clone(), "made-up".to_string()],
            })
        }

        fn model_name(&self) -> &str {
            "citing"
        }
    }

    async fn engine(providers: ProviderSet) -> RetrievalEngine {
        let store = Arc::new(MemoryStore::new());
        store
            .ensure_dataset(&Dataset::new("ds", "test", Scope::Local))
            .await
            .unwrap();
        for (path, text) in [("login.md", "login form"), ("session.md", "session cookie")] {
            let id = file_id("ds", path);
            let record = FileRecord {
                id: id.clone(),
                dataset_id: "ds".into(),
                path: path.into(),
                locator: format!("/docs/{}", path),
                hash: hash_content(text.as_bytes()),
                size: text.len() as u64,
                language: None,
                chunk_count: 1,
                complete: true,
                indexed_at: Utc::now(),
            };
            let chunk = IndexedChunk {
                id: chunk_id(&id, 0, text),
                file_id: id,
                dataset_id: "ds".into(),
                path: path.into(),
                index: 0,
                text: text.into(),
                start: 0,
                end: text.len(),
                overlap: 0,
                language: None,
                symbol: None,
                summary: None,
                dense: keyword_vector(text),
                code: None,
                sparse: None,
            };
            store.upsert_chunks(&record, &[chunk]).await.unwrap();
        }
        RetrievalEngine::new(store, providers, RetrievalConfig::default())
    }

    #[tokio::test]
    async fn test_variations_merge_by_max_score() {
        let providers = ProviderSet::new(Arc::new(KeywordEmbedder))
            .with_expander(Arc::new(FixedExpander(vec!["session cookie".into()])));
        let engine = engine(providers).await;

        let smart = engine
            .smart_query(&QueryRequest::new("login"), false)
            .await
            .unwrap();
        assert_eq!(smart.variations, vec!["login", "session cookie"]);
        assert_eq!(smart.results.len(), 2);
        // Each document is the best match for one variation; dense-only
        // fusion tops out at the dense weight
        assert!(smart.results.iter().all(|r| (r.score - 0.5).abs() < 1e-9));
        let ids: std::collections::HashSet<&str> =
            smart.results.iter().map(|r| r.chunk_id.as_str()).collect();
        assert_eq!(ids.len(), 2);
        assert!(smart.answer.is_none());
    }

    #[tokio::test]
    async fn test_failed_variation_is_skipped() {
        let providers = ProviderSet::new(Arc::new(KeywordEmbedder))
            .with_expander(Arc::new(FixedExpander(vec!["explode".into()])));
        let engine = engine(providers).await;

        let smart = engine
            .smart_query(&QueryRequest::new("login"), false)
            .await
            .unwrap();
        assert_eq!(smart.results[0].path, "login.md");
    }

    #[tokio::test]
    async fn test_all_variations_failing_is_an_error() {
        let engine = engine(ProviderSet::new(Arc::new(KeywordEmbedder))).await;
        let err = engine
            .smart_query(&QueryRequest::new("explode"), false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RetrievalUnavailable(_)));
    }

    #[tokio::test]
    async fn test_synthesis_cites_only_retrieved_chunks() {
        let providers = ProviderSet::new(Arc::new(KeywordEmbedder))
            .with_synthesizer(Arc::new(CitingSynthesizer));
        let engine = engine(providers).await;

        let smart = engine
            .smart_query(&QueryRequest::new("login"), true)
            .await
            .unwrap();
        let answer = smart.answer.unwrap();
        assert_eq!(answer.citations, vec![smart.results[0].chunk_id.clone()]);
        assert!(answer.text.contains("login.md"));
    }
}
