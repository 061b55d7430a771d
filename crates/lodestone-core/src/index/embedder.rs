//! Embedding orchestration
//!
//! Splits chunk texts into sub-batches, embeds them against the configured
//! provider with bounded concurrency and retries, and isolates failures to
//! the sub-batch they happened in. Output order always mirrors input order.

use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};
use crate::jobs::CancellationToken;
use crate::llm::Embedder;
use crate::models::{DenseKind, SparseVector};
use futures::stream::{self, StreamExt};
use std::future::Future;
use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Bounded exponential backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based): `base * 2^(attempt-1)`, capped
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

impl From<&EmbeddingConfig> for RetryPolicy {
    fn from(config: &EmbeddingConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_backoff: Duration::from_millis(config.base_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }
}

/// Vectors computed for one chunk
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkVectors {
    pub dense: Vec<f32>,
    pub code: Option<Vec<f32>>,
    pub sparse: Option<SparseVector>,
}

/// A sub-batch that could not be embedded
#[derive(Debug)]
pub struct BatchFailure {
    /// Input positions covered by the sub-batch
    pub range: Range<usize>,
    pub error: Error,
}

/// Result of embedding one batch of texts
#[derive(Debug, Default)]
pub struct EmbeddingOutput {
    /// One entry per input text; `None` where the sub-batch failed
    pub vectors: Vec<Option<ChunkVectors>>,
    /// Sub-batches whose required vectors failed after retries
    pub failures: Vec<BatchFailure>,
    /// Sub-batches indexed without sparse vectors
    pub sparse_failures: Vec<BatchFailure>,
}

impl EmbeddingOutput {
    pub fn failed_count(&self) -> usize {
        self.vectors.iter().filter(|v| v.is_none()).count()
    }
}

struct SubBatch {
    vectors: Vec<ChunkVectors>,
    sparse_error: Option<Error>,
}

/// Embeds chunk batches against one provider.
///
/// Clones share the same concurrency budget, so a single orchestrator
/// bounds in-flight calls across every job using it.
#[derive(Clone)]
pub struct EmbeddingOrchestrator {
    embedder: Arc<dyn Embedder>,
    permits: Arc<Semaphore>,
    max_concurrent: usize,
    batch_size: usize,
    retry: RetryPolicy,
    sparse: bool,
}

impl EmbeddingOrchestrator {
    pub fn new(embedder: Arc<dyn Embedder>, config: &EmbeddingConfig) -> Self {
        let max_concurrent = config.max_concurrent.max(1);
        Self {
            embedder,
            permits: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            batch_size: config.batch_size.max(1),
            retry: RetryPolicy::from(config),
            sparse: config.sparse,
        }
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// Whether code vectors can be produced at all
    pub fn supports_code(&self) -> bool {
        self.embedder.supports(DenseKind::Code)
    }

    /// Embed `texts`. Dense-text vectors are always computed; dense-code
    /// vectors when `code` is set and the provider has a code model; sparse
    /// vectors when enabled.
    ///
    /// Only cancellation is returned as an error. Provider failures are
    /// confined to their sub-batch and reported in the output.
    pub async fn embed(
        &self,
        texts: &[String],
        code: bool,
        cancel: &CancellationToken,
    ) -> Result<EmbeddingOutput> {
        if texts.is_empty() {
            return Ok(EmbeddingOutput::default());
        }

        let with_code = code && self.supports_code();
        let ranges: Vec<Range<usize>> = (0..texts.len())
            .step_by(self.batch_size)
            .map(|start| start..(start + self.batch_size).min(texts.len()))
            .collect();
        let total_batches = ranges.len();

        debug!(
            texts = texts.len(),
            batches = total_batches,
            concurrent = self.max_concurrent,
            "Embedding chunk batch"
        );

        let mut results: Vec<(usize, Range<usize>, Result<SubBatch>)> = stream::iter(ranges)
            .enumerate()
            .map(|(idx, range)| async move {
                let result = self.embed_sub_batch(&texts[range.clone()], with_code, cancel).await;
                (idx, range, result)
            })
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await;

        // Sort results by original order
        results.sort_by_key(|(idx, _, _)| *idx);

        let mut output = EmbeddingOutput {
            vectors: Vec::with_capacity(texts.len()),
            ..Default::default()
        };
        for (_, range, result) in results {
            match result {
                Ok(batch) => {
                    output.vectors.extend(batch.vectors.into_iter().map(Some));
                    if let Some(error) = batch.sparse_error {
                        output.sparse_failures.push(BatchFailure { range, error });
                    }
                }
                Err(Error::Cancelled(reason)) => return Err(Error::Cancelled(reason)),
                Err(error) => {
                    warn!(
                        batch = ?range,
                        error = %error,
                        "Sub-batch failed after retries, excluding its chunks"
                    );
                    output.vectors.extend(range.clone().map(|_| None));
                    output.failures.push(BatchFailure { range, error });
                }
            }
        }

        Ok(output)
    }

    async fn embed_sub_batch(
        &self,
        texts: &[String],
        with_code: bool,
        cancel: &CancellationToken,
    ) -> Result<SubBatch> {
        let dense = self
            .with_retry("dense_text", cancel, || self.embedder.embed_dense(texts, DenseKind::Text))
            .await
            .and_then(|v| expect_len(v, texts.len()))
            .map_err(as_provider_error)?;

        let code = if with_code {
            let vectors = self
                .with_retry("dense_code", cancel, || self.embedder.embed_dense(texts, DenseKind::Code))
                .await
                .and_then(|v| expect_len(v, texts.len()))
                .map_err(as_provider_error)?;
            Some(vectors)
        } else {
            None
        };

        let (sparse, sparse_error) = if self.sparse && self.embedder.supports_sparse() {
            match self
                .with_retry("sparse", cancel, || self.embedder.embed_sparse(texts))
                .await
                .and_then(|v| expect_len(v, texts.len()))
            {
                Ok(vectors) => (Some(vectors), None),
                Err(Error::Cancelled(reason)) => return Err(Error::Cancelled(reason)),
                Err(e) => {
                    warn!(error = %e, "Sparse encoding failed, indexing without sparse vectors");
                    (None, Some(Error::SparseUnavailable(e.to_string())))
                }
            }
        } else {
            (None, None)
        };

        let mut code = code.map(Vec::into_iter);
        let mut sparse = sparse.map(Vec::into_iter);
        let vectors = dense
            .into_iter()
            .map(|dense| ChunkVectors {
                dense,
                code: code.as_mut().and_then(Iterator::next),
                sparse: sparse.as_mut().and_then(Iterator::next),
            })
            .collect();

        Ok(SubBatch {
            vectors,
            sparse_error,
        })
    }

    /// Run `call` until it succeeds, fails with a non-retryable error, or
    /// exhausts the attempt budget. Each attempt holds one provider permit;
    /// backoff sleeps do not.
    async fn with_retry<T, F, Fut>(
        &self,
        what: &'static str,
        cancel: &CancellationToken,
        mut call: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            cancel.check()?;
            attempt += 1;

            let result = {
                let _permit = self
                    .permits
                    .acquire()
                    .await
                    .map_err(|e| Error::EmbeddingProvider(e.to_string()))?;
                cancel.check()?;
                call().await
            };

            match result {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.backoff(attempt);
                    warn!(
                        call = what,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Provider call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn expect_len<T>(vectors: Vec<T>, expected: usize) -> Result<Vec<T>> {
    if vectors.len() == expected {
        Ok(vectors)
    } else {
        Err(Error::EmbeddingProvider(format!(
            "provider returned {} vectors for {} inputs",
            vectors.len(),
            expected
        )))
    }
}

fn as_provider_error(error: Error) -> Error {
    match error {
        Error::EmbeddingProvider(_) | Error::Cancelled(_) => error,
        other => Error::EmbeddingProvider(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LexicalEncoder;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Embeds "t<N>" as [N]; fails per configured rules
    #[derive(Default)]
    struct ScriptedEmbedder {
        /// Text that makes every call containing it fail
        poison: Option<String>,
        /// Remaining transient failures before calls succeed
        transient: AtomicUsize,
        non_retryable: bool,
        sparse_fails: bool,
        code: bool,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        seen_kinds: Mutex<HashMap<&'static str, usize>>,
    }

    #[async_trait]
    impl Embedder for ScriptedEmbedder {
        async fn embed_dense(&self, texts: &[String], kind: DenseKind) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.seen_kinds.lock().unwrap().entry(kind.as_str()).or_insert(0) += 1;

            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.non_retryable {
                return Err(Error::InvalidInput("bad request".into()));
            }
            if self
                .transient
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(Error::ExternalError("HTTP 429".into()));
            }
            if let Some(ref poison) = self.poison {
                if texts.iter().any(|t| t == poison) {
                    return Err(Error::ExternalError("HTTP 500".into()));
                }
            }
            Ok(texts
                .iter()
                .map(|t| vec![t.trim_start_matches('t').parse::<f32>().unwrap_or(-1.0)])
                .collect())
        }

        async fn embed_sparse(&self, texts: &[String]) -> Result<Vec<SparseVector>> {
            if self.sparse_fails {
                return Err(Error::ExternalError("sparse down".into()));
            }
            Ok(LexicalEncoder.encode_batch(texts))
        }

        fn supports(&self, kind: DenseKind) -> bool {
            kind == DenseKind::Text || self.code
        }

        fn supports_sparse(&self) -> bool {
            true
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    fn config(batch_size: usize, max_concurrent: usize) -> EmbeddingConfig {
        EmbeddingConfig {
            batch_size,
            max_concurrent,
            max_attempts: 3,
            base_backoff_ms: 10,
            max_backoff_ms: 40,
            sparse: true,
        }
    }

    fn texts(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("t{}", i)).collect()
    }

    #[test]
    fn test_backoff_is_bounded_exponential() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(350),
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(350));
        assert_eq!(policy.backoff(40), Duration::from_millis(350));
    }

    #[tokio::test(start_paused = true)]
    async fn test_output_order_mirrors_input() {
        let embedder = Arc::new(ScriptedEmbedder::default());
        let orchestrator = EmbeddingOrchestrator::new(embedder, &config(7, 4));
        let out = orchestrator
            .embed(&texts(50), false, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(out.vectors.len(), 50);
        for (i, v) in out.vectors.iter().enumerate() {
            let v = v.as_ref().unwrap();
            assert_eq!(v.dense, vec![i as f32]);
            assert!(v.sparse.is_some());
            assert!(v.code.is_none());
        }
        assert!(out.failures.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_sub_batch_is_isolated() {
        let embedder = Arc::new(ScriptedEmbedder {
            poison: Some("t37".into()),
            ..Default::default()
        });
        let orchestrator = EmbeddingOrchestrator::new(embedder.clone(), &config(10, 3));
        let out = orchestrator
            .embed(&texts(100), false, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(out.failures.len(), 1);
        assert_eq!(out.failures[0].range, 30..40);
        assert_eq!(out.failed_count(), 10);
        assert!(out.vectors[29].is_some());
        assert!(out.vectors[30..40].iter().all(Option::is_none));
        assert_eq!(out.vectors[40].as_ref().unwrap().dense, vec![40.0]);
        // 9 healthy batches once, poisoned batch three times
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 12);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_are_retried() {
        let embedder = Arc::new(ScriptedEmbedder {
            transient: AtomicUsize::new(2),
            ..Default::default()
        });
        let orchestrator = EmbeddingOrchestrator::new(embedder.clone(), &config(32, 1));
        let out = orchestrator
            .embed(&texts(5), false, &CancellationToken::new())
            .await
            .unwrap();
        assert!(out.failures.is_empty());
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_fails_fast() {
        let embedder = Arc::new(ScriptedEmbedder {
            non_retryable: true,
            ..Default::default()
        });
        let orchestrator = EmbeddingOrchestrator::new(embedder.clone(), &config(32, 1));
        let out = orchestrator
            .embed(&texts(3), false, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out.failures.len(), 1);
        assert_eq!(out.failures[0].error.kind(), "embedding_provider");
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_is_bounded() {
        let embedder = Arc::new(ScriptedEmbedder::default());
        let orchestrator = EmbeddingOrchestrator::new(embedder.clone(), &config(2, 3));
        let cancel = CancellationToken::new();

        let a = orchestrator.clone();
        let b = orchestrator.clone();
        let (ta, tb) = (texts(40), texts(40));
        let (ra, rb) = tokio::join!(a.embed(&ta, false, &cancel), b.embed(&tb, false, &cancel));
        assert!(ra.is_ok() && rb.is_ok());
        assert!(embedder.max_in_flight.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_code_vectors_when_requested_and_supported() {
        let embedder = Arc::new(ScriptedEmbedder {
            code: true,
            ..Default::default()
        });
        let orchestrator = EmbeddingOrchestrator::new(embedder.clone(), &config(4, 2));
        let out = orchestrator
            .embed(&texts(6), true, &CancellationToken::new())
            .await
            .unwrap();
        assert!(out.vectors.iter().all(|v| v.as_ref().unwrap().code.is_some()));
        assert_eq!(embedder.seen_kinds.lock().unwrap()["code"], 2);

        let out = orchestrator
            .embed(&texts(6), false, &CancellationToken::new())
            .await
            .unwrap();
        assert!(out.vectors.iter().all(|v| v.as_ref().unwrap().code.is_none()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sparse_failure_degrades() {
        let embedder = Arc::new(ScriptedEmbedder {
            sparse_fails: true,
            ..Default::default()
        });
        let orchestrator = EmbeddingOrchestrator::new(embedder, &config(4, 2));
        let out = orchestrator
            .embed(&texts(8), false, &CancellationToken::new())
            .await
            .unwrap();
        assert!(out.failures.is_empty());
        assert_eq!(out.sparse_failures.len(), 2);
        assert!(out.vectors.iter().all(|v| v.as_ref().unwrap().sparse.is_none()));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let embedder = Arc::new(ScriptedEmbedder::default());
        let orchestrator = EmbeddingOrchestrator::new(embedder.clone(), &config(4, 2));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = orchestrator.embed(&texts(8), false, &cancel).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled(_)));
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let orchestrator =
            EmbeddingOrchestrator::new(Arc::new(ScriptedEmbedder::default()), &config(4, 2));
        let out = orchestrator.embed(&[], true, &CancellationToken::new()).await.unwrap();
        assert!(out.vectors.is_empty());
    }
}
