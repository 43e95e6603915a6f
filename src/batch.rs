//! Batch runner: many images, one report.
//!
//! ## Failure isolation
//!
//! Each image is its own failure boundary. A provider error, a schema
//! violation or an unreadable file becomes a failed [`ItemOutcome`] and the
//! runner moves on; only an empty batch is fatal.
//!
//! ## Per-item pipeline
//!
//! ```text
//! load (paths only) ──▶ timeout( retry( agent.extract ) ) ──▶ observer ──▶ ItemOutcome
//! ```
//!
//! The timeout bounds the whole attempt sequence, retries included.
//!
//! ## Concurrency
//!
//! `concurrency = 1` processes images strictly one after another. Larger
//! values run a bounded pool (`buffered`), which still yields outcomes in
//! input order. Use [`crate::stream::extract_stream`] to receive outcomes in
//! completion order instead.

use crate::agent::ExtractionAgent;
use crate::config::ExtractionConfig;
use crate::error::{ExtractError, ProviderError};
use crate::input::ImageInput;
use crate::output::{BatchReport, ItemOutcome};
use crate::progress::{NoopObserver, SharedObserver};
use crate::retry::RetryPolicy;
use futures::stream::{self, StreamExt};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// One unit of work: an in-memory image or a file still to be read.
#[derive(Debug, Clone)]
pub(crate) enum ItemSource {
    Image(ImageInput),
    Path(PathBuf),
}

impl ItemSource {
    fn id(&self) -> String {
        match self {
            ItemSource::Image(image) => image.id.clone(),
            ItemSource::Path(path) => path.display().to_string(),
        }
    }

    async fn load(self) -> Result<ImageInput, ExtractError> {
        match self {
            ItemSource::Image(image) => Ok(image),
            ItemSource::Path(path) => Ok(ImageInput::load(&path).await?),
        }
    }
}

/// Runs an [`ExtractionAgent`] over a batch of images.
#[derive(Clone)]
pub struct BatchRunner {
    agent: Arc<ExtractionAgent>,
    retry: RetryPolicy,
    concurrency: usize,
    item_timeout: Duration,
    observer: SharedObserver,
}

impl BatchRunner {
    /// Runner with retry, concurrency and timeout taken from `config`.
    pub fn new(agent: Arc<ExtractionAgent>, config: &ExtractionConfig) -> Self {
        Self {
            agent,
            retry: config.retry_policy(),
            concurrency: config.concurrency.max(1),
            item_timeout: Duration::from_secs(config.item_timeout_secs.max(1)),
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn with_observer(mut self, observer: SharedObserver) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Override the per-item deadline (retries included).
    pub fn with_item_timeout(mut self, timeout: Duration) -> Self {
        self.item_timeout = timeout;
        self
    }

    pub fn agent(&self) -> &ExtractionAgent {
        &self.agent
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Process in-memory images.
    ///
    /// # Errors
    /// Only [`ExtractError::EmptyBatch`]. Per-item failures are reported in
    /// the returned [`BatchReport`].
    pub async fn run(&self, images: Vec<ImageInput>) -> Result<BatchReport, ExtractError> {
        self.run_sources(images.into_iter().map(ItemSource::Image).collect())
            .await
    }

    /// Process image files. Each file is read inside its own item boundary,
    /// so an unreadable file fails that item only.
    pub async fn run_paths(&self, paths: Vec<PathBuf>) -> Result<BatchReport, ExtractError> {
        self.run_sources(paths.into_iter().map(ItemSource::Path).collect())
            .await
    }

    /// Synchronous wrapper around [`run`](Self::run).
    ///
    /// Creates a temporary tokio runtime internally.
    pub fn run_sync(&self, images: Vec<ImageInput>) -> Result<BatchReport, ExtractError> {
        tokio::runtime::Runtime::new()
            .map_err(|e| ExtractError::Internal(format!("Failed to create tokio runtime: {}", e)))?
            .block_on(self.run(images))
    }

    async fn run_sources(&self, sources: Vec<ItemSource>) -> Result<BatchReport, ExtractError> {
        if sources.is_empty() {
            return Err(ExtractError::EmptyBatch);
        }

        let start = Instant::now();
        let total = sources.len();
        info!(
            "Starting batch: {} image(s), model {}, concurrency {}",
            total,
            self.agent.model_id(),
            self.concurrency
        );
        self.observer.on_batch_start(total);

        let outcomes = if self.concurrency <= 1 {
            self.process_sequential(sources).await
        } else {
            self.process_concurrent(sources).await
        };

        let report = BatchReport {
            outcomes,
            model: self.agent.model_id().to_string(),
            schema_version: self.agent.schema_version(),
            duration_ms: start.elapsed().as_millis() as u64,
        };
        info!("Batch finished: {}", report.summary());
        self.observer.on_batch_complete(&report);
        Ok(report)
    }

    async fn process_sequential(&self, sources: Vec<ItemSource>) -> Vec<ItemOutcome> {
        let total = sources.len();
        let mut outcomes = Vec::with_capacity(total);
        for (index, source) in sources.into_iter().enumerate() {
            outcomes.push(self.process_item(index, total, source).await);
        }
        outcomes
    }

    async fn process_concurrent(&self, sources: Vec<ItemSource>) -> Vec<ItemOutcome> {
        let total = sources.len();
        stream::iter(
            sources
                .into_iter()
                .enumerate()
                .map(|(index, source)| self.process_item(index, total, source)),
        )
        .buffered(self.concurrency)
        .collect()
        .await
    }

    /// Load, extract with retry under the item deadline, notify the observer.
    pub(crate) async fn process_item(&self, index: usize, total: usize, source: ItemSource) -> ItemOutcome {
        let id = source.id();
        let start = Instant::now();
        self.observer.on_item_start(index, total, &id);

        let attempts = AtomicU32::new(0);
        let result = match source.load().await {
            Ok(image) => self.extract_with_deadline(&image, &attempts).await,
            Err(e) => Err(e),
        };

        match &result {
            Ok(extraction) => {
                debug!("{}: {}", id, extraction.document_type());
                self.observer.on_item_success(index, total, &id, extraction);
            }
            Err(e) => self.observer.on_item_error(index, total, &id, e),
        }

        ItemOutcome {
            index,
            id,
            result,
            attempts: attempts.load(Ordering::SeqCst),
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    async fn extract_with_deadline(
        &self,
        image: &ImageInput,
        attempts: &AtomicU32,
    ) -> Result<crate::schema::ExtractionResult, ExtractError> {
        let agent = self.agent.as_ref();
        let started = Instant::now();
        let attempt_loop = self.retry.run(&image.id, move |n| {
            attempts.store(n, Ordering::SeqCst);
            agent.extract(image)
        });

        match tokio::time::timeout(self.item_timeout, attempt_loop).await {
            Ok((result, _)) => result,
            Err(_) => {
                warn!(
                    "{}: no result within {}s, giving up",
                    image.id,
                    self.item_timeout.as_secs_f64()
                );
                Err(ProviderError::Timeout {
                    elapsed_ms: started.elapsed().as_millis() as u64,
                }
                .into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{RawModelOutput, VisionModel, VisionRequest};
    use async_trait::async_trait;
    use serde_json::json;

    struct AlwaysNotPayment;

    #[async_trait]
    impl VisionModel for AlwaysNotPayment {
        fn model_id(&self) -> &str {
            "stub"
        }

        async fn complete_with_image(&self, _request: VisionRequest<'_>) -> Result<RawModelOutput, ProviderError> {
            Ok(RawModelOutput::new(json!({
                "document_type": "not_payment_document",
                "receipt_data": null,
                "invoice_data": null,
                "ocr_quality": "nul",
                "reasoning_commentary": null
            })))
        }
    }

    fn runner() -> BatchRunner {
        let agent = Arc::new(ExtractionAgent::new(Arc::new(AlwaysNotPayment)));
        BatchRunner::new(agent, &ExtractionConfig::default())
    }

    #[tokio::test]
    async fn empty_batch_is_fatal() {
        assert_eq!(runner().run(vec![]).await.unwrap_err(), ExtractError::EmptyBatch);
        assert_eq!(runner().run_paths(vec![]).await.unwrap_err(), ExtractError::EmptyBatch);
    }

    #[tokio::test]
    async fn report_carries_model_and_counts() {
        let images = vec![
            ImageInput::new("a.jpg", vec![1], "image/jpeg"),
            ImageInput::new("b.jpg", vec![2], "image/jpeg"),
        ];
        let report = runner().run(images).await.unwrap();
        assert_eq!(report.model, "stub");
        assert_eq!(report.attempted(), 2);
        assert_eq!(report.succeeded(), 2);
        assert!(report.outcomes.iter().all(|o| o.attempts == 1));
    }

    #[tokio::test]
    async fn unreadable_path_fails_only_that_item() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.jpg");
        std::fs::write(&good, [0xFF, 0xD8, 0xFF]).unwrap();
        let missing = dir.path().join("missing.jpg");

        let report = runner().run_paths(vec![good, missing]).await.unwrap();
        assert_eq!(report.succeeded(), 1);
        let failed: Vec<_> = report.failures().collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].index, 1);
        assert_eq!(failed[0].attempts, 0);
        assert!(matches!(failed[0].error(), Some(ExtractError::Input(_))));
    }

    #[test]
    fn run_sync_outside_runtime() {
        let report = runner()
            .run_sync(vec![ImageInput::new("a.jpg", vec![1], "image/jpeg")])
            .unwrap();
        assert_eq!(report.succeeded(), 1);
    }
}
