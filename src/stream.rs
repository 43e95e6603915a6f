//! Streaming extraction API: emit outcomes as images complete.
//!
//! Unlike [`crate::batch::BatchRunner::run`], which returns only after every
//! image has been attempted, [`extract_stream`] yields each [`ItemOutcome`]
//! as soon as it is ready. With `concurrency > 1` outcomes arrive in
//! completion order; every outcome carries its `index` and `id`, so sort by
//! `index` if order matters.
//!
//! The observer's per-item events fire as usual. `on_batch_complete` does
//! not, since no report is assembled.

use crate::batch::{BatchRunner, ItemSource};
use crate::error::ExtractError;
use crate::input::ImageInput;
use crate::output::ItemOutcome;
use futures::stream::{self, StreamExt};
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::Stream;
use tracing::info;

/// A boxed stream of item outcomes.
pub type OutcomeStream = Pin<Box<dyn Stream<Item = ItemOutcome> + Send>>;

/// Extract in-memory images, streaming outcomes as they complete.
///
/// # Errors
/// [`ExtractError::EmptyBatch`] when `images` is empty.
///
/// # Example
/// ```rust,no_run
/// use receipt2json::{extract_stream, BatchRunner, ExtractionAgent, ExtractionConfig, ImageInput};
/// use futures::StreamExt;
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ExtractionConfig::from_env();
/// let agent = Arc::new(ExtractionAgent::new(receipt2json::resolve_model(&config)?));
/// let runner = Arc::new(BatchRunner::new(agent, &config));
/// let image = ImageInput::load("files_to_ocr/receipt.jpg").await?;
/// let mut outcomes = extract_stream(runner, vec![image])?;
/// while let Some(outcome) = outcomes.next().await {
///     println!("{} → {}", outcome.id, outcome.is_success());
/// }
/// # Ok(())
/// # }
/// ```
pub fn extract_stream(runner: Arc<BatchRunner>, images: Vec<ImageInput>) -> Result<OutcomeStream, ExtractError> {
    stream_sources(runner, images.into_iter().map(ItemSource::Image).collect())
}

/// Extract image files, streaming outcomes as they complete.
pub fn extract_stream_paths(runner: Arc<BatchRunner>, paths: Vec<PathBuf>) -> Result<OutcomeStream, ExtractError> {
    stream_sources(runner, paths.into_iter().map(ItemSource::Path).collect())
}

fn stream_sources(runner: Arc<BatchRunner>, sources: Vec<ItemSource>) -> Result<OutcomeStream, ExtractError> {
    if sources.is_empty() {
        return Err(ExtractError::EmptyBatch);
    }

    let total = sources.len();
    let concurrency = runner.concurrency();
    info!("Starting streaming batch: {} image(s), concurrency {}", total, concurrency);

    let s = stream::iter(sources.into_iter().enumerate().map(move |(index, source)| {
        let runner = Arc::clone(&runner);
        async move { runner.process_item(index, total, source).await }
    }))
    .buffer_unordered(concurrency);

    Ok(Box::pin(s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::ExtractionAgent;
    use crate::config::ExtractionConfig;
    use crate::error::ProviderError;
    use crate::gateway::{RawModelOutput, VisionModel, VisionRequest};
    use async_trait::async_trait;

    struct Down;

    #[async_trait]
    impl VisionModel for Down {
        fn model_id(&self) -> &str {
            "down"
        }

        async fn complete_with_image(&self, _request: VisionRequest<'_>) -> Result<RawModelOutput, ProviderError> {
            Err(ProviderError::Auth {
                status: 401,
                detail: "revoked".into(),
            })
        }
    }

    fn runner() -> Arc<BatchRunner> {
        let agent = Arc::new(ExtractionAgent::new(Arc::new(Down)));
        Arc::new(BatchRunner::new(agent, &ExtractionConfig::default()))
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(matches!(extract_stream(runner(), vec![]), Err(ExtractError::EmptyBatch)));
    }

    #[tokio::test]
    async fn every_item_yields_one_tagged_outcome() {
        let images = (0..3)
            .map(|i| ImageInput::new(format!("img_{i}.jpg"), vec![i as u8], "image/jpeg"))
            .collect();
        let mut outcomes: Vec<ItemOutcome> = extract_stream(runner(), images).unwrap().collect().await;
        outcomes.sort_by_key(|o| o.index);
        let ids: Vec<_> = outcomes.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, vec!["img_0.jpg", "img_1.jpg", "img_2.jpg"]);
        assert!(outcomes.iter().all(|o| !o.is_success() && o.attempts == 1));
    }
}
