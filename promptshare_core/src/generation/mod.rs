//! Bulk prompt generation: parallel batches over a model fallback chain.

mod fallback;
mod prompt;

pub use fallback::{AttemptOutcome, BatchJob, GeneratedBatch, ModelFallbackExecutor};
pub use prompt::{build_prompt, parse_items, strip_code_fence};

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use futures_util::future::join_all;
use serde_json::Value;
use thiserror::Error;

use crate::catalog::Category;
use crate::error::{classify, ServiceError};
use crate::models::{GeneratedItem, NewArtifact, Viewer};
use crate::store::Table;
use crate::sync::{CollectionSynchronizer, SyncEvent};

/// Tag added to every generated prompt.
pub const GENERATED_TAG: &str = "AI Generated";

/// Appended to the viewer's display name on generated prompts.
pub const GENERATED_AUTHOR_SUFFIX: &str = " (AI)";

/// Marks a failure of the batch phase, as opposed to the bulk insert that
/// follows it.
#[derive(Debug, Error)]
#[error("all generation batches failed")]
pub struct GenerationFailed;

/// Asks the user for a replacement generation credential.
#[async_trait]
pub trait CredentialPrompt: Send + Sync {
    async fn request_credential(&self, reason: &str) -> Option<String>;
}

pub struct GenerationOrchestrator {
    sync: Arc<CollectionSynchronizer>,
    executor: ModelFallbackExecutor,
    batch_count: usize,
    batch_size: usize,
    timeout: Duration,
}

impl GenerationOrchestrator {
    pub fn new(
        sync: Arc<CollectionSynchronizer>,
        executor: ModelFallbackExecutor,
        batch_count: usize,
        batch_size: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            sync,
            executor,
            batch_count: batch_count.max(1),
            batch_size: batch_size.max(1),
            timeout,
        }
    }

    /// Generates roughly `batch_count * batch_size` prompts, inserts them in one
    /// call and resynchronizes. Returns how many rows were inserted.
    pub async fn auto_generate(&self, category: Option<Category>, viewer: &Viewer) -> Result<usize> {
        let category = resolve_category(category);
        tracing::info!(category = category.tag(), batches = self.batch_count, "starting prompt generation");

        let batches = (0..self.batch_count).map(|batch| self.run_batch(batch, category));
        let results = join_all(batches).await;

        let mut items = Vec::new();
        let mut fatal = None;
        let mut last = None;
        for (batch, result) in results.into_iter().enumerate() {
            match result {
                Ok(generated) => items.extend(generated.items),
                Err(err) => {
                    tracing::warn!(batch, error = %err, "generation batch failed");
                    self.sync.emit(SyncEvent::BatchFailed {
                        batch,
                        reason: format!("{err:#}"),
                    });
                    if fatal.is_none() && classify(&err).is_fatal() {
                        fatal = Some(err);
                    } else {
                        last = Some(err);
                    }
                }
            }
        }

        if items.is_empty() {
            return Err(match fatal.or(last) {
                Some(err) => err.context(GenerationFailed),
                None => anyhow::Error::new(GenerationFailed),
            });
        }

        let rows = items
            .into_iter()
            .map(|item| serde_json::to_value(generated_row(item, category, viewer)))
            .collect::<Result<Vec<Value>, _>>()?;
        let submitted = rows.len();
        let inserted = self.sync.store().insert(Table::Prompts, rows).await?;
        let inserted = if inserted.is_empty() { submitted } else { inserted.len() };

        tracing::info!(category = category.tag(), inserted, "generated prompts stored");
        self.sync.emit(SyncEvent::Generated {
            category: category.tag().to_string(),
            inserted,
        });
        self.sync.resync(Some(viewer)).await;
        Ok(inserted)
    }

    /// Like [`auto_generate`](Self::auto_generate), but when the generation
    /// credential is rejected asks `prompt` for a new one and retries exactly
    /// once. Store failures are returned as they are.
    pub async fn auto_generate_with_reauth(
        &self,
        category: Option<Category>,
        viewer: &Viewer,
        prompt: &dyn CredentialPrompt,
    ) -> Result<usize> {
        let category = Some(resolve_category(category));
        match self.auto_generate(category, viewer).await {
            Err(err) if err.is::<GenerationFailed>() && classify(&err).is_fatal() => {
                let Some(credential) = prompt.request_credential(&format!("{err:#}")).await else {
                    return Err(err);
                };
                tracing::info!("retrying generation with a new credential");
                self.executor.service().set_credential(credential);
                self.auto_generate(category, viewer).await
            }
            other => other,
        }
    }

    async fn run_batch(&self, batch: usize, category: Category) -> Result<GeneratedBatch> {
        let attempt = self.executor.generate_batch(category, self.batch_size);
        match tokio::time::timeout(self.timeout, attempt).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(batch, timeout = ?self.timeout, "generation batch timed out");
                Err(ServiceError::TimedOut {
                    secs: self.timeout.as_secs(),
                }
                .into())
            }
        }
    }
}

fn resolve_category(category: Option<Category>) -> Category {
    match category {
        Some(category) if category != Category::All => category,
        _ => Category::random(&mut rand::rng()),
    }
}

fn generated_row(item: GeneratedItem, category: Category, viewer: &Viewer) -> NewArtifact {
    let mut tags: Vec<String> = Vec::with_capacity(item.tags.len() + 2);
    let extra = [category.tag().to_string(), GENERATED_TAG.to_string()];
    for tag in item.tags.into_iter().chain(extra) {
        let tag = tag.trim().to_string();
        if !tag.is_empty() && !tags.contains(&tag) {
            tags.push(tag);
        }
    }

    NewArtifact {
        title: item.title,
        description: item.description,
        content: item.content,
        tags,
        author_id: viewer.id.clone(),
        author_name: format!("{}{GENERATED_AUTHOR_SUFFIX}", viewer.name),
        is_paid: false,
        price: 0.0,
        likes: 0,
    }
}
