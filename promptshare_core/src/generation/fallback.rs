use std::sync::Arc;

use anyhow::{anyhow, Result};

use super::prompt::{build_prompt, parse_items};
use crate::catalog::Category;
use crate::error::{classify, FailureClass};
use crate::llm_client::GenerationService;
use crate::models::GeneratedItem;

/// Terminal state of one attempt against one model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    TransientFailure(String),
    FatalFailure(String),
}

/// Bookkeeping for one `generate_batch` call; never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchJob {
    pub category: Category,
    pub count: usize,
    pub attempts: Vec<(String, AttemptOutcome)>,
}

#[derive(Debug, Clone)]
pub struct GeneratedBatch {
    pub items: Vec<GeneratedItem>,
    pub job: BatchJob,
}

/// Tries one generation request against each candidate model in order.
pub struct ModelFallbackExecutor {
    service: Arc<dyn GenerationService>,
    models: Vec<String>,
}

impl ModelFallbackExecutor {
    pub fn new(service: Arc<dyn GenerationService>, models: Vec<String>) -> Self {
        Self { service, models }
    }

    pub fn service(&self) -> &Arc<dyn GenerationService> {
        &self.service
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }

    pub async fn generate_batch(&self, category: Category, count: usize) -> Result<GeneratedBatch> {
        let prompt = build_prompt(category, count);
        let mut job = BatchJob {
            category,
            count,
            attempts: Vec::with_capacity(self.models.len()),
        };
        let mut last_error = None;

        for model in &self.models {
            let err = match self.service.generate(model, &prompt, true).await {
                Ok(raw) => {
                    job.attempts.push((model.clone(), AttemptOutcome::Success));
                    let items = parse_items(&raw);
                    tracing::info!(model = %model, items = items.len(), "generation batch succeeded");
                    return Ok(GeneratedBatch { items, job });
                }
                Err(err) => err,
            };

            let class = classify(&err);
            if class == FailureClass::FatalAuth {
                tracing::error!(model = %model, error = %err, "generation credential rejected");
                job.attempts
                    .push((model.clone(), AttemptOutcome::FatalFailure(format!("{err:#}"))));
                return Err(err);
            }

            tracing::warn!(model = %model, ?class, error = %err, "generation attempt failed, trying next model");
            job.attempts
                .push((model.clone(), AttemptOutcome::TransientFailure(format!("{err:#}"))));
            last_error = Some(err);
        }

        tracing::debug!(attempts = job.attempts.len(), "every generation model failed");
        Err(last_error.unwrap_or_else(|| anyhow!("no generation models configured")))
    }
}
