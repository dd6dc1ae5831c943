use std::sync::Arc;

use anyhow::Result;
use flume::Sender;

use crate::config::PromptShareConfig;
use crate::generation::{GenerationOrchestrator, ModelFallbackExecutor};
use crate::llm_client::{GenerationService, LlmClient};
use crate::mutator::OptimisticMutator;
use crate::store::{RemoteStore, RestStoreClient};
use crate::sync::{CollectionSynchronizer, SyncEvent};

/// Wires the synchronizer, mutator and generator around one shared mirror.
pub struct Marketplace {
    pub sync: Arc<CollectionSynchronizer>,
    pub mutator: OptimisticMutator,
    pub generator: GenerationOrchestrator,
}

impl Marketplace {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        service: Arc<dyn GenerationService>,
        config: &PromptShareConfig,
        event_tx: Sender<SyncEvent>,
    ) -> Self {
        let sync = Arc::new(CollectionSynchronizer::new(store, config.sync.page_size, event_tx));
        let generation = &config.generation;
        let executor = ModelFallbackExecutor::new(service, generation.models.clone());
        Self {
            mutator: OptimisticMutator::new(sync.clone()),
            generator: GenerationOrchestrator::new(
                sync.clone(),
                executor,
                generation.batch_count,
                generation.batch_size,
                generation.timeout(),
            ),
            sync,
        }
    }

    /// Builds the HTTP collaborators described by `config`.
    pub fn from_config(config: &PromptShareConfig, event_tx: Sender<SyncEvent>) -> Result<Self> {
        let store = RestStoreClient::new(&config.store_url, &config.store_api_key, config.http_timeout())?;
        let llm = LlmClient::new(&config.llm_api_url, &config.llm_api_key, config.generation.timeout())?;
        tracing::info!(store = %store.base_url(), models = ?config.generation.models, "marketplace configured");
        Ok(Self::new(Arc::new(store), Arc::new(llm), config, event_tx))
    }
}
