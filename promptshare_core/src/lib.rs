pub mod catalog;
pub mod config;
pub mod error;
pub mod generation;
pub mod llm_client;
pub mod marketplace;
pub mod models;
pub mod mutator;
pub mod store;
pub mod sync;
pub mod telemetry;

#[cfg(test)]
mod testing;

pub use catalog::{Category, Ownership, PromptFilter};
pub use config::PromptShareConfig;
pub use error::{classify, FailureClass, ServiceError};
pub use generation::{CredentialPrompt, GenerationOrchestrator, ModelFallbackExecutor};
pub use llm_client::{GenerationService, LlmClient};
pub use marketplace::Marketplace;
pub use models::{Artifact, ArtifactDraft, Comment, Viewer};
pub use mutator::{DeleteConfirmation, OptimisticMutator};
pub use store::{RemoteStore, RestStoreClient};
pub use sync::{CollectionSynchronizer, Snapshot, SyncEvent};
