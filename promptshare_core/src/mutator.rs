//! Single-record writes against the mirror.
//!
//! Likes and deletes are applied locally first and reconciled by a resync when
//! the store disagrees. Inserts wait for the store because later operations
//! need the server-assigned id.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::json;
use tokio::sync::Mutex;

use crate::models::{Artifact, ArtifactDraft, Comment, LikeRecord, NewComment, Viewer};
use crate::store::{Filter, Table};
use crate::sync::{CollectionSynchronizer, SyncEvent};

/// Proof that the user confirmed deleting one prompt. Building one is the
/// caller's job (dialog, `--yes` flag, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteConfirmation {
    artifact_id: String,
}

impl DeleteConfirmation {
    pub fn confirmed(artifact_id: impl Into<String>) -> Self {
        Self {
            artifact_id: artifact_id.into(),
        }
    }

    pub fn artifact_id(&self) -> &str {
        &self.artifact_id
    }
}

pub struct OptimisticMutator {
    sync: Arc<CollectionSynchronizer>,
    // Remote writes run in the order their local changes were applied.
    remote_writes: Mutex<()>,
}

impl OptimisticMutator {
    pub fn new(sync: Arc<CollectionSynchronizer>) -> Self {
        Self {
            sync,
            remote_writes: Mutex::new(()),
        }
    }

    /// Flips the viewer's like. Remote failures are reported through
    /// `SyncEvent::RolledBack` and repaired by a resync.
    pub async fn toggle_like(&self, artifact_id: &str, viewer: Option<&Viewer>) {
        let Some(viewer) = viewer else {
            tracing::debug!(artifact_id, "ignoring like from anonymous viewer");
            return;
        };

        let applied = self.sync.update_artifact(artifact_id, |artifact| {
            let was_liked = artifact.viewer_has_liked;
            artifact.likes = if was_liked {
                artifact.likes.saturating_sub(1)
            } else {
                artifact.likes.saturating_add(1)
            };
            artifact.viewer_has_liked = !was_liked;
            (was_liked, artifact.likes)
        });
        let Some((was_liked, likes)) = applied else {
            tracing::debug!(artifact_id, "like target not in mirror");
            return;
        };

        let _ordered = self.remote_writes.lock().await;
        if let Err(err) = self.push_like(artifact_id, viewer, was_liked, likes).await {
            tracing::warn!(artifact_id, error = ?err, "like failed, resynchronizing");
            self.sync.emit(SyncEvent::RolledBack {
                artifact_id: artifact_id.to_string(),
                reason: format!("{err:#}"),
            });
            self.sync.resync(Some(viewer)).await;
        }
    }

    async fn push_like(&self, artifact_id: &str, viewer: &Viewer, was_liked: bool, likes: u32) -> Result<()> {
        let store = self.sync.store();
        if was_liked {
            let filters = [
                Filter::eq("user_id", viewer.id.as_str()),
                Filter::eq("prompt_id", artifact_id),
            ];
            store
                .delete(Table::Likes, &filters)
                .await
                .context("failed to remove like")?;
        } else {
            let record = LikeRecord {
                user_id: viewer.id.clone(),
                prompt_id: artifact_id.to_string(),
            };
            store
                .insert(Table::Likes, vec![serde_json::to_value(record)?])
                .await
                .context("failed to record like")?;
        }

        store
            .update(Table::Prompts, json!({ "likes": likes }), &[Filter::eq("id", artifact_id)])
            .await
            .context("failed to update like count")?;
        Ok(())
    }

    /// Removes the prompt locally, then remotely. A remote failure restores the
    /// authoritative list and is returned to the caller.
    pub async fn delete_prompt(&self, confirmation: DeleteConfirmation, viewer: Option<&Viewer>) -> Result<()> {
        let artifact_id = confirmation.artifact_id();
        if self.sync.remove_artifact(artifact_id).is_none() {
            tracing::debug!(artifact_id, "deleting prompt missing from mirror");
        }

        let _ordered = self.remote_writes.lock().await;
        let result = self
            .sync
            .store()
            .delete(Table::Prompts, &[Filter::eq("id", artifact_id)])
            .await
            .with_context(|| format!("failed to delete prompt {artifact_id}"));

        if let Err(err) = &result {
            tracing::warn!(artifact_id, error = ?err, "delete failed, resynchronizing");
            self.sync.emit(SyncEvent::DeleteFailed {
                artifact_id: artifact_id.to_string(),
                reason: format!("{err:#}"),
            });
            self.sync.resync(viewer).await;
        } else {
            tracing::info!(artifact_id, "prompt deleted");
        }
        result
    }

    /// Publishes a new prompt and prepends the stored record to the mirror.
    pub async fn add_artifact(&self, draft: ArtifactDraft, viewer: &Viewer) -> Result<Artifact> {
        let row = draft.into_new_artifact(viewer)?;
        let inserted = self
            .sync
            .store()
            .insert(Table::Prompts, vec![serde_json::to_value(&row)?])
            .await
            .context("failed to publish prompt")?;

        let record = inserted
            .into_iter()
            .next()
            .context("store returned no row for the published prompt")?;
        let mut artifact: Artifact = serde_json::from_value(record).context("malformed prompt row")?;
        artifact.comments.clear();

        tracing::info!(artifact_id = %artifact.id, "prompt published");
        self.sync.prepend_artifact(artifact.clone());
        Ok(artifact)
    }

    /// Posts a comment. Returns `None` without touching the store for
    /// anonymous viewers and blank bodies.
    pub async fn add_comment(
        &self,
        artifact_id: &str,
        body: &str,
        viewer: Option<&Viewer>,
    ) -> Result<Option<Comment>> {
        let Some(viewer) = viewer else {
            return Ok(None);
        };
        let body = body.trim();
        if body.is_empty() {
            return Ok(None);
        }

        let row = NewComment {
            prompt_id: artifact_id.to_string(),
            author_id: viewer.id.clone(),
            author_name: viewer.name.clone(),
            content: body.to_string(),
        };
        let inserted = self
            .sync
            .store()
            .insert(Table::Comments, vec![serde_json::to_value(&row)?])
            .await
            .context("failed to post comment")?;
        let record = inserted
            .into_iter()
            .next()
            .context("store returned no row for the posted comment")?;
        let comment: Comment = serde_json::from_value(record).context("malformed comment row")?;

        if !self.sync.append_comment(comment.clone()) {
            tracing::debug!(artifact_id, "commented prompt no longer mirrored");
        }
        Ok(Some(comment))
    }
}
