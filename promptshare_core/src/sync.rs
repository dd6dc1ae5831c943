//! Local mirror of the `prompts` table.
//!
//! The mirror lives in a `watch` channel: every change is a single
//! replace/modify, so subscribers only ever observe whole snapshots.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use flume::Sender;
use serde_json::Value;
use tokio::sync::watch;

use crate::models::{Artifact, Comment, Viewer};
use crate::store::{Filter, Query, RemoteStore, Table};

/// Immutable view of the whole collection, newest first.
pub type Snapshot = Arc<Vec<Artifact>>;

const ARTIFACT_COLUMNS: &str = "*,comments(*)";

/// Notices for whoever drives the UI.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    Resynced { count: usize },
    ResyncFailed { reason: String },
    RolledBack { artifact_id: String, reason: String },
    DeleteFailed { artifact_id: String, reason: String },
    BatchFailed { batch: usize, reason: String },
    Generated { category: String, inserted: usize },
}

pub struct CollectionSynchronizer {
    store: Arc<dyn RemoteStore>,
    page_size: usize,
    mirror: watch::Sender<Snapshot>,
    event_tx: Sender<SyncEvent>,
}

impl CollectionSynchronizer {
    pub fn new(store: Arc<dyn RemoteStore>, page_size: usize, event_tx: Sender<SyncEvent>) -> Self {
        let (mirror, _) = watch::channel(Snapshot::default());
        Self {
            store,
            page_size: page_size.max(1),
            mirror,
            event_tx,
        }
    }

    pub fn store(&self) -> &Arc<dyn RemoteStore> {
        &self.store
    }

    pub fn snapshot(&self) -> Snapshot {
        self.mirror.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.mirror.subscribe()
    }

    pub fn artifact(&self, artifact_id: &str) -> Option<Artifact> {
        self.mirror
            .borrow()
            .iter()
            .find(|a| a.id == artifact_id)
            .cloned()
    }

    /// Pages through the whole collection and swaps it into the mirror. Nothing
    /// is published unless every page (and the like overlay) succeeded.
    pub async fn fetch_all(&self, viewer: Option<&Viewer>) -> Result<Snapshot> {
        let mut artifacts = self.fetch_pages().await?;

        if let Some(viewer) = viewer {
            let liked = self.liked_ids(viewer).await?;
            for artifact in &mut artifacts {
                artifact.viewer_has_liked = liked.contains(&artifact.id);
            }
        }

        let snapshot: Snapshot = Arc::new(artifacts);
        self.mirror.send_replace(snapshot.clone());
        tracing::info!(count = snapshot.len(), "mirror resynchronized");
        self.emit(SyncEvent::Resynced {
            count: snapshot.len(),
        });
        Ok(snapshot)
    }

    async fn fetch_pages(&self) -> Result<Vec<Artifact>> {
        let mut artifacts = Vec::new();
        let mut offset = 0;
        let mut pages = 0usize;

        loop {
            let query = Query::default()
                .columns(ARTIFACT_COLUMNS)
                .order_desc("created_at")
                .range(offset, self.page_size);
            let rows = self
                .store
                .select(Table::Prompts, &query)
                .await
                .with_context(|| format!("failed to fetch prompts page at offset {offset}"))?;
            pages += 1;

            let fetched = rows.len();
            for row in rows {
                let mut artifact: Artifact =
                    serde_json::from_value(row).context("malformed prompt row")?;
                artifact.comments.sort_by(|a, b| a.created_at.cmp(&b.created_at));
                artifacts.push(artifact);
            }

            if fetched < self.page_size {
                break;
            }
            offset += fetched;
        }

        tracing::debug!(pages, total = artifacts.len(), "fetched prompt pages");
        Ok(artifacts)
    }

    async fn liked_ids(&self, viewer: &Viewer) -> Result<HashSet<String>> {
        let query = Query::default()
            .columns("prompt_id")
            .filter(Filter::eq("user_id", viewer.id.as_str()));
        let rows = self
            .store
            .select(Table::Likes, &query)
            .await
            .context("failed to fetch viewer likes")?;
        Ok(rows
            .iter()
            .filter_map(|row| row.get("prompt_id").and_then(Value::as_str))
            .map(str::to_string)
            .collect())
    }

    /// Resynchronizes after a failed mutation. Errors are reported, not raised.
    pub(crate) async fn resync(&self, viewer: Option<&Viewer>) {
        if let Err(err) = self.fetch_all(viewer).await {
            tracing::error!(error = ?err, "resync failed");
            self.emit(SyncEvent::ResyncFailed {
                reason: format!("{err:#}"),
            });
        }
    }

    /// Applies `update` to one artifact in a single mirror step. Returns `None`
    /// (and notifies nobody) when the artifact is not mirrored.
    pub(crate) fn update_artifact<R>(
        &self,
        artifact_id: &str,
        update: impl FnOnce(&mut Artifact) -> R,
    ) -> Option<R> {
        let mut result = None;
        self.mirror.send_if_modified(|snapshot| {
            let Some(index) = snapshot.iter().position(|a| a.id == artifact_id) else {
                return false;
            };
            let artifacts = Arc::make_mut(snapshot);
            result = Some(update(&mut artifacts[index]));
            true
        });
        result
    }

    pub(crate) fn remove_artifact(&self, artifact_id: &str) -> Option<Artifact> {
        let mut removed = None;
        self.mirror.send_if_modified(|snapshot| {
            let Some(index) = snapshot.iter().position(|a| a.id == artifact_id) else {
                return false;
            };
            removed = Some(Arc::make_mut(snapshot).remove(index));
            true
        });
        removed
    }

    pub(crate) fn prepend_artifact(&self, artifact: Artifact) {
        self.mirror.send_modify(|snapshot| {
            Arc::make_mut(snapshot).insert(0, artifact);
        });
    }

    pub(crate) fn append_comment(&self, comment: Comment) -> bool {
        let artifact_id = comment.prompt_id.clone();
        self.update_artifact(&artifact_id, move |artifact| artifact.comments.push(comment))
            .is_some()
    }

    pub(crate) fn emit(&self, event: SyncEvent) {
        let _ = self.event_tx.send(event);
    }
}
