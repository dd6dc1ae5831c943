use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::parse_tags;

/// The currently authenticated actor. Anonymous callers pass `None` wherever
/// a `Option<&Viewer>` is accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Viewer {
    pub id: String,
    pub name: String,
}

impl Viewer {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub prompt_id: String,
    #[serde(default)]
    pub author_id: String,
    #[serde(default)]
    pub author_name: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// A published prompt as mirrored from the `prompts` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub author_id: String,
    #[serde(default)]
    pub author_name: String,
    #[serde(default)]
    pub is_paid: bool,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub likes: u32,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub comments: Vec<Comment>,
    /// Derived per fetch from the `likes` table; never written back.
    #[serde(skip_serializing, default)]
    pub viewer_has_liked: bool,
}

/// One row of the `likes` relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikeRecord {
    pub user_id: String,
    pub prompt_id: String,
}

/// Insert shape for the `prompts` table. The store assigns `id` and
/// `created_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewArtifact {
    pub title: String,
    pub description: String,
    pub content: String,
    pub tags: Vec<String>,
    pub author_id: String,
    pub author_name: String,
    pub is_paid: bool,
    pub price: f64,
    pub likes: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewComment {
    pub prompt_id: String,
    pub author_id: String,
    pub author_name: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DraftError {
    #[error("prompt {0} may not be empty")]
    MissingField(&'static str),

    #[error("paid prompts need a non-negative price, got {0:?}")]
    InvalidPrice(Option<String>),
}

/// Form input for publishing a prompt. `tags` is the raw comma separated
/// text typed by the author.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArtifactDraft {
    pub title: String,
    pub description: String,
    pub content: String,
    pub tags: String,
    pub is_paid: bool,
    pub price: Option<String>,
}

impl ArtifactDraft {
    pub fn into_new_artifact(self, viewer: &Viewer) -> Result<NewArtifact, DraftError> {
        if self.title.trim().is_empty() {
            return Err(DraftError::MissingField("title"));
        }
        if self.content.trim().is_empty() {
            return Err(DraftError::MissingField("content"));
        }

        let price = if self.is_paid {
            let parsed = self
                .price
                .as_deref()
                .and_then(|raw| raw.trim().parse::<f64>().ok())
                .filter(|value| value.is_finite() && *value >= 0.0);
            match parsed {
                Some(value) => value,
                None => return Err(DraftError::InvalidPrice(self.price)),
            }
        } else {
            0.0
        };

        Ok(NewArtifact {
            title: self.title.trim().to_string(),
            description: self.description.trim().to_string(),
            content: self.content,
            tags: parse_tags(&self.tags),
            author_id: viewer.id.clone(),
            author_name: viewer.name.clone(),
            is_paid: self.is_paid,
            price,
            likes: 0,
        })
    }
}

/// A single prompt proposed by the generation service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedItem {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
}
