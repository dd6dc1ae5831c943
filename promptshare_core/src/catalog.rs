use rand::seq::IndexedRandom;
use rand::Rng;

use crate::models::{Artifact, Viewer};

const TEXT_MODELS: &[&str] = &[
    "ChatGPT", "Gemini", "Claude", "Grok", "DeepSeek", "豆包", "文心一言", "Kimi", "通义千问",
    "智谱AI", "秘塔",
];

const IMAGE_MODELS: &[&str] = &["Midjourney", "Stable Diffusion", "DALL-E", "Flux", "即梦AI"];

const VIDEO_MODELS: &[&str] = &["Sora", "Runway", "Pika", "Luma", "可灵 AI", "Vidu", "Haiper"];

/// Top level browsing categories. Each one is stored on artifacts as a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    All,
    Writing,
    Coding,
    Painting,
    Video,
    Business,
    Chat,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::All,
        Category::Writing,
        Category::Coding,
        Category::Painting,
        Category::Video,
        Category::Business,
        Category::Chat,
    ];

    /// The tag written on artifacts of this category.
    pub fn tag(self) -> &'static str {
        match self {
            Category::All => "全部",
            Category::Writing => "写作",
            Category::Coding => "编程",
            Category::Painting => "绘画",
            Category::Video => "视频",
            Category::Business => "商业",
            Category::Chat => "聊天",
        }
    }

    pub fn sub_categories(self) -> &'static [&'static str] {
        match self {
            Category::All => &[],
            Category::Painting => IMAGE_MODELS,
            Category::Video => VIDEO_MODELS,
            Category::Writing | Category::Coding | Category::Business | Category::Chat => {
                TEXT_MODELS
            }
        }
    }

    /// Accepts either the stored tag or the English variant name.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        Self::ALL.into_iter().find(|category| {
            category.tag() == raw || format!("{category:?}").eq_ignore_ascii_case(raw)
        })
    }

    /// Every category except the `All` pseudo-category.
    pub fn concrete() -> impl Iterator<Item = Category> {
        Self::ALL.into_iter().filter(|c| *c != Category::All)
    }

    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Category {
        let choices: Vec<Category> = Self::concrete().collect();
        *choices.choose(rng).unwrap_or(&Category::Writing)
    }
}

/// Splits author supplied tag text on ASCII and full-width commas.
pub fn parse_tags(raw: &str) -> Vec<String> {
    raw.split([',', '，'])
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect()
}

/// Which slice of the collection a profile page shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Ownership {
    #[default]
    Everyone,
    PublishedBy,
    LikedBy,
}

/// Local view over the mirror: category, sub-category, free text search and
/// the profile tabs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptFilter {
    pub category: Category,
    pub sub_category: Option<String>,
    pub query: String,
    pub ownership: Ownership,
}

impl Default for PromptFilter {
    fn default() -> Self {
        Self {
            category: Category::All,
            sub_category: None,
            query: String::new(),
            ownership: Ownership::Everyone,
        }
    }
}

impl PromptFilter {
    pub fn matches(&self, artifact: &Artifact, viewer: Option<&Viewer>) -> bool {
        let matches_category =
            self.category == Category::All || artifact.tags.iter().any(|t| t == self.category.tag());

        let matches_sub = match &self.sub_category {
            Some(sub) => artifact.tags.iter().any(|t| t == sub),
            None => true,
        };

        let needle = self.query.to_lowercase();
        let matches_search = needle.is_empty()
            || artifact.title.to_lowercase().contains(&needle)
            || artifact.content.to_lowercase().contains(&needle)
            || artifact
                .tags
                .iter()
                .any(|tag| tag.to_lowercase().contains(&needle));

        let matches_owner = match self.ownership {
            Ownership::Everyone => true,
            Ownership::PublishedBy => viewer.is_some_and(|v| v.id == artifact.author_id),
            Ownership::LikedBy => viewer.is_some() && artifact.viewer_has_liked,
        };

        matches_category && matches_sub && matches_search && matches_owner
    }

    pub fn apply<'a>(&self, artifacts: &'a [Artifact], viewer: Option<&Viewer>) -> Vec<&'a Artifact> {
        artifacts
            .iter()
            .filter(|artifact| self.matches(artifact, viewer))
            .collect()
    }
}
