use serde::Deserialize;

use crate::catalog::Category;
use crate::models::GeneratedItem;

pub fn build_prompt(category: Category, count: usize) -> String {
    let models = category.sub_categories();
    let model_hint = if models.is_empty() {
        String::new()
    } else {
        format!(
            "Each prompt should target one of these tools and include its name as a tag: {}.\n",
            models.join(", ")
        )
    };

    format!(
        "You are curating a marketplace of high quality AI prompts.\n\
         Write {count} distinct, ready-to-use prompts for the category \"{category}\".\n\
         {model_hint}\
         Respond with JSON only: an object whose \"prompts\" key holds an array. Every element must be an object with the keys \
         \"title\" (short), \"description\" (one sentence), \"content\" (the full prompt text) \
         and \"tags\" (array of 1-3 short strings).",
        category = category.tag(),
    )
}

/// Removes a surrounding markdown code fence (```` ``` ```` or ```` ```json ````).
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. `json`) on the opening line
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Envelope {
    List(Vec<GeneratedItem>),
    Wrapped {
        #[serde(alias = "prompts")]
        items: Vec<GeneratedItem>,
    },
}

/// Parses a generation response. Malformed output yields no items rather than
/// an error.
pub fn parse_items(raw: &str) -> Vec<GeneratedItem> {
    let body = strip_code_fence(raw);
    let items = match serde_json::from_str::<Envelope>(body) {
        Ok(Envelope::List(items)) | Ok(Envelope::Wrapped { items }) => items,
        Err(err) => {
            tracing::warn!(error = %err, "discarding unparseable generation response");
            return Vec::new();
        }
    };
    items
        .into_iter()
        .filter(|item| !item.title.trim().is_empty() && !item.content.trim().is_empty())
        .collect()
}
