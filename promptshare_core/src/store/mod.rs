//! Narrow CRUD contract for the remote table store.
//!
//! The synchronizer only ever talks to the store through [`RemoteStore`];
//! records travel as plain JSON and are typed at the call site.

pub(crate) mod rest;

pub use rest::RestStoreClient;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Prompts,
    Comments,
    Likes,
}

impl Table {
    pub fn name(self) -> &'static str {
        match self {
            Table::Prompts => "prompts",
            Table::Comments => "comments",
            Table::Likes => "likes",
        }
    }
}

/// Equality predicate on a single column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub column: String,
    pub value: String,
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub descending: bool,
}

/// Offset/limit window. Absent means "whatever the store's own cap allows".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub offset: usize,
    pub limit: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    /// Column selection, including nested joins such as `*,comments(*)`.
    pub columns: String,
    pub filters: Vec<Filter>,
    pub order: Option<Order>,
    pub range: Option<Range>,
}

impl Default for Query {
    fn default() -> Self {
        Self {
            columns: "*".to_string(),
            filters: Vec::new(),
            order: None,
            range: None,
        }
    }
}

impl Query {
    pub fn columns(mut self, columns: impl Into<String>) -> Self {
        self.columns = columns.into();
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order_desc(mut self, column: impl Into<String>) -> Self {
        self.order = Some(Order {
            column: column.into(),
            descending: true,
        });
        self
    }

    pub fn range(mut self, offset: usize, limit: usize) -> Self {
        self.range = Some(Range { offset, limit });
        self
    }
}

#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn select(&self, table: Table, query: &Query) -> Result<Vec<Value>>;

    /// Returns the inserted rows with their server-assigned ids and timestamps.
    async fn insert(&self, table: Table, records: Vec<Value>) -> Result<Vec<Value>>;

    async fn update(&self, table: Table, patch: Value, filters: &[Filter]) -> Result<()>;

    async fn delete(&self, table: Table, filters: &[Filter]) -> Result<()>;
}
