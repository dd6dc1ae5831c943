use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, Url};
use serde_json::Value;

use super::{Filter, Query, RemoteStore, Table};
use crate::error::ServiceError;

/// PostgREST flavoured client (`/rest/v1/<table>`), as exposed by Supabase.
#[derive(Clone)]
pub struct RestStoreClient {
    base_url: String,
    api_key: String,
    client: Client,
}

impl RestStoreClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base = sanitize_base_url(base_url.into())?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            base_url: base,
            api_key: api_key.into(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, table: Table) -> Result<Url> {
        Url::parse(&format!("{}/rest/v1/{}", self.base_url, table.name()))
            .context("invalid store URL")
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        if self.api_key.is_empty() {
            return req;
        }
        req.header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
    }

    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read body".to_string());
        Err(ServiceError::Status {
            service: "store",
            status: status.as_u16(),
            body,
        }
        .into())
    }
}

fn filter_pairs(filters: &[Filter]) -> Vec<(String, String)> {
    filters
        .iter()
        .map(|f| (f.column.clone(), format!("eq.{}", f.value)))
        .collect()
}

fn query_pairs(query: &Query) -> Vec<(String, String)> {
    let mut pairs = vec![("select".to_string(), query.columns.clone())];
    pairs.extend(filter_pairs(&query.filters));
    if let Some(order) = &query.order {
        let direction = if order.descending { "desc" } else { "asc" };
        pairs.push(("order".to_string(), format!("{}.{direction}", order.column)));
    }
    if let Some(range) = query.range {
        pairs.push(("offset".to_string(), range.offset.to_string()));
        pairs.push(("limit".to_string(), range.limit.to_string()));
    }
    pairs
}

#[async_trait]
impl RemoteStore for RestStoreClient {
    async fn select(&self, table: Table, query: &Query) -> Result<Vec<Value>> {
        let url = self.url(table)?;
        let response = self
            .authorize(self.client.get(url).query(&query_pairs(query)))
            .send()
            .await
            .with_context(|| format!("failed to select from {}", table.name()))?;
        let rows = Self::check(response)
            .await?
            .json()
            .await
            .with_context(|| format!("failed to parse {} rows", table.name()))?;
        Ok(rows)
    }

    async fn insert(&self, table: Table, records: Vec<Value>) -> Result<Vec<Value>> {
        let url = self.url(table)?;
        let response = self
            .authorize(self.client.post(url))
            .header("Prefer", "return=representation")
            .json(&records)
            .send()
            .await
            .with_context(|| format!("failed to insert into {}", table.name()))?;
        let rows = Self::check(response)
            .await?
            .json()
            .await
            .with_context(|| format!("failed to parse inserted {} rows", table.name()))?;
        Ok(rows)
    }

    async fn update(&self, table: Table, patch: Value, filters: &[Filter]) -> Result<()> {
        let url = self.url(table)?;
        let response = self
            .authorize(self.client.patch(url).query(&filter_pairs(filters)))
            .json(&patch)
            .send()
            .await
            .with_context(|| format!("failed to update {}", table.name()))?;
        Self::check(response).await?;
        Ok(())
    }

    async fn delete(&self, table: Table, filters: &[Filter]) -> Result<()> {
        let url = self.url(table)?;
        let response = self
            .authorize(self.client.delete(url).query(&filter_pairs(filters)))
            .send()
            .await
            .with_context(|| format!("failed to delete from {}", table.name()))?;
        Self::check(response).await?;
        Ok(())
    }
}

pub(crate) fn sanitize_base_url(mut base: String) -> Result<String> {
    if !base.starts_with("http://") && !base.starts_with("https://") {
        base = format!("http://{base}");
    }
    while base.ends_with('/') {
        base.pop();
    }
    let _ = Url::parse(&base).context("invalid base URL")?;
    Ok(base)
}
