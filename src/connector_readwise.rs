//! Readwise Reader connector.
//!
//! Pulls tagged documents and their highlights from the Reader v3 list
//! endpoint (`GET {api_base}/list/`).
//!
//! # Configuration
//!
//! ```toml
//! [source]
//! tag = "ai101"
//! page_size = 100
//! category = "article"   # optional
//! max_pages = 1
//! lookback_hours = 72    # optional time window
//! ```
//!
//! The API token is read from `READWISE_TOKEN` (or `source.token`) and sent
//! as `Authorization: Token <token>`.
//!
//! # Highlights
//!
//! Highlights are list items with `category=highlight` and a `parent_id`
//! pointing at their document. They are requested with the parent ids
//! comma-joined, and anything returned for other parents is discarded.
//!
//! # Pagination
//!
//! Document listings follow `nextPageCursor` for at most `max_pages` pages.
//! Highlight listings always follow it to the end: a truncated highlight set
//! would render a shorter block and overwrite the stored one.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::{BTreeSet, HashSet};
use std::time::Duration;

use crate::config::Config;
use crate::models::{Document, Highlight};
use crate::traits::DocumentSource;

const HIGHLIGHT_CATEGORY: &str = "highlight";

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    results: Vec<ReaderItem>,
    #[serde(default, rename = "nextPageCursor")]
    next_page_cursor: Option<String>,
}

/// One entry of the list endpoint; documents and highlights share the shape.
#[derive(Debug, Deserialize, Default)]
struct ReaderItem {
    #[serde(default)]
    id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default, deserialize_with = "deserialize_tags")]
    tags: BTreeSet<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    source_url: Option<String>,
    #[serde(default)]
    updated_at: Option<String>,
    #[serde(default)]
    updated: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    parent_id: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    note: Option<String>,
}

impl ReaderItem {
    fn into_document(self) -> Document {
        Document {
            id: self.id,
            title: self.title,
            tags: self.tags,
            summary: self.summary,
            source_url: self.source_url,
            updated_at: non_empty(self.updated_at).or(non_empty(self.updated)),
            created_at: non_empty(self.created_at),
            highlights: Vec::new(),
        }
    }

    fn into_highlight(self) -> Option<Highlight> {
        let parent_id = non_empty(self.parent_id)?;
        Some(Highlight {
            parent_id,
            text: non_empty(self.content)
                .or(non_empty(self.text))
                .unwrap_or_default(),
            note: non_empty(self.notes).or(non_empty(self.note)),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Tags arrive as `{"name": {...}}` objects or as plain lists.
fn deserialize_tags<'de, D>(deserializer: D) -> Result<BTreeSet<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    let tags = match value {
        Some(Value::Object(map)) => map.into_iter().map(|(name, _)| name).collect(),
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s),
                Value::Object(obj) => obj
                    .get("name")
                    .and_then(|n| n.as_str())
                    .map(str::to_string),
                _ => None,
            })
            .collect(),
        _ => BTreeSet::new(),
    };
    Ok(tags)
}

/// Reader API client implementing [`DocumentSource`].
pub struct ReadwiseSource {
    client: reqwest::Client,
    api_base: String,
    token: String,
    page_size: u32,
    category: Option<String>,
    max_pages: u32,
}

impl ReadwiseSource {
    pub fn new(config: &Config) -> Result<Self> {
        let token = config
            .source
            .token
            .clone()
            .ok_or_else(|| anyhow::anyhow!("source.token is not set"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http.timeout_secs))
            .user_agent(concat!("readsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_base: config.source.api_base.trim_end_matches('/').to_string(),
            token,
            page_size: config.source.page_size,
            category: config.source.category.clone(),
            max_pages: config.source.max_pages,
        })
    }

    /// GET `/list/` page by page. `page_limit` of `None` reads every page.
    async fn fetch_items(
        &self,
        query: Vec<(&'static str, String)>,
        page_limit: Option<u32>,
    ) -> Result<Vec<ReaderItem>> {
        let url = format!("{}/list/", self.api_base);
        let mut items = Vec::new();
        let mut cursor: Option<String> = None;
        let mut seen_cursors: HashSet<String> = HashSet::new();
        let mut page: u32 = 0;

        loop {
            let mut params = query.clone();
            if let Some(c) = &cursor {
                params.push(("pageCursor", c.clone()));
            }

            let resp = self
                .client
                .get(&url)
                .header("Authorization", format!("Token {}", self.token))
                .query(&params)
                .send()
                .await
                .with_context(|| format!("Reader list request failed (page {})", page + 1))?;

            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                bail!("Reader API error {}: {}", status, body);
            }

            let parsed: ListResponse = resp
                .json()
                .await
                .context("Failed to parse Reader list response")?;
            items.extend(parsed.results);
            page += 1;

            let Some(next) = parsed.next_page_cursor.filter(|c| !c.is_empty()) else {
                break;
            };
            if page_limit.is_some_and(|max| page >= max) {
                tracing::debug!(pages = page, "page limit reached; more results available");
                break;
            }
            if !seen_cursors.insert(next.clone()) {
                bail!("Reader API repeated page cursor {}", next);
            }
            cursor = Some(next);
        }

        Ok(items)
    }
}

/// Query parameters for a document listing.
fn document_query(
    tag: &str,
    page_size: u32,
    category: Option<&str>,
    modified_after: Option<DateTime<Utc>>,
) -> Vec<(&'static str, String)> {
    let mut query = vec![("tag", tag.to_string()), ("page_size", page_size.to_string())];
    if let Some(category) = category {
        query.push(("category", category.to_string()));
    }
    if let Some(after) = modified_after {
        query.push((
            "updatedAfter",
            after.to_rfc3339_opts(SecondsFormat::Secs, true),
        ));
    }
    query
}

/// Query parameters for a highlight listing scoped to `parent_ids`.
fn highlight_query(parent_ids: &[String], page_size: u32) -> Vec<(&'static str, String)> {
    vec![
        ("category", HIGHLIGHT_CATEGORY.to_string()),
        ("page_size", page_size.to_string()),
        ("parent_id", parent_ids.join(",")),
    ]
}

#[async_trait]
impl DocumentSource for ReadwiseSource {
    fn name(&self) -> &str {
        "readwise"
    }

    async fn list_documents(
        &self,
        tag: &str,
        modified_after: Option<DateTime<Utc>>,
    ) -> Result<Vec<Document>> {
        let query = document_query(tag, self.page_size, self.category.as_deref(), modified_after);
        let items = self.fetch_items(query, Some(self.max_pages)).await?;

        Ok(items
            .into_iter()
            .filter(|item| !item.id.is_empty())
            .map(ReaderItem::into_document)
            .collect())
    }

    async fn list_highlights(&self, parent_ids: &[String]) -> Result<Vec<Highlight>> {
        if parent_ids.is_empty() {
            return Ok(Vec::new());
        }

        let wanted: HashSet<&str> = parent_ids.iter().map(String::as_str).collect();
        let items = self
            .fetch_items(highlight_query(parent_ids, self.page_size), None)
            .await?;

        Ok(items
            .into_iter()
            .filter_map(ReaderItem::into_highlight)
            .filter(|h| wanted.contains(h.parent_id.as_str()))
            .collect())
    }
}
