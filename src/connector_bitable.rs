//! Feishu Bitable connector.
//!
//! Reads and writes rows of one bitable table through the Open API:
//!
//! | Operation | Request |
//! |-----------|---------|
//! | token exchange | `POST {api_base}/auth/v3/tenant_access_token/internal` |
//! | list rows | `GET {api_base}/bitable/v1/apps/{app_token}/tables/{table_id}/records` |
//! | create row | `POST .../records` with `{"fields": {...}}` |
//! | update row | `PUT .../records/{record_id}` with `{"fields": {...}}` |
//!
//! Every response carries a `code`; anything other than `0` is an error even
//! when the HTTP status is 200.
//!
//! # Configuration
//!
//! ```toml
//! [destination]
//! page_size = 500
//! max_pages = 1
//!
//! [columns]
//! title = "文章标题Article"
//! url = "URL"
//! ```
//!
//! Credentials come from `FEISHU_APP_ID`, `FEISHU_APP_SECRET`,
//! `FEISHU_APP_TOKEN` and `FEISHU_TABLE_ID`. The tenant access token is
//! fetched once per run and never cached.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::config::{ColumnsConfig, Config};
use crate::models::{DestinationRow, Record};
use crate::traits::{FieldMap, RowStore};

/// Envelope shared by every Open API response.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    msg: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    tenant_access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RecordPage {
    #[serde(default)]
    items: Option<Vec<RecordItem>>,
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RecordItem {
    record_id: String,
    #[serde(default)]
    fields: BTreeMap<String, Value>,
}

#[derive(Debug, Deserialize)]
struct CreatedRecord {
    record: RecordItem,
}

/// Bitable client implementing [`RowStore`]; holds a live access token.
pub struct BitableStore {
    client: reqwest::Client,
    records_url: String,
    access_token: String,
    columns: ColumnsConfig,
    page_size: u32,
    max_pages: u32,
}

impl BitableStore {
    /// Exchange the app credentials for an access token and build the store.
    pub async fn connect(config: &Config) -> Result<Self> {
        let dest = &config.destination;
        let require = |value: &Option<String>, key: &str| {
            value
                .clone()
                .ok_or_else(|| anyhow::anyhow!("destination.{} is not set", key))
        };
        let app_id = require(&dest.app_id, "app_id")?;
        let app_secret = require(&dest.app_secret, "app_secret")?;
        let app_token = require(&dest.app_token, "app_token")?;
        let table_id = require(&dest.table_id, "table_id")?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http.timeout_secs))
            .user_agent(concat!("readsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        let api_base = dest.api_base.trim_end_matches('/');
        let access_token = fetch_access_token(&client, api_base, &app_id, &app_secret).await?;

        Ok(Self {
            client,
            records_url: format!(
                "{}/bitable/v1/apps/{}/tables/{}/records",
                api_base, app_token, table_id
            ),
            access_token,
            columns: config.columns.clone(),
            page_size: dest.page_size,
            max_pages: dest.max_pages,
        })
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

async fn fetch_access_token(
    client: &reqwest::Client,
    api_base: &str,
    app_id: &str,
    app_secret: &str,
) -> Result<String> {
    let resp = client
        .post(format!("{}/auth/v3/tenant_access_token/internal", api_base))
        .header("Content-Type", "application/json; charset=utf-8")
        .json(&json!({ "app_id": app_id, "app_secret": app_secret }))
        .send()
        .await
        .context("Access token request failed")?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        bail!("Access token request returned {}: {}", status, body);
    }

    let token: TokenResponse = resp
        .json()
        .await
        .context("Failed to parse access token response")?;
    if token.code != 0 {
        bail!("Access token rejected (code {}): {}", token.code, token.msg);
    }
    token
        .tenant_access_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| anyhow::anyhow!("Access token response has no token"))
}

/// Check HTTP status and API `code`, returning the `data` payload.
async fn read_response<T: DeserializeOwned>(resp: reqwest::Response, what: &str) -> Result<Option<T>> {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    if !status.is_success() {
        bail!("{} returned {}: {}", what, status, body);
    }

    let parsed: ApiResponse<T> = serde_json::from_str(&body)
        .with_context(|| format!("Failed to parse {} response", what))?;
    if parsed.code != 0 {
        bail!("{} failed (code {}): {}", what, parsed.code, parsed.msg);
    }
    Ok(parsed.data)
}

#[async_trait]
impl RowStore for BitableStore {
    fn name(&self) -> &str {
        "bitable"
    }

    async fn list_rows(&self) -> Result<Vec<DestinationRow>> {
        let mut rows = Vec::new();
        let mut page_token: Option<String> = None;

        for _ in 0..self.max_pages {
            let mut params = vec![("page_size", self.page_size.to_string())];
            if let Some(token) = &page_token {
                params.push(("page_token", token.clone()));
            }

            let resp = self
                .client
                .get(&self.records_url)
                .header("Authorization", self.bearer())
                .query(&params)
                .send()
                .await
                .context("List records request failed")?;

            let Some(page) = read_response::<RecordPage>(resp, "List records").await? else {
                break;
            };
            rows.extend(
                page.items
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|item| row_from_item(item, &self.columns)),
            );

            match page.page_token.filter(|t| page.has_more && !t.is_empty()) {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        Ok(rows)
    }

    async fn insert(&self, fields: &FieldMap) -> Result<String> {
        let resp = self
            .client
            .post(&self.records_url)
            .header("Authorization", self.bearer())
            .json(&json!({ "fields": fields }))
            .send()
            .await
            .context("Create record request failed")?;

        let created = read_response::<CreatedRecord>(resp, "Create record").await?;
        Ok(created.map(|c| c.record.record_id).unwrap_or_default())
    }

    async fn update(&self, row_id: &str, fields: &FieldMap) -> Result<()> {
        let resp = self
            .client
            .put(format!("{}/{}", self.records_url, row_id))
            .header("Authorization", self.bearer())
            .json(&json!({ "fields": fields }))
            .send()
            .await
            .context("Update record request failed")?;

        read_response::<Value>(resp, "Update record").await?;
        Ok(())
    }
}

fn row_from_item(item: RecordItem, columns: &ColumnsConfig) -> Option<DestinationRow> {
    let url = item.fields.get(&columns.url).and_then(cell_text)?;
    let url = url.trim().to_string();
    if url.is_empty() {
        return None;
    }
    let highlight_block = item
        .fields
        .get(&columns.highlights)
        .and_then(cell_text)
        .unwrap_or_default();

    Some(DestinationRow {
        id: item.record_id,
        url,
        highlight_block,
        fields: item.fields,
    })
}

/// Plain text of a cell.
///
/// Text cells come back either as a string or as an array of rich-text
/// segments; hyperlink cells are objects with a `link`.
pub fn cell_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(obj) => obj
            .get("link")
            .or_else(|| obj.get("text"))
            .and_then(|v| v.as_str())
            .map(str::to_string),
        Value::Array(segments) => {
            let text: String = segments
                .iter()
                .filter_map(|seg| match seg {
                    Value::String(s) => Some(s.as_str()),
                    Value::Object(obj) => obj.get("text").and_then(|t| t.as_str()),
                    _ => None,
                })
                .collect();
            Some(text)
        }
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// Translate a [`Record`] into destination columns.
pub fn record_fields(record: &Record, columns: &ColumnsConfig, tags_as_list: bool) -> FieldMap {
    let tags = if tags_as_list {
        json!(record.tags)
    } else {
        json!(record.tags.join(", "))
    };

    let mut fields = FieldMap::new();
    fields.insert(columns.title.clone(), json!(record.title));
    fields.insert(columns.tags.clone(), tags);
    fields.insert(columns.highlights.clone(), json!(record.highlights));
    fields.insert(columns.summary.clone(), json!(record.summary));
    fields.insert(columns.url.clone(), json!(record.url));
    fields.insert(columns.joined_time.clone(), json!(record.joined_time));
    fields
}

/// Fields sent when only the highlight block of a row changed.
pub fn highlight_fields(highlight_block: &str, columns: &ColumnsConfig) -> FieldMap {
    let mut fields = FieldMap::new();
    fields.insert(columns.highlights.clone(), json!(highlight_block));
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> Record {
        Record {
            title: "Scaling laws".to_string(),
            tags: vec!["llm".to_string(), "papers".to_string()],
            highlights: "> q".to_string(),
            summary: "sum".to_string(),
            url: "https://example.com/s".to_string(),
            joined_time: "2024-01-01 08:00:00".to_string(),
        }
    }

    #[test]
    fn test_record_fields_default_columns() {
        let fields = record_fields(&record(), &ColumnsConfig::default(), false);
        assert_eq!(fields["文章标题Article"], json!("Scaling laws"));
        assert_eq!(fields["分类Tags"], json!("llm, papers"));
        assert_eq!(fields["高亮Highlight"], json!("> q"));
        assert_eq!(fields["摘要Summary"], json!("sum"));
        assert_eq!(fields["URL"], json!("https://example.com/s"));
        assert_eq!(fields["加入时间UpdatedTime"], json!("2024-01-01 08:00:00"));
        assert_eq!(fields.len(), 6);
    }

    #[test]
    fn test_record_fields_tags_as_list() {
        let fields = record_fields(&record(), &ColumnsConfig::default(), true);
        assert_eq!(fields["分类Tags"], json!(["llm", "papers"]));
    }

    #[test]
    fn test_highlight_fields_only_touch_highlight_column() {
        let fields = highlight_fields("> new", &ColumnsConfig::default());
        assert_eq!(fields.len(), 1);
        assert_eq!(fields["高亮Highlight"], json!("> new"));
    }

    #[test]
    fn test_cell_text_shapes() {
        assert_eq!(cell_text(&json!("plain")), Some("plain".to_string()));
        assert_eq!(
            cell_text(&json!({"link": "https://a", "text": "A"})),
            Some("https://a".to_string())
        );
        assert_eq!(
            cell_text(&json!([{"type": "text", "text": "> a"}, {"type": "text", "text": "\n> b"}])),
            Some("> a\n> b".to_string())
        );
        assert_eq!(cell_text(&Value::Null), None);
    }

    #[test]
    fn test_parse_record_page() {
        let body = r#"{
            "code": 0,
            "msg": "success",
            "data": {
                "has_more": false,
                "page_token": "",
                "total": 3,
                "items": [
                    {"record_id": "rec1", "fields": {"URL": {"link": "http://a", "text": "http://a"}, "高亮Highlight": "> old"}},
                    {"record_id": "rec2", "fields": {"URL": "http://b"}},
                    {"record_id": "rec3", "fields": {"文章标题Article": "no url"}}
                ]
            }
        }"#;
        let parsed: ApiResponse<RecordPage> = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.code, 0);
        let columns = ColumnsConfig::default();
        let rows: Vec<DestinationRow> = parsed
            .data
            .unwrap()
            .items
            .unwrap()
            .into_iter()
            .filter_map(|item| row_from_item(item, &columns))
            .collect();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id, "rec1");
        assert_eq!(rows[0].url, "http://a");
        assert_eq!(rows[0].highlight_block, "> old");
        assert_eq!(rows[1].highlight_block, "");
    }

    #[test]
    fn test_parse_error_envelope() {
        let body = r#"{"code": 91402, "msg": "NOTEXIST"}"#;
        let parsed: ApiResponse<RecordPage> = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.code, 91402);
        assert!(parsed.data.is_none());
    }

    #[test]
    fn test_parse_token_response() {
        let body = r#"{"code": 0, "msg": "ok", "tenant_access_token": "t-abc", "expire": 7200}"#;
        let parsed: TokenResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.tenant_access_token.as_deref(), Some("t-abc"));
    }
}
