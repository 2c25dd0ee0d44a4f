//! Configuration loading and validation.
//!
//! Settings come from an optional TOML file overlaid with environment
//! variables. Secrets are normally supplied through the environment:
//!
//! | Variable | Setting |
//! |----------|---------|
//! | `READWISE_TOKEN` | `source.token` |
//! | `TARGET_TAG` | `source.tag` |
//! | `FEISHU_APP_ID` | `destination.app_id` |
//! | `FEISHU_APP_SECRET` | `destination.app_secret` |
//! | `FEISHU_APP_TOKEN` | `destination.app_token` |
//! | `FEISHU_TABLE_ID` | `destination.table_id` |
//!
//! Validation happens once, in [`load_config`] / [`parse_config`], before
//! any component is constructed.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

pub const ENV_READWISE_TOKEN: &str = "READWISE_TOKEN";
pub const ENV_TARGET_TAG: &str = "TARGET_TAG";
pub const ENV_FEISHU_APP_ID: &str = "FEISHU_APP_ID";
pub const ENV_FEISHU_APP_SECRET: &str = "FEISHU_APP_SECRET";
pub const ENV_FEISHU_APP_TOKEN: &str = "FEISHU_APP_TOKEN";
pub const ENV_FEISHU_TABLE_ID: &str = "FEISHU_TABLE_ID";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required settings: {}", .0.join(", "))]
    MissingSettings(Vec<&'static str>),
    #[error("invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Which settings a command needs before it may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// Nothing is required; only ranges are checked (`check`).
    Inspect,
    /// Source only (`preview`).
    Source,
    /// Source and destination (`sync`).
    Full,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub destination: DestinationConfig,
    #[serde(default)]
    pub mapping: MappingConfig,
    #[serde(default)]
    pub columns: ColumnsConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    #[serde(default = "default_source_api_base")]
    pub api_base: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_tag")]
    pub tag: String,
    #[serde(default = "default_source_page_size")]
    pub page_size: u32,
    #[serde(default)]
    pub category: Option<String>,
    /// Document pages per listing; highlight listings ignore it.
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    /// Only fetch documents modified within this many hours.
    #[serde(default)]
    pub lookback_hours: Option<u32>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            api_base: default_source_api_base(),
            token: None,
            tag: default_tag(),
            page_size: default_source_page_size(),
            category: None,
            max_pages: default_max_pages(),
            lookback_hours: None,
        }
    }
}

fn default_source_api_base() -> String {
    "https://readwise.io/api/v3".to_string()
}
fn default_tag() -> String {
    "ai101".to_string()
}
fn default_source_page_size() -> u32 {
    100
}
fn default_max_pages() -> u32 {
    1
}

#[derive(Debug, Deserialize, Clone)]
pub struct DestinationConfig {
    #[serde(default = "default_destination_api_base")]
    pub api_base: String,
    #[serde(default)]
    pub app_id: Option<String>,
    #[serde(default)]
    pub app_secret: Option<String>,
    #[serde(default)]
    pub app_token: Option<String>,
    #[serde(default)]
    pub table_id: Option<String>,
    #[serde(default = "default_destination_page_size")]
    pub page_size: u32,
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
}

impl Default for DestinationConfig {
    fn default() -> Self {
        Self {
            api_base: default_destination_api_base(),
            app_id: None,
            app_secret: None,
            app_token: None,
            table_id: None,
            page_size: default_destination_page_size(),
            max_pages: default_max_pages(),
        }
    }
}

fn default_destination_api_base() -> String {
    "https://open.feishu.cn/open-apis".to_string()
}
fn default_destination_page_size() -> u32 {
    500
}

#[derive(Debug, Deserialize, Clone)]
pub struct MappingConfig {
    /// Tag stripped from the tag column. Defaults to `source.tag`.
    #[serde(default)]
    pub marker_tag: Option<String>,
    #[serde(default = "default_utc_offset_hours")]
    pub utc_offset_hours: i32,
    /// Emit tags as a list (multi-select column) instead of a joined string.
    #[serde(default)]
    pub tags_as_list: bool,
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            marker_tag: None,
            utc_offset_hours: default_utc_offset_hours(),
            tags_as_list: false,
        }
    }
}

fn default_utc_offset_hours() -> i32 {
    8
}

/// Destination column names, keyed by [`Record`](crate::models::Record) field.
#[derive(Debug, Deserialize, Clone)]
pub struct ColumnsConfig {
    #[serde(default = "default_title_column")]
    pub title: String,
    #[serde(default = "default_tags_column")]
    pub tags: String,
    #[serde(default = "default_highlights_column")]
    pub highlights: String,
    #[serde(default = "default_summary_column")]
    pub summary: String,
    #[serde(default = "default_url_column")]
    pub url: String,
    #[serde(default = "default_joined_time_column")]
    pub joined_time: String,
}

impl Default for ColumnsConfig {
    fn default() -> Self {
        Self {
            title: default_title_column(),
            tags: default_tags_column(),
            highlights: default_highlights_column(),
            summary: default_summary_column(),
            url: default_url_column(),
            joined_time: default_joined_time_column(),
        }
    }
}

fn default_title_column() -> String {
    "文章标题Article".to_string()
}
fn default_tags_column() -> String {
    "分类Tags".to_string()
}
fn default_highlights_column() -> String {
    "高亮Highlight".to_string()
}
fn default_summary_column() -> String {
    "摘要Summary".to_string()
}
fn default_url_column() -> String {
    "URL".to_string()
}
fn default_joined_time_column() -> String {
    "加入时间UpdatedTime".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

impl Config {
    /// The tag removed from the tag column before display.
    pub fn marker_tag(&self) -> &str {
        self.mapping
            .marker_tag
            .as_deref()
            .unwrap_or(&self.source.tag)
    }

    /// Settings that are required for `requirement` but not set, named by
    /// their environment variable.
    pub fn missing_settings(&self, requirement: Requirement) -> Vec<&'static str> {
        let mut required = Vec::new();
        if requirement != Requirement::Inspect {
            required.push((ENV_READWISE_TOKEN, &self.source.token));
        }
        if requirement == Requirement::Full {
            required.extend([
                (ENV_FEISHU_APP_ID, &self.destination.app_id),
                (ENV_FEISHU_APP_SECRET, &self.destination.app_secret),
                (ENV_FEISHU_APP_TOKEN, &self.destination.app_token),
                (ENV_FEISHU_TABLE_ID, &self.destination.table_id),
            ]);
        }

        required
            .into_iter()
            .filter(|(_, value)| !is_set(value))
            .map(|(name, _)| name)
            .collect()
    }

    /// Check required settings and value ranges.
    pub fn validate(&self, requirement: Requirement) -> Result<(), ConfigError> {
        let missing = self.missing_settings(requirement);
        if !missing.is_empty() {
            return Err(ConfigError::MissingSettings(missing));
        }

        if self.source.tag.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "source.tag",
                reason: "must not be empty".to_string(),
            });
        }
        if self.source.page_size == 0 {
            return Err(ConfigError::Invalid {
                key: "source.page_size",
                reason: "must be > 0".to_string(),
            });
        }
        if self.destination.page_size == 0 {
            return Err(ConfigError::Invalid {
                key: "destination.page_size",
                reason: "must be > 0".to_string(),
            });
        }
        if self.source.max_pages == 0 || self.destination.max_pages == 0 {
            return Err(ConfigError::Invalid {
                key: "max_pages",
                reason: "must be >= 1".to_string(),
            });
        }
        if !(-23..=23).contains(&self.mapping.utc_offset_hours) {
            return Err(ConfigError::Invalid {
                key: "mapping.utc_offset_hours",
                reason: format!("{} is outside -23..=23", self.mapping.utc_offset_hours),
            });
        }

        Ok(())
    }

    /// Apply environment overrides. Empty variables are ignored.
    fn apply_env(&mut self, env: &dyn Fn(&str) -> Option<String>) {
        let get = |name: &str| env(name).filter(|v| !v.trim().is_empty());

        if let Some(v) = get(ENV_READWISE_TOKEN) {
            self.source.token = Some(v);
        }
        if let Some(v) = get(ENV_TARGET_TAG) {
            self.source.tag = v;
        }
        if let Some(v) = get(ENV_FEISHU_APP_ID) {
            self.destination.app_id = Some(v);
        }
        if let Some(v) = get(ENV_FEISHU_APP_SECRET) {
            self.destination.app_secret = Some(v);
        }
        if let Some(v) = get(ENV_FEISHU_APP_TOKEN) {
            self.destination.app_token = Some(v);
        }
        if let Some(v) = get(ENV_FEISHU_TABLE_ID) {
            self.destination.table_id = Some(v);
        }
    }
}

fn is_set(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

/// Load configuration from `path` (if it exists) and the process environment.
///
/// When `explicit` is false a missing file is treated as an empty one, so the
/// tool can run from environment variables alone.
pub fn load_config(path: &Path, explicit: bool, requirement: Requirement) -> Result<Config> {
    let content = if path.exists() || explicit {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?
    } else {
        String::new()
    };

    parse_config(&content, &|name| std::env::var(name).ok(), requirement)
}

/// Parse TOML `content`, overlay `env`, and validate for `requirement`.
pub fn parse_config(
    content: &str,
    env: &dyn Fn(&str) -> Option<String>,
    requirement: Requirement,
) -> Result<Config> {
    let mut config: Config =
        toml::from_str(content).with_context(|| "Failed to parse config file")?;
    config.apply_env(env);
    config.validate(requirement)?;
    Ok(config)
}
