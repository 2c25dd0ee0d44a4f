//! Core data models used throughout readsync.
//!
//! These types represent the documents and highlights pulled from the
//! reading service, the rows read back from the bitable, and the decisions
//! and reports produced by a sync run.

use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// A tagged document fetched from the reading service.
///
/// Timestamps are kept as the raw strings the API returned so the field
/// mapper can fall back to them verbatim when they fail to parse.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    pub id: String,
    pub title: Option<String>,
    pub tags: BTreeSet<String>,
    pub summary: Option<String>,
    pub source_url: Option<String>,
    pub updated_at: Option<String>,
    pub created_at: Option<String>,
    pub highlights: Vec<Highlight>,
}

impl Document {
    /// The natural key shared with destination rows, if the document has one.
    pub fn url(&self) -> Option<&str> {
        self.source_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
    }
}

/// A highlight annotation belonging to a [`Document`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Highlight {
    pub parent_id: String,
    pub text: String,
    pub note: Option<String>,
}

/// A row already present in the destination table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DestinationRow {
    /// Opaque id assigned by the destination store.
    pub id: String,
    pub url: String,
    /// The highlight block as currently stored in the row.
    pub highlight_block: String,
    pub fields: BTreeMap<String, Value>,
}

/// Flat, typed view of one document as it should appear in the table.
///
/// Column names are not part of this type; they are applied at the
/// destination boundary from the `[columns]` config section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Record {
    pub title: String,
    pub tags: Vec<String>,
    pub highlights: String,
    pub summary: String,
    pub url: String,
    pub joined_time: String,
}

/// What a sync run should do with a single candidate document.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncDecision<'a> {
    Insert(&'a Document),
    /// Rewrite the highlight column of `row` (its `id` is the row id).
    Update {
        row: &'a DestinationRow,
        highlight_block: String,
    },
    Skip,
}

/// Aggregate counts for one sync run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub fetched: usize,
    pub highlights: usize,
    pub existing_rows: usize,
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
    pub dropped: usize,
    pub duplicates: usize,
}
