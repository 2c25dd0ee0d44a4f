//! Collaborator seams for the sync pipeline.
//!
//! The pipeline talks to the reading service through [`DocumentSource`] and
//! to the table through [`RowStore`]. The built-in implementations are
//! [`ReadwiseSource`](crate::connector_readwise::ReadwiseSource) and
//! [`BitableStore`](crate::connector_bitable::BitableStore); tests plug in
//! in-memory versions.
//!
//! ```text
//! DocumentSource ──▶ FieldMapper ──▶ reconcile() ◀── RowStore::list_rows
//!                                        │
//!                                        ▼
//!                          RowStore::insert / RowStore::update
//! ```

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::models::{DestinationRow, Document, Highlight};

/// Column name → cell value, as sent to the destination.
pub type FieldMap = Map<String, Value>;

/// A read-it-later service that produces tagged documents and highlights.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use anyhow::Result;
/// use chrono::{DateTime, Utc};
/// use readsync::models::{Document, Highlight};
/// use readsync::traits::DocumentSource;
///
/// struct Empty;
///
/// #[async_trait]
/// impl DocumentSource for Empty {
///     fn name(&self) -> &str { "empty" }
///
///     async fn list_documents(
///         &self,
///         _tag: &str,
///         _modified_after: Option<DateTime<Utc>>,
///     ) -> Result<Vec<Document>> {
///         Ok(vec![])
///     }
///
///     async fn list_highlights(&self, _parent_ids: &[String]) -> Result<Vec<Highlight>> {
///         Ok(vec![])
///     }
/// }
/// ```
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Short label used in logs and the run summary.
    fn name(&self) -> &str;

    /// Documents carrying `tag`, optionally only those modified after
    /// `modified_after`. Highlights are not attached.
    async fn list_documents(
        &self,
        tag: &str,
        modified_after: Option<DateTime<Utc>>,
    ) -> Result<Vec<Document>>;

    /// Highlights whose parent is one of `parent_ids`.
    async fn list_highlights(&self, parent_ids: &[String]) -> Result<Vec<Highlight>>;
}

/// A table of rows keyed by source URL.
#[async_trait]
pub trait RowStore: Send + Sync {
    fn name(&self) -> &str;

    /// Current rows. May contain several rows for one URL; the caller dedups.
    async fn list_rows(&self) -> Result<Vec<DestinationRow>>;

    /// Create a row, returning its id.
    async fn insert(&self, fields: &FieldMap) -> Result<String>;

    /// Overwrite the given columns of an existing row.
    async fn update(&self, row_id: &str, fields: &FieldMap) -> Result<()>;
}

/// Attach each highlight to its parent document, in source order.
///
/// Highlights whose parent is not among `docs` are discarded. Returns the
/// number of highlights attached.
pub fn attach_highlights(docs: &mut [Document], highlights: Vec<Highlight>) -> usize {
    let mut attached = 0;
    for highlight in highlights {
        if let Some(doc) = docs.iter_mut().find(|d| d.id == highlight.parent_id) {
            doc.highlights.push(highlight);
            attached += 1;
        }
    }
    attached
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hl(parent: &str, text: &str) -> Highlight {
        Highlight {
            parent_id: parent.to_string(),
            text: text.to_string(),
            note: None,
        }
    }

    #[test]
    fn test_attach_highlights_groups_by_parent() {
        let mut docs = vec![
            Document {
                id: "a".to_string(),
                ..Default::default()
            },
            Document {
                id: "b".to_string(),
                ..Default::default()
            },
        ];
        let attached = attach_highlights(
            &mut docs,
            vec![hl("a", "1"), hl("b", "2"), hl("zzz", "orphan"), hl("a", "3")],
        );

        assert_eq!(attached, 3);
        let a: Vec<_> = docs[0].highlights.iter().map(|h| h.text.as_str()).collect();
        assert_eq!(a, vec!["1", "3"]);
        assert_eq!(docs[1].highlights.len(), 1);
    }
}
