//! Diff between fetched documents and the destination snapshot.
//!
//! Each candidate is classified by its URL and its rendered highlight block:
//!
//! | Snapshot has URL? | Block equal? | Decision |
//! |-------------------|--------------|----------|
//! | no  | —   | insert |
//! | yes | no  | update highlight column |
//! | yes | yes | skip |
//!
//! Comparison is exact string equality. Rows missing from the candidates are
//! never touched; the sync only adds and updates.

use std::collections::{HashMap, HashSet};

use crate::mapper::render_highlight_block;
use crate::models::{DestinationRow, Document, SyncDecision};

/// Destination rows keyed by URL.
pub type Snapshot = HashMap<String, DestinationRow>;

/// An existing row paired with its new highlight block.
#[derive(Debug, Clone, PartialEq)]
pub struct RowUpdate<'a> {
    pub row: &'a DestinationRow,
    pub document: &'a Document,
    pub highlight_block: String,
}

/// Result of reconciling one batch of candidates.
#[derive(Debug, Default)]
pub struct ReconcilePlan<'a> {
    pub to_insert: Vec<&'a Document>,
    pub to_update: Vec<RowUpdate<'a>>,
    pub skipped: usize,
    /// Candidates without a URL.
    pub dropped: usize,
    /// Candidates whose URL already appeared earlier in the batch.
    pub duplicates: usize,
}

impl ReconcilePlan<'_> {
    pub fn is_noop(&self) -> bool {
        self.to_insert.is_empty() && self.to_update.is_empty()
    }
}

/// Index rows by URL, keeping the first row seen for each URL.
///
/// Rows with a blank URL cannot be matched and are left out.
pub fn build_snapshot(rows: Vec<DestinationRow>) -> Snapshot {
    let mut snapshot = Snapshot::with_capacity(rows.len());
    for row in rows {
        let url = row.url.trim().to_string();
        if url.is_empty() {
            continue;
        }
        if snapshot.contains_key(&url) {
            tracing::debug!(url = %url, row_id = %row.id, "duplicate destination row ignored");
            continue;
        }
        snapshot.insert(url, row);
    }
    snapshot
}

/// Classify a single document against the snapshot.
///
/// Documents without a URL are skipped.
pub fn decide<'a>(snapshot: &'a Snapshot, doc: &'a Document) -> SyncDecision<'a> {
    let Some(url) = doc.url() else {
        return SyncDecision::Skip;
    };

    match snapshot.get(url) {
        None => SyncDecision::Insert(doc),
        Some(row) => {
            let block = render_highlight_block(&doc.highlights);
            if block == row.highlight_block {
                SyncDecision::Skip
            } else {
                SyncDecision::Update {
                    row,
                    highlight_block: block,
                }
            }
        }
    }
}

/// Split `candidates` into inserts, updates and skips.
pub fn reconcile<'a>(snapshot: &'a Snapshot, candidates: &'a [Document]) -> ReconcilePlan<'a> {
    let mut plan = ReconcilePlan::default();
    let mut seen: HashSet<&str> = HashSet::new();

    for doc in candidates {
        let Some(url) = doc.url() else {
            plan.dropped += 1;
            continue;
        };
        if !seen.insert(url) {
            tracing::debug!(url, doc_id = %doc.id, "duplicate candidate URL ignored");
            plan.duplicates += 1;
            continue;
        }

        match decide(snapshot, doc) {
            SyncDecision::Insert(doc) => plan.to_insert.push(doc),
            SyncDecision::Update {
                row,
                highlight_block,
            } => plan.to_update.push(RowUpdate {
                row,
                document: doc,
                highlight_block,
            }),
            SyncDecision::Skip => plan.skipped += 1,
        }
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Highlight;

    fn row(id: &str, url: &str, block: &str) -> DestinationRow {
        DestinationRow {
            id: id.to_string(),
            url: url.to_string(),
            highlight_block: block.to_string(),
            ..Default::default()
        }
    }

    fn doc(id: &str, url: Option<&str>, highlights: &[&str]) -> Document {
        Document {
            id: id.to_string(),
            source_url: url.map(str::to_string),
            highlights: highlights
                .iter()
                .map(|text| Highlight {
                    parent_id: id.to_string(),
                    text: text.to_string(),
                    note: None,
                })
                .collect(),
            ..Default::default()
        }
    }

    fn snapshot_a() -> Snapshot {
        build_snapshot(vec![row("1", "http://a", "> old")])
    }

    #[test]
    fn test_unchanged_skipped_and_new_inserted() {
        let snapshot = snapshot_a();
        let candidates = vec![doc("a", Some("http://a"), &["old"]), doc("b", Some("http://b"), &[])];

        let plan = reconcile(&snapshot, &candidates);
        assert_eq!(plan.to_insert.len(), 1);
        assert_eq!(plan.to_insert[0].id, "b");
        assert!(plan.to_update.is_empty());
        assert_eq!(plan.skipped, 1);
    }

    #[test]
    fn test_changed_block_updates_existing_row() {
        let snapshot = snapshot_a();
        let candidates = vec![doc("a", Some("http://a"), &["new"])];

        let plan = reconcile(&snapshot, &candidates);
        assert!(plan.to_insert.is_empty());
        assert_eq!(plan.to_update.len(), 1);
        assert_eq!(plan.to_update[0].row.id, "1");
        assert_eq!(plan.to_update[0].highlight_block, "> new");
        assert_eq!(plan.skipped, 0);
    }

    #[test]
    fn test_missing_url_dropped() {
        let snapshot = snapshot_a();
        let candidates = vec![doc("x", None, &["t"]), doc("y", Some("   "), &[])];

        let plan = reconcile(&snapshot, &candidates);
        assert!(plan.is_noop());
        assert_eq!(plan.dropped, 2);
        assert_eq!(plan.skipped, 0);
    }

    #[test]
    fn test_whitespace_difference_is_a_change() {
        let snapshot = build_snapshot(vec![row("1", "http://a", "> old ")]);
        let candidates = vec![doc("a", Some("http://a"), &["old"])];

        let plan = reconcile(&snapshot, &candidates);
        assert_eq!(plan.to_update.len(), 1);
    }

    #[test]
    fn test_empty_block_matches_empty_row() {
        let snapshot = build_snapshot(vec![row("1", "http://a", "")]);
        let candidates = vec![doc("a", Some("http://a"), &[])];

        let plan = reconcile(&snapshot, &candidates);
        assert!(plan.is_noop());
        assert_eq!(plan.skipped, 1);
    }

    #[test]
    fn test_duplicate_candidate_urls_inserted_once() {
        let snapshot = Snapshot::new();
        let candidates = vec![doc("a", Some("http://n"), &[]), doc("b", Some("http://n"), &[])];

        let plan = reconcile(&snapshot, &candidates);
        assert_eq!(plan.to_insert.len(), 1);
        assert_eq!(plan.to_insert[0].id, "a");
        assert_eq!(plan.duplicates, 1);
    }

    #[test]
    fn test_no_candidates_is_noop() {
        let snapshot = snapshot_a();
        let plan = reconcile(&snapshot, &[]);
        assert!(plan.is_noop());
        assert_eq!(plan.skipped, 0);
    }

    #[test]
    fn test_snapshot_keeps_first_row_per_url() {
        let snapshot = build_snapshot(vec![
            row("1", "http://a", "first"),
            row("2", "http://a", "second"),
            row("3", "", "orphan"),
        ]);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot["http://a"].id, "1");
    }

    #[test]
    fn test_decide_variants() {
        let snapshot = snapshot_a();
        let same = doc("a", Some("http://a"), &["old"]);
        let changed = doc("a", Some("http://a"), &["new"]);
        let fresh = doc("b", Some("http://b"), &[]);

        assert_eq!(decide(&snapshot, &same), SyncDecision::Skip);
        assert_eq!(
            decide(&snapshot, &changed),
            SyncDecision::Update {
                row: &snapshot["http://a"],
                highlight_block: "> new".to_string(),
            }
        );
        assert_eq!(decide(&snapshot, &fresh), SyncDecision::Insert(&fresh));

        match decide(&snapshot, &changed) {
            SyncDecision::Update { row, .. } => assert_eq!(row.id, "1"),
            other => panic!("expected update, got {:?}", other),
        }
    }

    #[test]
    fn test_second_pass_after_applying_plan_is_noop() {
        let mut rows = vec![row("1", "http://a", "> old")];
        let candidates = vec![
            doc("a", Some("http://a"), &["new"]),
            doc("b", Some("http://b"), &["fresh"]),
        ];

        {
            let snapshot = build_snapshot(rows.clone());
            let plan = reconcile(&snapshot, &candidates);
            for update in &plan.to_update {
                let target = rows.iter_mut().find(|r| r.id == update.row.id).unwrap();
                target.highlight_block = update.highlight_block.clone();
            }
            for (i, inserted) in plan.to_insert.iter().enumerate() {
                rows.push(row(
                    &format!("new{}", i),
                    inserted.url().unwrap(),
                    &render_highlight_block(&inserted.highlights),
                ));
            }
        }

        let snapshot = build_snapshot(rows);
        let plan = reconcile(&snapshot, &candidates);
        assert!(plan.is_noop());
        assert_eq!(plan.skipped, 2);
    }
}
