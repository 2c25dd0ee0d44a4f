//! Sync pipeline orchestration.
//!
//! Coordinates one run: source listing → highlight grouping → destination
//! snapshot → reconcile → per-row writes. Every remote call is awaited in
//! turn. Listing failures degrade to empty collections and write failures
//! are counted, so a run always finishes with a report.

use anyhow::{bail, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::config::Config;
use crate::connector_bitable::{highlight_fields, record_fields, BitableStore};
use crate::connector_readwise::ReadwiseSource;
use crate::mapper::FieldMapper;
use crate::models::{Document, SyncReport};
use crate::reconcile::{build_snapshot, reconcile};
use crate::traits::{attach_highlights, DocumentSource, RowStore};

/// Per-run switches from the command line.
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Compute the plan but write nothing.
    pub dry_run: bool,
    /// Ignore any time window and fetch every tagged document.
    pub full: bool,
    /// Explicit lower bound on modification time.
    pub since: Option<DateTime<Utc>>,
    /// Only consider the first N fetched documents.
    pub limit: Option<usize>,
}

/// Parse a `--since` value: RFC 3339 or `YYYY-MM-DD` (midnight UTC).
pub fn parse_since(value: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    match NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        Ok(date) => match date.and_hms_opt(0, 0, 0) {
            Some(midnight) => Ok(midnight.and_utc()),
            None => bail!("Invalid --since date: '{}'", value),
        },
        Err(_) => bail!(
            "Invalid --since value: '{}'. Expected RFC 3339 or YYYY-MM-DD",
            value
        ),
    }
}

/// Resolve the "modified after" bound for this run.
///
/// `--full` disables the window, `--since` wins over `source.lookback_hours`.
pub fn modified_after(
    config: &Config,
    opts: &SyncOptions,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    if opts.full {
        return None;
    }
    opts.since.or_else(|| {
        config
            .source
            .lookback_hours
            .map(|hours| now - Duration::hours(i64::from(hours)))
    })
}

/// Fetch tagged documents and attach their highlights.
///
/// Returns the documents and the number of highlights attached. Either
/// listing failing yields what could be fetched.
pub async fn fetch_candidates(
    config: &Config,
    source: &dyn DocumentSource,
    opts: &SyncOptions,
) -> (Vec<Document>, usize) {
    let after = modified_after(config, opts, Utc::now());

    let mut docs = source
        .list_documents(&config.source.tag, after)
        .await
        .unwrap_or_else(|e| {
            tracing::warn!(source = source.name(), error = %e, "document listing failed");
            Vec::new()
        });
    if let Some(limit) = opts.limit {
        docs.truncate(limit);
    }
    if docs.is_empty() {
        return (docs, 0);
    }

    let ids: Vec<String> = docs.iter().map(|d| d.id.clone()).collect();
    let highlights = source.list_highlights(&ids).await.unwrap_or_else(|e| {
        tracing::warn!(source = source.name(), error = %e, "highlight listing failed");
        Vec::new()
    });
    let attached = attach_highlights(&mut docs, highlights);

    (docs, attached)
}

/// Run one sync against the given collaborators.
pub async fn run_sync_with(
    config: &Config,
    source: &dyn DocumentSource,
    store: &dyn RowStore,
    opts: &SyncOptions,
) -> Result<SyncReport> {
    let mut report = SyncReport::default();

    let (docs, highlights) = fetch_candidates(config, source, opts).await;
    report.fetched = docs.len();
    report.highlights = highlights;
    tracing::info!(documents = docs.len(), highlights, "fetched candidates");

    if docs.is_empty() {
        return Ok(report);
    }

    let rows = store.list_rows().await.unwrap_or_else(|e| {
        tracing::warn!(store = store.name(), error = %e, "row listing failed");
        Vec::new()
    });
    let snapshot = build_snapshot(rows);
    report.existing_rows = snapshot.len();

    let plan = reconcile(&snapshot, &docs);
    report.skipped = plan.skipped;
    report.dropped = plan.dropped;
    report.duplicates = plan.duplicates;

    if opts.dry_run {
        report.inserted = plan.to_insert.len();
        report.updated = plan.to_update.len();
        return Ok(report);
    }

    let mapper = FieldMapper::from_config(config);

    for doc in &plan.to_insert {
        let record = mapper.map(doc);
        let fields = record_fields(&record, &config.columns, config.mapping.tags_as_list);
        tracing::debug!(fields = %serde_json::Value::Object(fields.clone()), "insert payload");

        match store.insert(&fields).await {
            Ok(row_id) => {
                report.inserted += 1;
                tracing::info!(title = %record.title, row_id = %row_id, "inserted");
            }
            Err(e) => {
                report.failed += 1;
                tracing::error!(title = %record.title, error = %e, "insert failed");
            }
        }
    }

    for update in &plan.to_update {
        let fields = highlight_fields(&update.highlight_block, &config.columns);
        let title = update.document.title.as_deref().unwrap_or_default();

        match store.update(&update.row.id, &fields).await {
            Ok(()) => {
                report.updated += 1;
                tracing::info!(title, row_id = %update.row.id, "updated highlights");
            }
            Err(e) => {
                report.failed += 1;
                tracing::error!(title, row_id = %update.row.id, error = %e, "update failed");
            }
        }
    }

    Ok(report)
}

/// `readsync sync`: build the real connectors, run, print the summary.
pub async fn run_sync(config: &Config, opts: &SyncOptions) -> Result<()> {
    let source = ReadwiseSource::new(config)?;

    let store = match BitableStore::connect(config).await {
        Ok(store) => store,
        Err(e) => {
            tracing::error!(error = %e, "could not obtain bitable access token");
            println!("sync {} → bitable", config.source.tag);
            println!("  aborted: no access token ({})", e);
            return Ok(());
        }
    };

    let report = run_sync_with(config, &source, &store, opts).await?;
    print_report(&config.source.tag, &report, opts.dry_run);
    Ok(())
}

pub fn print_report(tag: &str, report: &SyncReport, dry_run: bool) {
    if dry_run {
        println!("sync {} → bitable (dry-run)", tag);
    } else {
        println!("sync {} → bitable", tag);
    }
    println!("  fetched: {} documents", report.fetched);
    println!("  highlights: {}", report.highlights);
    if report.fetched == 0 {
        println!("  nothing to sync");
        println!("ok");
        return;
    }
    println!("  existing rows: {}", report.existing_rows);
    if dry_run {
        println!("  would insert: {}", report.inserted);
        println!("  would update: {}", report.updated);
    } else {
        println!("  inserted: {}", report.inserted);
        println!("  updated: {}", report.updated);
    }
    println!("  skipped: {}", report.skipped);
    if report.dropped > 0 {
        println!("  without url: {}", report.dropped);
    }
    if report.duplicates > 0 {
        println!("  duplicate urls: {}", report.duplicates);
    }
    if !dry_run {
        println!("  failed: {}", report.failed);
    }
    println!("ok");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_since_formats() {
        assert_eq!(
            parse_since("2024-05-01").unwrap(),
            Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(
            parse_since("2024-05-01T08:00:00+08:00").unwrap(),
            Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()
        );
        assert!(parse_since("last week").is_err());
    }

    #[test]
    fn test_modified_after_precedence() {
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap();
        let mut config = Config::default();
        config.source.lookback_hours = Some(24);

        let opts = SyncOptions::default();
        assert_eq!(
            modified_after(&config, &opts, now),
            Some(Utc.with_ymd_and_hms(2024, 5, 9, 12, 0, 0).unwrap())
        );

        let since = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let opts = SyncOptions {
            since: Some(since),
            ..Default::default()
        };
        assert_eq!(modified_after(&config, &opts, now), Some(since));

        let opts = SyncOptions {
            since: Some(since),
            full: true,
            ..Default::default()
        };
        assert_eq!(modified_after(&config, &opts, now), None);

        config.source.lookback_hours = None;
        assert_eq!(modified_after(&config, &SyncOptions::default(), now), None);
    }
}
