//! `readsync preview`: show what the table rows would look like.
//!
//! Fetches candidates from the source and prints the mapped records. The
//! destination is never contacted, so only source settings are required.

use anyhow::Result;

use crate::config::Config;
use crate::connector_readwise::ReadwiseSource;
use crate::mapper::FieldMapper;
use crate::models::Record;
use crate::sync::{fetch_candidates, SyncOptions};

pub async fn run_preview(config: &Config, opts: &SyncOptions) -> Result<()> {
    let source = ReadwiseSource::new(config)?;
    let (docs, highlights) = fetch_candidates(config, &source, opts).await;

    let mapper = FieldMapper::from_config(config);
    let records: Vec<Record> = docs.iter().map(|d| mapper.map(d)).collect();

    println!(
        "preview {}: {} documents, {} highlights",
        config.source.tag,
        records.len(),
        highlights
    );
    for record in &records {
        println!();
        print!("{}", format_record(record));
    }
    Ok(())
}

/// Human-readable block for one record.
pub fn format_record(record: &Record) -> String {
    let mut out = String::new();
    out.push_str(&format!("title:   {}\n", record.title));
    out.push_str(&format!("url:     {}\n", display_or_dash(&record.url)));
    out.push_str(&format!("tags:    {}\n", record.tags.join(", ")));
    out.push_str(&format!("joined:  {}\n", display_or_dash(&record.joined_time)));
    if !record.summary.is_empty() {
        out.push_str(&format!("summary: {}\n", record.summary));
    }
    if !record.highlights.is_empty() {
        out.push_str("highlights:\n");
        for line in record.highlights.lines() {
            out.push_str(&format!("  {}\n", line));
        }
    }
    out
}

fn display_or_dash(value: &str) -> &str {
    if value.is_empty() {
        "-"
    } else {
        value
    }
}
