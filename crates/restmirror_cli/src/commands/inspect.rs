//! Inspect command implementation.

use super::open_snapshots;
use restmirror_store::{Method, Selector};
use serde::Serialize;
use std::path::Path;

/// Snapshot inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Snapshot directory.
    pub path: String,
    /// Records loaded across all resources.
    pub record_count: usize,
    /// Snapshot lines that could not be read.
    pub skipped_lines: usize,
    /// Per-resource statistics.
    pub resources: Vec<ResourceStats>,
}

/// Statistics for a single resource.
#[derive(Debug, Default, Serialize)]
pub struct ResourceStats {
    /// Resource name.
    pub name: String,
    /// Records in any state.
    pub records: usize,
    /// Synced records.
    pub synced: usize,
    /// Pending creates.
    pub pending_post: usize,
    /// Pending updates.
    pub pending_put: usize,
    /// Pending deletes.
    pub pending_delete: usize,
    /// Pending records whose last replay failed.
    pub failed: usize,
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let (registry, report) = open_snapshots(path)?;

    let mut result = InspectResult {
        path: path.display().to_string(),
        record_count: report.loaded,
        skipped_lines: report.skipped,
        resources: Vec::new(),
    };

    for name in registry.names() {
        let Some(store) = registry.get(&name) else {
            continue;
        };
        let mut stats = ResourceStats {
            name,
            ..ResourceStats::default()
        };
        for record in store.snapshot(&Selector::all())? {
            stats.records += 1;
            match record.method() {
                Method::Get => stats.synced += 1,
                Method::Post => stats.pending_post += 1,
                Method::Put => stats.pending_put += 1,
                Method::Delete => stats.pending_delete += 1,
            }
            if record.error().is_some() {
                stats.failed += 1;
            }
        }
        result.resources.push(stats);
    }

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

fn print_text_output(result: &InspectResult) {
    println!("Snapshot: {}", result.path);
    println!("  Records loaded: {}", result.record_count);
    if result.skipped_lines > 0 {
        println!("  Skipped lines:  {}", result.skipped_lines);
    }
    println!();
    println!(
        "{:<20} {:>8} {:>8} {:>6} {:>6} {:>6} {:>7}",
        "RESOURCE", "RECORDS", "SYNCED", "POST", "PUT", "DELETE", "FAILED"
    );
    for r in &result.resources {
        println!(
            "{:<20} {:>8} {:>8} {:>6} {:>6} {:>6} {:>7}",
            r.name, r.records, r.synced, r.pending_post, r.pending_put, r.pending_delete, r.failed
        );
    }
}
