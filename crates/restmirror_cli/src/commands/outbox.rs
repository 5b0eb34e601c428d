//! Outbox command implementation.

use super::{offline_outbox, open_snapshots};
use restmirror_sync::MirrorConfig;
use serde::Serialize;
use std::path::Path;

/// One pending write, as shown to the user.
#[derive(Debug, Serialize)]
pub struct PendingEntry {
    /// Position in replay order, starting at 1.
    pub position: usize,
    /// Resource name.
    pub resource: String,
    /// Record key.
    pub key: String,
    /// Pending method.
    pub method: String,
    /// Write time (ms).
    pub time: i64,
    /// Last replay failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Runs the outbox command.
pub fn run(path: &Path, limit: Option<usize>, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let (registry, _) = open_snapshots(path)?;
    let outbox = offline_outbox(&registry, &MirrorConfig::default());
    let pending = outbox.outbox()?;
    let total = pending.len();

    let entries: Vec<PendingEntry> = pending
        .into_iter()
        .take(limit.unwrap_or(usize::MAX))
        .enumerate()
        .map(|(i, p)| PendingEntry {
            position: i + 1,
            resource: p.resource,
            method: p.record.method().as_str().to_string(),
            time: p.record.time,
            error: p.record.error().map(str::to_string),
            key: p.record.key,
        })
        .collect();

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        _ => {
            println!("{} pending write(s)", total);
            for e in &entries {
                println!(
                    "{:>4}. {:<6} {:<16} {} @ {}",
                    e.position, e.method, e.resource, e.key, e.time
                );
                if let Some(error) = &e.error {
                    println!("        error: {}", error);
                }
            }
            if let Some(head) = entries.first().filter(|e| e.error.is_some()) {
                println!();
                println!(
                    "Replay is blocked on {}. Use `resolve` to re-queue or discard it.",
                    head.key
                );
            }
        }
    }

    Ok(())
}
