//! JSON-lines snapshots of a store.
//!
//! One record per line, in the flat camelCase layout of [`Record`]'s
//! serde form. Saves go through a temporary file that is renamed into
//! place, so a crash mid-save leaves the previous snapshot intact.

use crate::error::StoreResult;
use crate::memory::MemoryStore;
use crate::record::Record;
use crate::selector::Selector;
use crate::store::DocumentStore;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use tracing::{debug, warn};

/// Outcome of loading a snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Records restored.
    pub loaded: usize,
    /// Lines skipped because they were malformed or carried an unknown
    /// sync state.
    pub skipped: usize,
}

/// Writes every record of `store` to `path`.
///
/// Returns the number of records written.
///
/// # Errors
///
/// Returns an error if the store is closed or the file cannot be written.
pub fn save(store: &dyn DocumentStore, path: &Path) -> StoreResult<usize> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let records = store.snapshot(&Selector::all())?;
    let tmp = path.with_extension("jsonl.tmp");
    {
        let mut writer = BufWriter::new(File::create(&tmp)?);
        for record in &records {
            serde_json::to_writer(&mut writer, record)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()?;
    }
    fs::rename(&tmp, path)?;

    debug!(store = store.name(), path = %path.display(), records = records.len(), "Snapshot saved");
    Ok(records.len())
}

/// Reads `path` into an existing store, upserting each record.
///
/// Malformed lines and records with an unknown sync state are logged and
/// skipped rather than failing the load.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the store rejects a write.
pub fn load_into(store: &dyn DocumentStore, path: &Path) -> StoreResult<LoadReport> {
    let reader = BufReader::new(File::open(path)?);
    let mut report = LoadReport::default();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Record>(&line) {
            Ok(record) => {
                store.upsert(record)?;
                report.loaded += 1;
            }
            Err(err) => {
                warn!(
                    store = store.name(),
                    line = index + 1,
                    error = %err,
                    "Skipping unreadable snapshot record"
                );
                report.skipped += 1;
            }
        }
    }

    Ok(report)
}

/// Restores a new [`MemoryStore`] named `name` from `path`.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn load(path: &Path, name: &str) -> StoreResult<(MemoryStore, LoadReport)> {
    let store = MemoryStore::new(name);
    let report = load_into(&store, path)?;
    Ok((store, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{FileField, Outbound, SyncState};
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn save_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("items.jsonl");

        let store = MemoryStore::new("items");
        store
            .upsert(Record::synced("t____/items/1/", Some(json!({"id": 1})), 5))
            .unwrap();
        store
            .upsert(
                Record::synced("t____/items/2/", Some(json!({"id": 2})), 6).with_state(
                    SyncState::Post {
                        outbound: Outbound::default(),
                        file_fields: vec![FileField::new("doc", "a.txt", b"hi".to_vec())],
                    },
                ),
            )
            .unwrap();

        assert_eq!(save(&store, &path).unwrap(), 2);

        let (restored, report) = load(&path, "items").unwrap();
        assert_eq!(report, LoadReport { loaded: 2, skipped: 0 });
        assert_eq!(
            restored.snapshot(&Selector::all()).unwrap(),
            store.snapshot(&Selector::all()).unwrap()
        );
    }

    #[test]
    fn unknown_states_are_skipped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("items.jsonl");
        let good = serde_json::to_string(&Record::synced("k/1/", None, 1)).unwrap();
        let lines = [
            good.as_str(),
            r#"{"key":"k/2/","matchKey":"k/","method":"PATCH","time":1}"#,
            "not json",
            "",
        ];
        fs::write(&path, lines.join("\n")).unwrap();

        let (store, report) = load(&path, "items").unwrap();
        assert_eq!(report.loaded, 1);
        assert_eq!(report.skipped, 2);
        assert!(store.get("k/1/").unwrap().is_some());
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(load(&dir.path().join("nope.jsonl"), "x").is_err());
    }
}
