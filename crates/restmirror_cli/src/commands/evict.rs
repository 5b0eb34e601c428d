//! Evict command implementation.

use super::{offline_outbox, open_snapshots};
use restmirror_sync::MirrorConfig;
use std::path::Path;

/// Applies the command-line retention overrides to the loaded config.
/// Every other section is kept as loaded.
pub fn with_retention_overrides(
    config: &MirrorConfig,
    evict_after: Option<u64>,
    keep: Option<usize>,
) -> MirrorConfig {
    let mut config = config.clone();
    if let Some(seconds) = evict_after {
        config.retention.evict_after_seconds = seconds;
    }
    if let Some(keep) = keep {
        config.retention.trim_keep_count = keep;
    }
    config
}

/// Runs eviction then skip-trim over every resource and writes the
/// snapshots back.
pub fn run(
    path: &Path,
    config: &MirrorConfig,
    dry_run: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let (registry, report) = open_snapshots(path)?;

    println!("Evicting synced records at {:?}", path);
    if dry_run {
        println!("(dry run - no changes will be made)");
    }
    println!();

    let outbox = offline_outbox(&registry, config);
    let evicted = outbox.evict()?;
    let trimmed = outbox.skip_trim()?;
    let pending = outbox.pending_count()?;

    let retention = config.retention;
    println!("Retention:");
    println!("  Evict after:   {} s", retention.evict_after_seconds);
    println!("  Keep per name: {}", retention.trim_keep_count);
    println!();
    println!("  Records before: {}", report.loaded);
    println!("  Evicted:        {}", evicted);
    println!("  Trimmed:        {}", trimmed);
    println!("  Pending kept:   {}", pending);

    if !dry_run {
        let written = registry.persist(path)?;
        println!();
        println!("Wrote {} record(s)", written);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use restmirror_store::{Method, StoreRegistry};
    use restmirror_sync::{LocalMirror, OutboxConfig, RetentionPolicy};
    use serde_json::json;
    use std::time::Duration;

    fn seed(dir: &Path) {
        let registry = StoreRegistry::new();
        let mirror = LocalMirror::open(&registry, "items");
        mirror.store_remote("t", "/items/1/", json!({"v": 1})).unwrap();
        mirror.update("t", "/items/2/", json!({"v": 2})).unwrap();
        registry.persist(dir).unwrap();
    }

    #[test]
    fn overrides_touch_only_retention() {
        let loaded = MirrorConfig {
            outbox: OutboxConfig::new().with_write_timeout(Duration::from_secs(5)),
            retention: RetentionPolicy::new(3_600, 50),
            ..MirrorConfig::default()
        };
        let mut paused = loaded.clone();
        paused.outbox.start_paused = true;

        let config = with_retention_overrides(&paused, None, Some(0));
        assert_eq!(config.outbox, paused.outbox);
        assert_eq!(config.overlay, paused.overlay);
        assert_eq!(config.retention, RetentionPolicy::new(3_600, 0));

        let config = with_retention_overrides(&loaded, Some(60), None);
        assert_eq!(config.retention, RetentionPolicy::new(60, 50));
        assert_eq!(config.outbox.write_timeout, Duration::from_secs(5));
    }

    #[test]
    fn trim_removes_synced_and_keeps_pending() {
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path());
        let config = with_retention_overrides(&MirrorConfig::default(), None, Some(0));

        run(dir.path(), &config, false).unwrap();

        let (registry, _) = open_snapshots(dir.path()).unwrap();
        let mirror = LocalMirror::open(&registry, "items");
        assert!(mirror.get("t", "/items/1/").unwrap().is_none());
        let pending = mirror.get("t", "/items/2/").unwrap().unwrap();
        assert_eq!(pending.method(), Method::Put);
    }

    #[test]
    fn dry_run_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path());
        let config = with_retention_overrides(&MirrorConfig::default(), Some(0), Some(0));

        run(dir.path(), &config, true).unwrap();

        let (registry, _) = open_snapshots(dir.path()).unwrap();
        let mirror = LocalMirror::open(&registry, "items");
        assert!(mirror.get("t", "/items/1/").unwrap().is_some());
    }
}
