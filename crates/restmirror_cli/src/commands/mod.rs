//! CLI command implementations.

pub mod evict;
pub mod inspect;
pub mod outbox;
pub mod query;
pub mod resolve;

use restmirror_store::{LoadReport, StoreRegistry};
use restmirror_sync::{
    MirrorConfig, OutboxSynchronizer, RemoteClient, RemoteError, RemoteRequest, RemoteResult,
};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

/// Loads the mirror configuration, or the defaults when no file is given.
pub fn load_config(path: Option<&Path>) -> Result<MirrorConfig, Box<dyn std::error::Error>> {
    match path {
        Some(path) => Ok(MirrorConfig::from_json_file(path)?),
        None => Ok(MirrorConfig::default()),
    }
}

/// Restores every snapshot under `path` into a fresh registry.
pub fn open_snapshots(
    path: &Path,
) -> Result<(StoreRegistry, LoadReport), Box<dyn std::error::Error>> {
    if !path.is_dir() {
        return Err(format!("No snapshot directory at {:?}", path).into());
    }
    let registry = StoreRegistry::new();
    let report = registry.restore(path)?;
    if registry.names().is_empty() {
        return Err(format!("No snapshots found in {:?}", path).into());
    }
    if report.skipped > 0 {
        warn!(skipped = report.skipped, "Some snapshot lines could not be read");
    }
    Ok((registry, report))
}

/// A remote that refuses every request. Maintenance commands never replay.
pub struct OfflineRemote;

impl RemoteClient for OfflineRemote {
    fn execute(&self, request: RemoteRequest) -> RemoteResult<Value> {
        Err(RemoteError::Network(format!(
            "offline: {} {}",
            request.method, request.url
        )))
    }
}

/// Builds an outbox over every store in `registry`.
pub fn offline_outbox(
    registry: &StoreRegistry,
    config: &MirrorConfig,
) -> OutboxSynchronizer<OfflineRemote> {
    let outbox = OutboxSynchronizer::with_config(Arc::new(OfflineRemote), config.outbox.clone());
    for name in registry.names() {
        let mirror = restmirror_sync::LocalMirror::open(registry, &name);
        outbox.register(mirror.registration(config.retention));
    }
    outbox
}
