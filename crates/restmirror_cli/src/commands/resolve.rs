//! Resolve command implementation.

use super::open_snapshots;
use clap::ValueEnum;
use restmirror_sync::LocalMirror;
use std::path::Path;

/// How to resolve a stuck write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Action {
    /// Re-queue a pending update or delete as a fresh create
    CreateNew,
    /// Drop the pending write locally
    Discard,
}

/// Runs the resolve command and writes the snapshots back.
pub fn run(
    path: &Path,
    resource: &str,
    tenant: &str,
    url: &str,
    action: Action,
) -> Result<(), Box<dyn std::error::Error>> {
    let (registry, _) = open_snapshots(path)?;
    if registry.get(resource).is_none() {
        return Err(format!("No snapshot for resource {:?}", resource).into());
    }
    let mirror = LocalMirror::open(&registry, resource);

    match action {
        Action::CreateNew => {
            let record = mirror.create_new(tenant, url)?;
            println!("Re-queued {} as {}", record.key, record.method());
        }
        Action::Discard => {
            mirror.delete_conflict(tenant, url)?;
            println!("Discarded pending write for {}", LocalMirror::key_for(tenant, url));
        }
    }

    registry.persist(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use restmirror_store::{Method, StoreRegistry};
    use serde_json::json;

    fn seed(dir: &Path) {
        let registry = StoreRegistry::new();
        let mirror = LocalMirror::open(&registry, "items");
        mirror.update("t", "/items/1/", json!({"v": 1})).unwrap();
        mirror.delete("t", "/items/1/").unwrap();
        mirror.update("t", "/items/2/", json!({"v": 2})).unwrap();
        registry.persist(dir).unwrap();
    }

    #[test]
    fn create_new_is_written_back() {
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path());

        run(dir.path(), "items", "t", "/items/1/", Action::CreateNew).unwrap();

        let (registry, _) = open_snapshots(dir.path()).unwrap();
        let record = LocalMirror::open(&registry, "items")
            .get("t", "/items/1/")
            .unwrap()
            .unwrap();
        assert_eq!(record.method(), Method::Post);
    }

    #[test]
    fn discard_is_written_back() {
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path());

        run(dir.path(), "items", "t", "/items/2/", Action::Discard).unwrap();

        let (registry, _) = open_snapshots(dir.path()).unwrap();
        let mirror = LocalMirror::open(&registry, "items");
        assert!(mirror.get("t", "/items/2/").unwrap().is_none());
        assert!(mirror.get("t", "/items/1/").unwrap().is_some());
    }

    #[test]
    fn unknown_resource_fails() {
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path());
        assert!(run(dir.path(), "users", "t", "/users/1/", Action::Discard).is_err());
    }
}
