//! Benchmark utilities.

use restmirror_store::{MemoryStore, Record};
use serde_json::{json, Value};

const NAMES: [&str; 8] = [
    "apple", "banana", "cherry", "damson", "elder", "fig", "grape", "huckleberry",
];

/// Generates a deterministic item payload.
pub fn item(i: usize) -> Value {
    json!({
        "id": i,
        "name": format!("{} {}", NAMES[i % NAMES.len()], i),
        "rank": (i * 7919) % 1000,
        "active": i % 3 != 0,
        "created": format!("2024-01-{:02}T00:00:00Z", 1 + i % 28),
        "owner": {"team": format!("team-{}", i % 5)},
    })
}

/// Generates synced records under `t____/items/`.
pub fn synced_items(count: usize) -> Vec<Record> {
    (0..count)
        .map(|i| Record::synced(format!("t____/items/{}/", i), Some(item(i)), i as i64))
        .collect()
}

/// Builds a store holding `count` synced items.
pub fn item_store(count: usize) -> MemoryStore {
    MemoryStore::with_records("items", synced_items(count))
}
