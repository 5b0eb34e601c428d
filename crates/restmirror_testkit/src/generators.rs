//! Property-based test generators using proptest.
//!
//! Provides strategies for generating records, query params and write
//! sequences that keep the key and state invariants of a mirror.

use crate::fixtures::{dirty_record, key};
use proptest::prelude::*;
use restmirror_query::QueryParams;
use restmirror_store::{Method, Record};
use serde_json::{json, Value};

/// Strategy for generating tenant names.
pub fn tenant_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9]{0,7}").expect("Invalid regex")
}

/// Strategy for generating record identifiers.
pub fn id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z0-9]{1,8}").expect("Invalid regex")
}

/// Strategy for generating item URLs under `/items/`.
pub fn item_url_strategy() -> impl Strategy<Value = String> {
    id_strategy().prop_map(|id| format!("/items/{}/", id))
}

/// Strategy for generating dirty methods.
pub fn dirty_method_strategy() -> impl Strategy<Value = Method> {
    prop_oneof![Just(Method::Post), Just(Method::Put), Just(Method::Delete)]
}

/// Strategy for generating flat item payloads.
pub fn item_data_strategy() -> impl Strategy<Value = Value> {
    (
        prop::string::string_regex("[a-z]{1,6}").expect("Invalid regex"),
        0i64..1_000,
        any::<bool>(),
    )
        .prop_map(|(name, rank, active)| json!({"name": name, "rank": rank, "active": active}))
}

/// Strategy for generating dirty records for one tenant with distinct
/// keys and arbitrary timestamps.
pub fn dirty_records_strategy(max: usize) -> impl Strategy<Value = Vec<Record>> {
    prop::collection::btree_map(
        id_strategy(),
        (dirty_method_strategy(), 0i64..10_000, item_data_strategy()),
        0..max,
    )
    .prop_map(|entries| {
        entries
            .into_iter()
            .map(|(id, (method, time, data))| {
                dirty_record(&key("t", &format!("/items/{}/", id)), method, Some(data), time)
            })
            .collect()
    })
}

/// Strategy for generating query params over the item payload fields.
pub fn item_query_strategy() -> impl Strategy<Value = QueryParams> {
    let clause = prop_oneof![
        (0i64..1_000).prop_map(|v| ("filter:rank.gte".to_string(), v.to_string())),
        (0i64..1_000).prop_map(|v| ("exclude:rank.lt".to_string(), v.to_string())),
        any::<bool>().prop_map(|v| ("filter:active".to_string(), v.to_string())),
        prop::string::string_regex("[a-z]{1,2}")
            .expect("Invalid regex")
            .prop_map(|v| ("filter:name.startswith".to_string(), v)),
        prop_oneof![Just("rank"), Just("-rank"), Just("name")]
            .prop_map(|v| ("ordering".to_string(), v.to_string())),
    ];
    prop::collection::vec(clause, 0..4).prop_map(|pairs| pairs.into_iter().collect())
}

/// A local write for sequence tests.
#[derive(Debug, Clone)]
pub enum WriteOp {
    /// `create(url, data)`
    Create(String, Value),
    /// `update(url, data)`
    Update(String, Value),
    /// `delete(url)`
    Delete(String),
}

/// Strategy for generating write sequences over a small set of URLs, so
/// that writes often hit the same record.
pub fn write_ops_strategy(max: usize) -> impl Strategy<Value = Vec<WriteOp>> {
    let url = (0u8..4).prop_map(|n| format!("/items/{}/", n));
    let op = prop_oneof![
        (url.clone(), item_data_strategy()).prop_map(|(u, d)| WriteOp::Create(u, d)),
        (url.clone(), item_data_strategy()).prop_map(|(u, d)| WriteOp::Update(u, d)),
        url.prop_map(WriteOp::Delete),
    ];
    prop::collection::vec(op, 0..max)
}
