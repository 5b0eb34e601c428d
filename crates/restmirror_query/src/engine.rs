//! Query evaluation pipeline.

use crate::clause::{Clause, Lookup, Verb};
use crate::document::Document;
use crate::page::{paginate, Page};
use crate::params::{QueryParams, LIMIT_KEY, OFFSET_KEY};
use crate::search;
use crate::value::{compare_text, compare_values, value_text};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashSet;

/// A parsed list query.
///
/// Built from `QueryParams`; evaluation is pure and repeatable, so the
/// same query over the same documents always yields the same page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    filters: Vec<Clause>,
    searches: Vec<Clause>,
    excludes: Vec<Clause>,
    ordering: Vec<String>,
    distinct: Vec<String>,
    only: Vec<String>,
    offset: usize,
    limit: Option<usize>,
}

impl Query {
    /// Parses every clause in `params`.
    pub fn parse(params: &QueryParams) -> Self {
        let mut query = Self {
            offset: params.get_usize(OFFSET_KEY).unwrap_or(0),
            limit: params.get_usize(LIMIT_KEY),
            ..Self::default()
        };

        for (key, raw) in params.iter() {
            if key == OFFSET_KEY || key == LIMIT_KEY {
                continue;
            }
            let Some(clause) = Clause::parse(key, raw) else {
                continue;
            };
            match clause.verb {
                Verb::Filter => query.filters.push(clause),
                Verb::Exclude => query.excludes.push(clause),
                Verb::SearchQuery => query.searches.push(clause),
                Verb::Ordering => query.ordering.extend(clause.values),
                Verb::Distinct => query.distinct.extend(clause.values),
                Verb::Only => query.only.extend(clause.values),
            }
        }

        query
    }

    /// Parses only the parameters whose keys are in `allowed`.
    pub fn parse_allowed<S: AsRef<str>>(params: &QueryParams, allowed: &[S]) -> Self {
        Self::parse(&params.allowed(allowed))
    }

    /// Returns the page offset.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Returns the page size, if any.
    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Returns true if the query has no clauses (pagination aside).
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
            && self.searches.is_empty()
            && self.excludes.is_empty()
            && self.ordering.is_empty()
            && self.distinct.is_empty()
            && self.only.is_empty()
    }

    /// Runs filter → search → exclude → ordering → distinct → only.
    pub fn evaluate<D: Document + Clone>(&self, docs: &[D]) -> Vec<D> {
        let mut current: Vec<D> = docs
            .iter()
            .filter(|doc| self.filters.iter().all(|c| keeps(*doc, c)))
            .cloned()
            .collect();

        for clause in &self.searches {
            let text = clause.values.first().map(String::as_str).unwrap_or("");
            current = search::rank(current, &clause.field, text);
        }

        current.retain(|doc| !self.excludes.iter().any(|c| excludes(doc, c)));

        if !self.ordering.is_empty() {
            current.sort_by(|a, b| compare_by_fields(a, b, &self.ordering));
        }

        if !self.distinct.is_empty() {
            current = distinct_by(current, &self.distinct);
        }

        if !self.only.is_empty() {
            for doc in &mut current {
                doc.retain_fields(&self.only);
            }
        }

        current
    }

    /// Evaluates and paginates, rendering cursors against `base_url`.
    pub fn run<D: Document + Clone>(
        &self,
        docs: &[D],
        base_url: &str,
        params: &QueryParams,
    ) -> Page<D> {
        paginate(self.evaluate(docs), self.offset, self.limit, base_url, params)
    }
}

/// Filter semantics: a missing field never hides a document.
fn keeps<D: Document>(doc: &D, clause: &Clause) -> bool {
    match doc.field(&clause.field) {
        Some(value) => matches_lookup(&value, clause),
        None => true,
    }
}

/// Exclude semantics: a missing field never excludes a document.
fn excludes<D: Document>(doc: &D, clause: &Clause) -> bool {
    match doc.field(&clause.field) {
        Some(value) => matches_lookup(&value, clause),
        None => false,
    }
}

fn matches_lookup(value: &Value, clause: &Clause) -> bool {
    if clause.lookup == Lookup::IsNull {
        let expect_null = clause
            .values
            .first()
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "1"))
            .unwrap_or(true);
        return value.is_null() == expect_null;
    }

    if let Value::Array(items) = value {
        return items.iter().any(|item| matches_lookup(item, clause));
    }

    let Some(text) = value_text(value) else {
        return false;
    };

    if clause.lookup == Lookup::Range {
        let (lo, hi) = (&clause.values[0], &clause.values[1]);
        return compare_text(&text, lo) != Ordering::Less
            && compare_text(&text, hi) == Ordering::Less;
    }

    clause
        .values
        .iter()
        .any(|expected| matches_single(&text, clause.lookup, expected))
}

fn matches_single(text: &str, lookup: Lookup, expected: &str) -> bool {
    match lookup {
        Lookup::Eq | Lookup::In => compare_text(text, expected) == Ordering::Equal,
        Lookup::Exact => text == expected,
        Lookup::IExact => text.to_lowercase() == expected.to_lowercase(),
        Lookup::Gt => compare_text(text, expected) == Ordering::Greater,
        Lookup::Gte => compare_text(text, expected) != Ordering::Less,
        Lookup::Lt => compare_text(text, expected) == Ordering::Less,
        Lookup::Lte => compare_text(text, expected) != Ordering::Greater,
        Lookup::Contains => text.contains(expected),
        Lookup::IContains => text.to_lowercase().contains(&expected.to_lowercase()),
        Lookup::StartsWith => text.starts_with(expected),
        Lookup::EndsWith => text.ends_with(expected),
        // Handled before per-value dispatch.
        Lookup::Range | Lookup::IsNull => false,
    }
}

fn compare_by_fields<D: Document, S: AsRef<str>>(a: &D, b: &D, fields: &[S]) -> Ordering {
    for spec in fields {
        let spec = spec.as_ref();
        let (field, descending) = match spec.strip_prefix('-') {
            Some(field) => (field, true),
            None => (spec.strip_prefix('+').unwrap_or(spec), false),
        };
        let left = a.field(field);
        let right = b.field(field);
        let ordering = compare_values(left.as_deref(), right.as_deref());
        let ordering = if descending {
            ordering.reverse()
        } else {
            ordering
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Stable multi-key sort; `-field` sorts descending.
pub fn order_by<D: Document + Clone, S: AsRef<str>>(docs: &[D], fields: &[S]) -> Vec<D> {
    let mut sorted = docs.to_vec();
    sorted.sort_by(|a, b| compare_by_fields(a, b, fields));
    sorted
}

/// Keeps the first document for each composite key of `fields`.
pub fn distinct_by<D: Document, S: AsRef<str>>(docs: Vec<D>, fields: &[S]) -> Vec<D> {
    let mut seen = HashSet::new();
    docs.into_iter()
        .filter(|doc| {
            let key = fields
                .iter()
                .map(|f| {
                    doc.field(f.as_ref())
                        .and_then(|v| value_text(&v))
                        .unwrap_or_default()
                })
                .collect::<Vec<_>>()
                .join("\u{1f}");
            seen.insert(key)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn docs() -> Vec<Value> {
        vec![
            json!({"id": 1, "name": "Alpha", "size": 3, "due": "2024-03-01", "tags": ["a", "b"], "owner": null}),
            json!({"id": 2, "name": "beta", "size": 12, "due": "2024-01-15", "tags": ["c"], "owner": "ada"}),
            json!({"id": 3, "name": "Gamma", "size": 7, "due": "2024-02-10", "tags": [], "owner": "bob"}),
            json!({"id": 4, "title": "no name field"}),
        ]
    }

    fn ids(docs: &[Value]) -> Vec<i64> {
        docs.iter().map(|d| d["id"].as_i64().unwrap()).collect()
    }

    fn eval(pairs: &[(&str, &str)]) -> Vec<i64> {
        let params: QueryParams = pairs.iter().copied().collect();
        ids(&Query::parse(&params).evaluate(&docs()))
    }

    #[test]
    fn numeric_lookups() {
        assert_eq!(eval(&[("filter:size.gte", "7")]), vec![2, 3, 4]);
        assert_eq!(eval(&[("filter:size.lt", "7")]), vec![1, 4]);
        assert_eq!(eval(&[("size", "12")]), vec![2, 4]);
    }

    #[test]
    fn range_is_half_open() {
        assert_eq!(eval(&[("filter:size.range", "3,12")]), vec![1, 3, 4]);
    }

    #[test]
    fn date_lookups() {
        assert_eq!(eval(&[("filter:due.gt", "2024-02-01")]), vec![1, 3, 4]);
    }

    #[test]
    fn string_lookups() {
        assert_eq!(eval(&[("filter:name.icontains", "AMM")]), vec![3, 4]);
        assert_eq!(eval(&[("filter:name.contains", "amm")]), vec![3, 4]);
        assert_eq!(eval(&[("filter:name.startswith", "b")]), vec![2, 4]);
        assert_eq!(eval(&[("filter:name.endswith", "ta")]), vec![2, 4]);
        assert_eq!(eval(&[("filter:name.iexact", "alpha")]), vec![1, 4]);
        assert_eq!(eval(&[("filter:name.exact", "alpha")]), vec![4]);
    }

    #[test]
    fn comma_values_are_ored() {
        assert_eq!(eval(&[("filter:name.in", "beta,Gamma")]), vec![2, 3, 4]);
        assert_eq!(eval(&[("exclude:id", "1,2")]), vec![3, 4]);
    }

    #[test]
    fn repeated_keys_are_anded() {
        assert_eq!(
            eval(&[("filter:size.gt", "2"), ("filter:size.lt", "10")]),
            vec![1, 3, 4]
        );
    }

    #[test]
    fn isnull_lookup() {
        assert_eq!(eval(&[("filter:owner.isnull", "true")]), vec![1, 4]);
        assert_eq!(eval(&[("filter:owner.isnull", "false")]), vec![2, 3, 4]);
    }

    #[test]
    fn array_fields_match_any_element() {
        assert_eq!(eval(&[("filter:tags", "b")]), vec![1, 4]);
        assert_eq!(eval(&[("exclude:tags", "c")]), vec![1, 3, 4]);
    }

    #[test]
    fn missing_field_never_excludes() {
        assert_eq!(eval(&[("exclude:name.icontains", "a")]), vec![4]);
    }

    #[test]
    fn ordering_multi_key() {
        let docs = vec![
            json!({"id": 1, "group": "b", "rank": 2}),
            json!({"id": 2, "group": "a", "rank": 1}),
            json!({"id": 3, "group": "b", "rank": 1}),
            json!({"id": 4, "group": "a", "rank": 5}),
        ];
        let sorted = order_by(&docs, &["group", "-rank"]);
        assert_eq!(ids(&sorted), vec![4, 2, 1, 3]);
    }

    #[test]
    fn ordering_missing_values_first() {
        assert_eq!(eval(&[("ordering", "size")]), vec![4, 1, 3, 2]);
        assert_eq!(eval(&[("ordering", "-size")]), vec![2, 3, 1, 4]);
    }

    #[test]
    fn distinct_keeps_first_occurrence() {
        let docs = vec![
            json!({"id": 1, "kind": "x", "color": "red"}),
            json!({"id": 2, "kind": "x", "color": "red"}),
            json!({"id": 3, "kind": "x", "color": "blue"}),
            json!({"id": 4, "kind": null}),
            json!({"id": 5}),
        ];
        let unique = distinct_by(docs, &["kind", "color"]);
        assert_eq!(ids(&unique), vec![1, 3, 4]);
    }

    #[test]
    fn stages_run_in_fixed_order() {
        // Distinct runs after ordering, so the largest size per owner wins.
        let docs = vec![
            json!({"id": 1, "owner": "ada", "size": 1}),
            json!({"id": 2, "owner": "ada", "size": 9}),
            json!({"id": 3, "owner": "bob", "size": 4}),
        ];
        let params = QueryParams::new()
            .with("distinct", "owner")
            .with("ordering", "-size");
        assert_eq!(ids(&Query::parse(&params).evaluate(&docs)), vec![2, 3]);
    }

    #[test]
    fn search_then_exclude() {
        let docs = vec![
            json!({"id": 1, "text": "'rust':1 'book':2"}),
            json!({"id": 2, "text": "'rust':1"}),
            json!({"id": 3, "text": "'python':1"}),
        ];
        let params = QueryParams::new()
            .with("search_query:text", "rust")
            .with("exclude:id", "2");
        assert_eq!(ids(&Query::parse(&params).evaluate(&docs)), vec![1]);
    }

    #[test]
    fn only_projects_fields() {
        let params = QueryParams::new()
            .with("only", "id,name")
            .with("filter:id", "1");
        let result = Query::parse(&params).evaluate(&docs());
        assert_eq!(result[0], json!({"id": 1, "name": "Alpha"}));
    }

    #[test]
    fn allow_list_drops_unlisted_clauses() {
        let params = QueryParams::new()
            .with("filter:size.gte", "7")
            .with("filter:name", "beta");
        let query = Query::parse_allowed(&params, &["filter:size.gte"]);
        assert_eq!(ids(&query.evaluate(&docs())), vec![2, 3, 4]);
    }

    #[test]
    fn run_paginates_filtered_results() {
        let params = QueryParams::new()
            .with("ordering", "id")
            .with("limit", "2")
            .with("offset", "0");
        let page = Query::parse(&params).run(&docs(), "/items/", &params);
        assert_eq!(page.count, 4);
        assert_eq!(ids(&page.results), vec![1, 2]);
        assert!(page.next.is_some());
        assert!(page.previous.is_none());
    }

    #[test]
    fn run_with_maximal_limit_and_offset_does_not_panic() {
        let params = QueryParams::new()
            .with("limit", usize::MAX.to_string())
            .with("offset", "1");
        let page = Query::parse(&params).run(&docs(), "/items/", &params);
        assert_eq!(page.count, 4);
        assert_eq!(page.results.len(), 3);
        assert!(page.next.is_none());
    }

    #[test]
    fn pagination_keys_are_not_filters() {
        let params = QueryParams::new().with("limit", "10").with("offset", "0");
        let query = Query::parse(&params);
        assert!(query.is_empty());
        assert_eq!(query.limit(), Some(10));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn doc_strategy() -> impl Strategy<Value = Value> {
        (any::<i32>(), "[a-z]{0,6}", prop::option::of(0u8..20)).prop_map(|(time, name, size)| {
            match size {
                Some(size) => json!({"time": time, "name": name, "size": size}),
                None => json!({"time": time, "name": name}),
            }
        })
    }

    proptest! {
        #[test]
        fn evaluation_is_idempotent(docs in prop::collection::vec(doc_strategy(), 0..40)) {
            let params = QueryParams::new()
                .with("filter:size.gte", "5")
                .with("exclude:name.startswith", "q")
                .with("ordering", "-size,name")
                .with("limit", "7");
            let query = Query::parse(&params);
            let first = query.run(&docs, "/x/", &params);
            let second = query.run(&docs, "/x/", &params);
            prop_assert_eq!(first, second);
        }

        #[test]
        fn descending_then_ascending_restores_order(
            times in prop::collection::hash_set(any::<i32>(), 0..40)
        ) {
            let mut times: Vec<i32> = times.into_iter().collect();
            times.sort_unstable();
            let original: Vec<Value> = times.iter().map(|t| json!({"time": t})).collect();

            let descending = order_by(&original, &["-time"]);
            let mut reversed = descending.clone();
            reversed.reverse();
            prop_assert_eq!(order_by(&reversed, &["time"]), original);
        }
    }
}
