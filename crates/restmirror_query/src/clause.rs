//! Query key grammar.
//!
//! Keys take the form `{verb}:{field}.{lookup}` or bare `{field}.{lookup}`
//! (bare keys are filters). `ordering`, `distinct` and `only` also accept
//! the bare verb as the key, with a comma-separated field list as value.

use tracing::debug;

/// What a clause does to the result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    /// Keep documents matching the clause.
    Filter,
    /// Drop documents matching the clause.
    Exclude,
    /// Sort by the listed fields.
    Ordering,
    /// Keep the first document per composite key.
    Distinct,
    /// Project documents onto the listed fields.
    Only,
    /// Rank by trigram similarity.
    SearchQuery,
}

impl Verb {
    /// Parses a verb name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "filter" => Some(Verb::Filter),
            "exclude" => Some(Verb::Exclude),
            "ordering" => Some(Verb::Ordering),
            "distinct" => Some(Verb::Distinct),
            "only" => Some(Verb::Only),
            "search_query" => Some(Verb::SearchQuery),
            _ => None,
        }
    }

    /// Returns true for verbs whose values are field lists.
    pub fn takes_fields(&self) -> bool {
        matches!(self, Verb::Ordering | Verb::Distinct | Verb::Only)
    }
}

/// Comparison applied by a filter or exclude clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lookup {
    /// Coerced equality.
    #[default]
    Eq,
    /// Greater than or equal.
    Gte,
    /// Less than or equal.
    Lte,
    /// Greater than.
    Gt,
    /// Less than.
    Lt,
    /// Half-open interval `[lo, hi)`.
    Range,
    /// String prefix (case-sensitive).
    StartsWith,
    /// String suffix (case-sensitive).
    EndsWith,
    /// Null check (`true` / `false`).
    IsNull,
    /// Case-insensitive equality.
    IExact,
    /// Raw string equality.
    Exact,
    /// Case-insensitive substring.
    IContains,
    /// Case-sensitive substring.
    Contains,
    /// Membership in a comma-separated list.
    In,
}

impl Lookup {
    /// Parses a lookup suffix.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "eq" => Some(Lookup::Eq),
            "gte" => Some(Lookup::Gte),
            "lte" => Some(Lookup::Lte),
            "gt" => Some(Lookup::Gt),
            "lt" => Some(Lookup::Lt),
            "range" => Some(Lookup::Range),
            "startswith" => Some(Lookup::StartsWith),
            "endswith" => Some(Lookup::EndsWith),
            "isnull" => Some(Lookup::IsNull),
            "iexact" => Some(Lookup::IExact),
            "exact" => Some(Lookup::Exact),
            "icontains" => Some(Lookup::IContains),
            "contains" => Some(Lookup::Contains),
            "in" => Some(Lookup::In),
            _ => None,
        }
    }
}

/// One parsed query parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clause {
    /// The verb.
    pub verb: Verb,
    /// Target field path (empty for bare field-list verbs).
    pub field: String,
    /// The lookup (always `Eq` for non-filter verbs).
    pub lookup: Lookup,
    /// Values, already split on commas where the verb calls for it.
    pub values: Vec<String>,
}

impl Clause {
    /// Parses a `(key, value)` pair.
    ///
    /// Returns `None` for keys that are not query clauses (unknown verbs,
    /// a `search_query` without a field, a `range` without two bounds).
    pub fn parse(key: &str, raw: &str) -> Option<Self> {
        let (verb, rest) = match key.split_once(':') {
            Some((name, rest)) => match Verb::from_name(name) {
                Some(verb) => (verb, rest),
                None => {
                    debug!(key, "ignoring query key with unknown verb");
                    return None;
                }
            },
            None => match Verb::from_name(key) {
                Some(verb) if verb.takes_fields() => (verb, ""),
                Some(_) => {
                    debug!(key, "ignoring verb without a field");
                    return None;
                }
                None => (Verb::Filter, key),
            },
        };

        if verb.takes_fields() {
            let values = rest
                .split(',')
                .chain(raw.split(','))
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .map(String::from)
                .collect();
            return Some(Self {
                verb,
                field: rest.to_string(),
                lookup: Lookup::Eq,
                values,
            });
        }

        if rest.is_empty() {
            return None;
        }

        if verb == Verb::SearchQuery {
            return Some(Self {
                verb,
                field: rest.to_string(),
                lookup: Lookup::Eq,
                values: vec![raw.to_string()],
            });
        }

        let (field, lookup) = match rest.rsplit_once('.') {
            Some((field, suffix)) => match Lookup::from_name(suffix) {
                Some(lookup) => (field, lookup),
                None => (rest, Lookup::Eq),
            },
            None => (rest, Lookup::Eq),
        };

        let values: Vec<String> = raw.split(',').map(String::from).collect();
        if lookup == Lookup::Range && values.len() != 2 {
            debug!(key, raw, "ignoring range clause without exactly two bounds");
            return None;
        }

        Some(Self {
            verb,
            field: field.to_string(),
            lookup,
            values,
        })
    }
}
