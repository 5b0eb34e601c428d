//! Record selection for store queries.

use crate::record::{Method, Record};

/// Filter on a record's sync state tag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MethodFilter {
    /// Any state.
    #[default]
    Any,
    /// Exactly this state.
    Is(Method),
    /// Any state except this one.
    Not(Method),
}

impl MethodFilter {
    fn matches(&self, method: Method) -> bool {
        match self {
            MethodFilter::Any => true,
            MethodFilter::Is(m) => *m == method,
            MethodFilter::Not(m) => *m != method,
        }
    }
}

/// Sort order on the record timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeOrder {
    /// Oldest first.
    Ascending,
    /// Newest first.
    Descending,
}

/// Which records a store query returns, and in what order.
///
/// Without an explicit order, records come back in key order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selector {
    /// Exact key.
    pub key: Option<String>,
    /// Required `match_key` prefix.
    pub match_prefix: Option<String>,
    /// Sync state filter.
    pub method: MethodFilter,
    /// Timestamp order.
    pub order: Option<TimeOrder>,
    /// Records to skip after sorting.
    pub skip: usize,
    /// Maximum number of records.
    pub limit: Option<usize>,
}

impl Selector {
    /// Selects every record.
    pub fn all() -> Self {
        Self::default()
    }

    /// Selects a single key.
    pub fn key(key: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            ..Self::default()
        }
    }

    /// Selects records whose match key starts with `prefix`.
    pub fn prefix(prefix: impl Into<String>) -> Self {
        Self {
            match_prefix: Some(prefix.into()),
            ..Self::default()
        }
    }

    /// Selects the outbox: every dirty record, oldest first.
    pub fn dirty() -> Self {
        Self::all()
            .with_method(MethodFilter::Not(Method::Get))
            .with_order(TimeOrder::Ascending)
    }

    /// Sets the sync state filter.
    #[must_use]
    pub fn with_method(mut self, method: MethodFilter) -> Self {
        self.method = method;
        self
    }

    /// Sets the timestamp order.
    #[must_use]
    pub fn with_order(mut self, order: TimeOrder) -> Self {
        self.order = Some(order);
        self
    }

    /// Sets the number of records to skip.
    #[must_use]
    pub fn with_skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    /// Sets the maximum number of records.
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Returns true if `record` passes the key, prefix and state filters.
    pub fn matches(&self, record: &Record) -> bool {
        if let Some(key) = &self.key {
            if &record.key != key {
                return false;
            }
        }
        if let Some(prefix) = &self.match_prefix {
            if !record.match_key.starts_with(prefix.as_str()) {
                return false;
            }
        }
        self.method.matches(record.method())
    }

    /// Filters, sorts, skips and limits `records`.
    ///
    /// Timestamp ties keep their input order.
    pub fn apply<'a, I>(&self, records: I) -> Vec<Record>
    where
        I: IntoIterator<Item = &'a Record>,
    {
        let mut selected: Vec<Record> = records
            .into_iter()
            .filter(|r| self.matches(r))
            .cloned()
            .collect();

        match self.order {
            Some(TimeOrder::Ascending) => selected.sort_by_key(|r| r.time),
            Some(TimeOrder::Descending) => selected.sort_by(|a, b| b.time.cmp(&a.time)),
            None => {}
        }

        let iter = selected.into_iter().skip(self.skip);
        match self.limit {
            Some(limit) => iter.take(limit).collect(),
            None => iter.collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Outbound, SyncState};

    fn rec(key: &str, time: i64, state: SyncState) -> Record {
        let mut r = Record::synced(key, None, time);
        r.state = state;
        r
    }

    fn put() -> SyncState {
        SyncState::Put {
            outbound: Outbound::default(),
            file_fields: vec![],
        }
    }

    #[test]
    fn prefix_and_method() {
        let records = vec![
            rec("t____/a/1/", 3, SyncState::Get),
            rec("t____/a/2/", 1, put()),
            rec("t____/b/1/", 2, put()),
        ];

        let got = Selector::prefix("t____/a/")
            .with_method(MethodFilter::Is(Method::Put))
            .apply(&records);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].key, "t____/a/2/");

        let dirty = Selector::dirty().apply(&records);
        let keys: Vec<_> = dirty.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["t____/a/2/", "t____/b/1/"]);
    }

    #[test]
    fn skip_and_limit_after_sort() {
        let records: Vec<_> = (0..5)
            .map(|i| rec(&format!("t____/a/{}/", i), i, SyncState::Get))
            .collect();
        let got = Selector::all()
            .with_order(TimeOrder::Descending)
            .with_skip(1)
            .with_limit(2)
            .apply(&records);
        let times: Vec<_> = got.iter().map(|r| r.time).collect();
        assert_eq!(times, vec![3, 2]);
    }

    #[test]
    fn exact_key() {
        let records = vec![rec("k1", 0, SyncState::Get), rec("k2", 0, SyncState::Get)];
        assert_eq!(Selector::key("k2").apply(&records)[0].key, "k2");
    }
}
