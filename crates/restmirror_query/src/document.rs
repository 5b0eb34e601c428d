//! Field access for queryable documents.

use serde_json::Value;
use std::borrow::Cow;

/// A document the query engine can evaluate.
///
/// Implementors expose named fields as JSON values. Missing fields return
/// `None`, which the engine treats as "unknown shape" rather than a
/// mismatch.
pub trait Document {
    /// Returns the value at `path`, or `None` if the document has no such field.
    ///
    /// Paths use `.` to address nested objects (`author.name`).
    fn field(&self, path: &str) -> Option<Cow<'_, Value>>;

    /// Drops every top-level data field not named in `fields`.
    fn retain_fields(&mut self, fields: &[String]);
}

/// Resolves a dotted path inside a JSON value.
///
/// A key that literally contains the whole path wins over traversal, so
/// flat documents with dotted keys still resolve.
pub fn lookup_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if let Value::Object(map) = value {
        if let Some(found) = map.get(path) {
            return Some(found);
        }
    }

    let mut current = value;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Keeps only the named top-level keys of a JSON object.
pub(crate) fn retain_object_fields(value: &mut Value, fields: &[String]) {
    if let Value::Object(map) = value {
        map.retain(|key, _| {
            fields
                .iter()
                .any(|f| f == key || f.split('.').next() == Some(key.as_str()))
        });
    }
}

impl Document for Value {
    fn field(&self, path: &str) -> Option<Cow<'_, Value>> {
        lookup_path(self, path).map(Cow::Borrowed)
    }

    fn retain_fields(&mut self, fields: &[String]) {
        retain_object_fields(self, fields);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nested_lookup() {
        let doc = json!({"author": {"name": "ada", "tags": ["x", "y"]}});
        assert_eq!(lookup_path(&doc, "author.name"), Some(&json!("ada")));
        assert_eq!(lookup_path(&doc, "author.tags.1"), Some(&json!("y")));
        assert_eq!(lookup_path(&doc, "author.missing"), None);
    }

    #[test]
    fn literal_dotted_key_wins() {
        let doc = json!({"a.b": 1, "a": {"b": 2}});
        assert_eq!(lookup_path(&doc, "a.b"), Some(&json!(1)));
    }

    #[test]
    fn retain_keeps_parents_of_dotted_fields() {
        let mut doc = json!({"id": 1, "author": {"name": "ada"}, "body": "text"});
        doc.retain_fields(&["id".to_string(), "author.name".to_string()]);
        assert_eq!(doc, json!({"id": 1, "author": {"name": "ada"}}));
    }
}
