//! Field-equality filters over the JSON form of stored records
//!
//! Backends without a native query language (the in-memory map and the KV
//! bucket) match records through this API.

use serde::Serialize;
use serde_json::Value;

use crate::error::StoreResult;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    clauses: Vec<(String, Value)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a `field == value` clause. Clauses are ANDed.
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.clauses.push((field.into(), value.into()));
        self
    }

    /// An empty filter matches every document.
    pub fn matches(&self, doc: &Value) -> bool {
        self.clauses
            .iter()
            .all(|(field, expected)| doc.get(field) == Some(expected))
    }

    pub fn matches_record<T: Serialize>(&self, record: &T) -> StoreResult<bool> {
        Ok(self.matches(&serde_json::to_value(record)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_all_clauses_must_match() {
        let doc = json!({"id": "a1", "name": "app", "owner": "u1"});

        assert!(Filter::new().matches(&doc));
        assert!(Filter::new().eq("owner", "u1").matches(&doc));
        assert!(Filter::new().eq("owner", "u1").eq("name", "app").matches(&doc));
        assert!(!Filter::new().eq("owner", "u1").eq("name", "other").matches(&doc));
    }

    #[test]
    fn test_missing_field_does_not_match() {
        let doc = json!({"id": "a1", "name": "app"});
        assert!(!Filter::new().eq("domain", "example.com").matches(&doc));
    }
}
