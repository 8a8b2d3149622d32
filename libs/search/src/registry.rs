//! Registry of searchable entity types
//!
//! An entity type becomes searchable by registering a field extractor under
//! its table name. The synchronizer consults the registry by name instead of
//! inspecting types at runtime, so anything that can be serialized can be
//! tracked and only registered tables ever reach the index.

use serde_json::Value;
use std::{collections::HashMap, fmt, sync::Arc};

use crate::{Searchable, index::Document};

/// Extracts the indexed fields from a serialized row.
pub type FieldExtractor = Arc<dyn Fn(&Value) -> Document + Send + Sync>;

/// Searchable entity types keyed by table name
#[derive(Clone, Default)]
pub struct SearchRegistry {
    extractors: HashMap<String, FieldExtractor>,
}

impl SearchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a custom extractor for `table`, replacing any previous one.
    pub fn register<F>(&mut self, table: impl Into<String>, extractor: F) -> &mut Self
    where
        F: Fn(&Value) -> Document + Send + Sync + 'static,
    {
        self.extractors.insert(table.into(), Arc::new(extractor));
        self
    }

    /// Register `table` with an extractor that copies the named fields.
    pub fn register_fields(&mut self, table: impl Into<String>, fields: &[&str]) -> &mut Self {
        let fields: Vec<String> = fields.iter().map(|f| f.to_string()).collect();
        self.register(table, move |row| pick(row, &fields))
    }

    /// Register a [`Searchable`] type using its declared fields.
    pub fn register_entity<T: Searchable>(&mut self) -> &mut Self {
        self.register_fields(T::TABLE, T::SEARCHABLE_FIELDS)
    }

    pub fn is_searchable(&self, table: &str) -> bool {
        self.extractors.contains_key(table)
    }

    /// Indexed fields of `row`, or `None` when `table` is not registered.
    pub fn extract(&self, table: &str, row: &Value) -> Option<Document> {
        self.extractors.get(table).map(|extract| extract(row))
    }

    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.extractors.keys().map(String::as_str)
    }
}

impl fmt::Debug for SearchRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchRegistry")
            .field("tables", &self.extractors.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn pick(row: &Value, fields: &[String]) -> Document {
    let mut document = Document::new();
    for field in fields {
        if let Some(value) = row.get(field).filter(|v| !v.is_null()) {
            document.insert(field.clone(), value.clone());
        }
    }
    document
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;
    use serde_json::json;

    #[derive(Serialize)]
    struct Article {
        id: i64,
        title: String,
        body: String,
        secret: String,
    }

    impl Searchable for Article {
        const TABLE: &'static str = "article";
        const SEARCHABLE_FIELDS: &'static [&'static str] = &["title", "body"];

        fn id(&self) -> i64 {
            self.id
        }
    }

    #[test]
    fn entity_registration_copies_only_declared_fields() {
        let mut registry = SearchRegistry::new();
        registry.register_entity::<Article>();

        let row = serde_json::to_value(Article {
            id: 1,
            title: "Hello".into(),
            body: "World".into(),
            secret: "do not index".into(),
        })
        .unwrap();

        let document = registry.extract("article", &row).unwrap();
        assert_eq!(document.len(), 2);
        assert_eq!(document["title"], "Hello");
        assert!(!document.contains_key("secret"));
    }

    #[test]
    fn unregistered_tables_are_not_searchable() {
        let registry = SearchRegistry::new();
        assert!(!registry.is_searchable("token"));
        assert!(registry.extract("token", &json!({"id": 1})).is_none());
    }

    #[test]
    fn custom_extractor_and_null_fields() {
        let mut registry = SearchRegistry::new();
        registry
            .register("user", |row| {
                let mut doc = Document::new();
                if let Some(name) = row.get("username") {
                    doc.insert("name".into(), name.clone());
                }
                doc
            })
            .register_fields("post", &["body", "language"]);

        let user = registry.extract("user", &json!({"username": "alice"})).unwrap();
        assert_eq!(user["name"], "alice");

        let post = registry
            .extract("post", &json!({"body": "hi", "language": null}))
            .unwrap();
        assert!(!post.contains_key("language"));

        let mut tables: Vec<&str> = registry.tables().collect();
        tables.sort();
        assert_eq!(tables, vec!["post", "user"]);
    }
}
