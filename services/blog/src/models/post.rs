//! Post model

use chrono::{DateTime, Utc};
use search::Searchable;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Post entity, mirrored into the search index by its body
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Post {
    pub id: i64,
    pub user_id: i64,
    pub body: String,
    pub language: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Searchable for Post {
    const TABLE: &'static str = "post";
    const SEARCHABLE_FIELDS: &'static [&'static str] = &["body"];

    fn id(&self) -> i64 {
        self.id
    }
}

/// New post payload
#[derive(Debug, Clone, Deserialize)]
pub struct NewPost {
    pub body: String,
    #[serde(default)]
    pub language: Option<String>,
}

/// Search query parameters
#[derive(Debug, Clone, Deserialize)]
pub struct SearchQuery {
    pub q: String,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}
