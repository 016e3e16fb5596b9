use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::UserId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub id: i64,
    pub title: String,
    pub summary: Option<String>,
    pub canonical_url: String,
    pub source_name: Option<String>,
    pub source_id: Option<i64>,
    pub image_url: Option<String>,
    pub published_at: DateTime<Utc>,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewArticle {
    pub title: String,
    pub summary: Option<String>,
    pub canonical_url: String,
    pub source_name: Option<String>,
    pub source_id: Option<i64>,
    pub image_url: Option<String>,
    pub published_at: DateTime<Utc>,
}

/// One row of a user's personalized feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedEntry {
    pub user_id: UserId,
    pub saved_at: DateTime<Utc>,
    pub article: Article,
}
