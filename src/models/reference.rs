use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Country {
    pub id: i64,
    pub name: String,
    /// Two-letter ISO code, always lowercase.
    pub iso_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub id: i64,
    /// Identifier assigned by the upstream news API (e.g. `bbc-news`).
    pub external_id: String,
    pub name: String,
    pub description: Option<String>,
    pub url: Option<String>,
    pub category: Option<String>,
    pub language: Option<String>,
    pub country_code: Option<String>,
    pub country_id: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct NewSource {
    pub external_id: String,
    pub name: String,
    pub description: Option<String>,
    pub url: Option<String>,
    pub category: Option<String>,
    pub language: Option<String>,
    pub country_code: Option<String>,
    pub country_id: Option<i64>,
}
