use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One keyword-batch query against the `everything` endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    /// OR-joined quoted keyword expression.
    pub q: String,
    pub sources: Vec<String>,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub page_size: u32,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EverythingResponse {
    pub status: String,
    pub code: Option<String>,
    pub message: Option<String>,
    /// Decoded one record at a time so a single bad entry cannot sink the batch.
    #[serde(default)]
    pub articles: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SourcesResponse {
    pub status: String,
    pub message: Option<String>,
    #[serde(default)]
    pub sources: Vec<SourceListing>,
}

/// Source entry as listed by the `sources` endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceListing {
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    pub description: Option<String>,
    pub url: Option<String>,
    pub category: Option<String>,
    pub language: Option<String>,
    pub country: Option<String>,
}

/// Article record exactly as the upstream API returns it. Every field may be
/// missing or null; use [`RawArticle::validate`] before persisting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawArticle {
    pub url: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub published_at: Option<String>,
    pub url_to_image: Option<String>,
    pub source: Option<RawSource>,
    /// Decode error for a record whose fields had the wrong JSON types.
    #[serde(skip)]
    pub malformed: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawSource {
    pub id: Option<String>,
    pub name: Option<String>,
}

/// An upstream article that carries everything needed to persist it.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidArticle {
    pub url: String,
    pub title: String,
    pub summary: Option<String>,
    pub image_url: Option<String>,
    pub published_at: DateTime<Utc>,
    pub source_id: Option<String>,
    pub source_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("missing url")]
    MissingUrl,
    #[error("missing title")]
    MissingTitle,
    #[error("missing publishedAt")]
    MissingPublishedAt,
    #[error("unparseable publishedAt: {0}")]
    UnparseablePublishedAt(String),
    #[error("malformed record: {0}")]
    Malformed(String),
}

impl RawArticle {
    /// The dedup key, if present and non-empty.
    pub fn canonical_url(&self) -> Option<&str> {
        non_empty(self.url.as_deref())
    }

    /// Decode one upstream record. When the record does not fit the schema its
    /// URL (if readable) is kept so it still dedups, and `validate` rejects it.
    pub fn from_json(value: serde_json::Value) -> Self {
        let url = value
            .get("url")
            .and_then(serde_json::Value::as_str)
            .map(String::from);
        serde_json::from_value(value).unwrap_or_else(|e| RawArticle {
            url,
            malformed: Some(e.to_string()),
            ..RawArticle::default()
        })
    }

    pub fn validate(self) -> Result<ValidArticle, Rejection> {
        if let Some(reason) = self.malformed {
            return Err(Rejection::Malformed(reason));
        }
        let url = non_empty(self.url.as_deref())
            .ok_or(Rejection::MissingUrl)?
            .to_string();
        let title = non_empty(self.title.as_deref())
            .ok_or(Rejection::MissingTitle)?
            .to_string();
        let raw_published = non_empty(self.published_at.as_deref())
            .ok_or(Rejection::MissingPublishedAt)?;
        let published_at = parse_published_at(raw_published)
            .ok_or_else(|| Rejection::UnparseablePublishedAt(raw_published.to_string()))?;

        let (source_id, source_name) = match self.source {
            Some(source) => (
                source.id.filter(|id| !id.is_empty()),
                source.name.filter(|name| !name.is_empty()),
            ),
            None => (None, None),
        };

        Ok(ValidArticle {
            url,
            title,
            summary: self.description.filter(|d| !d.is_empty()),
            image_url: self.url_to_image.filter(|u| !u.is_empty()),
            published_at,
            source_id,
            source_name,
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// Parse an upstream timestamp. RFC 3339 is the normal shape; ISO 8601 without
/// an offset is read as UTC.
pub fn parse_published_at(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}
