use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use url::Url;

use crate::config::Config;
use crate::error::{AppError, Result};

use super::types::{EverythingResponse, RawArticle, SearchQuery, SourceListing, SourcesResponse};

const API_KEY_HEADER: &str = "X-Api-Key";

/// Keyword search against the upstream news API. The ingestion pipeline only
/// depends on this seam, so any failure here is isolated to one query.
#[async_trait]
pub trait ArticleSearch: Send + Sync {
    async fn search(&self, query: &SearchQuery) -> Result<Vec<RawArticle>>;
}

/// Listing of the sources the upstream API knows for a country.
#[async_trait]
pub trait SourceCatalog: Send + Sync {
    async fn sources_for_country(&self, iso_code: &str) -> Result<Vec<SourceListing>>;
}

pub struct NewsApiClient {
    client: Client,
    api_key: String,
    base_url: Url,
}

impl NewsApiClient {
    pub fn new(api_key: String, base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("newsfeed/", env!("CARGO_PKG_VERSION")))
            .build()?;

        // `Url::join` drops the last path segment unless the base ends with '/'.
        let base_url = if base_url.ends_with('/') {
            Url::parse(base_url)?
        } else {
            Url::parse(&format!("{base_url}/"))?
        };

        Ok(Self {
            client,
            api_key,
            base_url,
        })
    }

    /// Build a client from config. A missing key is a fatal precondition for
    /// every run that talks to the API.
    pub fn from_config(config: &Config) -> Result<Self> {
        let api_key = config.api_key().ok_or(AppError::MissingApiKey)?;
        Self::new(
            api_key.to_string(),
            &config.newsapi_base_url,
            config.request_timeout(),
        )
    }
}

#[async_trait]
impl ArticleSearch for NewsApiClient {
    async fn search(&self, query: &SearchQuery) -> Result<Vec<RawArticle>> {
        let url = self.base_url.join("everything")?;
        let response = self
            .client
            .get(url)
            .header(API_KEY_HEADER, &self.api_key)
            .query(&everything_params(query))
            .send()
            .await?;

        let body: EverythingResponse = read_json(response).await?;
        if body.status == "error" {
            return Err(AppError::NewsApi(format!(
                "{}: {}",
                body.code.as_deref().unwrap_or("error"),
                body.message.as_deref().unwrap_or("unknown error")
            )));
        }
        Ok(body.articles.into_iter().map(RawArticle::from_json).collect())
    }
}

#[async_trait]
impl SourceCatalog for NewsApiClient {
    async fn sources_for_country(&self, iso_code: &str) -> Result<Vec<SourceListing>> {
        let url = self.base_url.join("sources")?;
        let response = self
            .client
            .get(url)
            .header(API_KEY_HEADER, &self.api_key)
            .query(&[("country", iso_code)])
            .send()
            .await?;

        let body: SourcesResponse = read_json(response).await?;
        if body.status == "error" {
            return Err(AppError::NewsApi(
                body.message.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }
        Ok(body.sources)
    }
}

/// Query string for the `everything` endpoint. The credential travels in a
/// header so it never shows up in logged URLs.
pub fn everything_params(query: &SearchQuery) -> Vec<(&'static str, String)> {
    vec![
        ("q", query.q.clone()),
        ("searchIn", "title,content".to_string()),
        ("from", query.from.format("%Y-%m-%d").to_string()),
        ("to", query.to.format("%Y-%m-%d").to_string()),
        ("pageSize", query.page_size.to_string()),
        ("sortBy", "publishedAt".to_string()),
        ("sources", query.sources.join(",")),
    ]
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let error_text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<serde_json::Value>(&error_text)
            .ok()
            .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from))
            .unwrap_or(error_text);
        return Err(AppError::NewsApi(format!("HTTP {status}: {message}")));
    }
    Ok(response.json().await?)
}
