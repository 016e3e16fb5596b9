//! The news ingestion job: aggregate preferences, fetch, then store and link.
//!
//! Each stage takes the previous stage's output by value or reference; nothing
//! is shared between runs except the database. Overlapping runs are safe
//! because article inserts and feed links are both idempotent.

mod aggregator;
mod fetcher;
mod linker;
mod matcher;

pub use aggregator::{aggregate, batch_keywords, CountryPlan, KeywordBatch};
pub use fetcher::{fetch_all, fetch_country, ArticleSet, FetchWindow};
pub use linker::{store_and_link, LinkReport};
pub use matcher::MatchIndex;

use chrono::{DateTime, Utc};

use crate::config::{Config, IngestLimits};
use crate::db::Repository;
use crate::error::Result;
use crate::newsapi::{ArticleSearch, NewsApiClient};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    pub preferences: usize,
    pub countries: usize,
    pub articles_fetched: usize,
    pub link: LinkReport,
}

/// One full pass of the pipeline against `search`.
pub async fn run_ingestion<S>(
    repo: &Repository,
    search: &S,
    limits: &IngestLimits,
    now: DateTime<Utc>,
) -> Result<RunReport>
where
    S: ArticleSearch + ?Sized,
{
    limits.validate()?;
    tracing::info!("Starting news fetch");

    let preferences = repo.load_preferences().await?;
    tracing::info!("Found {} user preferences", preferences.len());
    if preferences.is_empty() {
        tracing::warn!("No user preferences found");
        return Ok(RunReport::default());
    }

    let plans = aggregate(&preferences, limits);
    let window = FetchWindow::trailing(now, limits.window_hours);
    let articles = fetch_all(search, &plans, window, limits.page_size).await;

    let mut report = RunReport {
        preferences: preferences.len(),
        countries: plans.len(),
        articles_fetched: articles.len(),
        link: LinkReport::default(),
    };

    if !articles.is_empty() {
        report.link = store_and_link(repo, articles.into_vec(), &preferences).await?;
    }

    tracing::info!(
        "News fetch completed. Total articles processed: {}",
        report.articles_fetched
    );
    Ok(report)
}

/// Run once with the configured upstream client. Without an API key the run
/// stops before touching the network or the database.
pub async fn run_configured(config: &Config, repo: &Repository) -> Result<RunReport> {
    let client = NewsApiClient::from_config(config).inspect_err(|e| {
        tracing::error!("Cannot run news fetch: {}", e);
    })?;
    run_ingestion(repo, &client, &config.ingest, Utc::now()).await
}
