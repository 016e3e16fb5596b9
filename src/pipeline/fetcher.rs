use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};

use crate::newsapi::{ArticleSearch, RawArticle, SearchQuery};

use super::aggregator::CountryPlan;

/// Fetched articles keyed by canonical URL, in first-seen order. Inserting a
/// URL that is already present keeps the earlier record.
#[derive(Debug, Default, Clone)]
pub struct ArticleSet {
    articles: Vec<RawArticle>,
    urls: HashSet<String>,
}

impl ArticleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when the article has no URL or the URL was already seen.
    pub fn insert(&mut self, article: RawArticle) -> bool {
        let Some(url) = article.canonical_url() else {
            return false;
        };
        if !self.urls.insert(url.to_string()) {
            return false;
        }
        self.articles.push(article);
        true
    }

    pub fn merge(&mut self, other: ArticleSet) {
        for article in other.articles {
            self.insert(article);
        }
    }

    pub fn len(&self) -> usize {
        self.articles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.articles.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RawArticle> {
        self.articles.iter()
    }

    pub fn into_vec(self) -> Vec<RawArticle> {
        self.articles
    }
}

impl FromIterator<RawArticle> for ArticleSet {
    fn from_iter<I: IntoIterator<Item = RawArticle>>(iter: I) -> Self {
        let mut set = Self::new();
        for article in iter {
            set.insert(article);
        }
        set
    }
}

/// Publication window sent with every query, at day granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl FetchWindow {
    /// Falls back to a same-day window when `hours` does not fit in a timestamp.
    pub fn trailing(now: DateTime<Utc>, hours: i64) -> Self {
        let from = TimeDelta::try_hours(hours)
            .and_then(|span| now.checked_sub_signed(span))
            .unwrap_or_else(|| {
                tracing::warn!("Fetch window of {} hours is out of range, using today", hours);
                now
            });
        Self {
            from: from.date_naive(),
            to: now.date_naive(),
        }
    }
}

/// Run every keyword batch for one country. A failed batch is logged and
/// contributes nothing.
pub async fn fetch_country<S>(
    search: &S,
    country_code: &str,
    plan: &CountryPlan,
    window: FetchWindow,
    page_size: u32,
) -> ArticleSet
where
    S: ArticleSearch + ?Sized,
{
    tracing::info!("Fetching articles for country: {}", country_code);

    let mut collected = ArticleSet::new();
    for (batch_idx, batch) in plan.keyword_batches.iter().enumerate() {
        let query = SearchQuery {
            q: batch.query(),
            sources: plan.source_ids.clone(),
            from: window.from,
            to: window.to,
            page_size,
        };

        match search.search(&query).await {
            Ok(articles) => {
                tracing::debug!(
                    "Country {}, batch {}: {} articles",
                    country_code,
                    batch_idx,
                    articles.len()
                );
                for article in articles {
                    collected.insert(article);
                }
            }
            Err(e) => {
                tracing::error!(
                    "API request failed for {}, batch {}: {}",
                    country_code,
                    batch_idx,
                    e
                );
            }
        }
    }

    tracing::info!(
        "Country {}: collected {} articles",
        country_code,
        collected.len()
    );
    collected
}

/// Fetch every country in order and merge the results, first occurrence of a
/// URL winning across countries.
pub async fn fetch_all<S>(
    search: &S,
    plans: &BTreeMap<String, CountryPlan>,
    window: FetchWindow,
    page_size: u32,
) -> ArticleSet
where
    S: ArticleSearch + ?Sized,
{
    let mut all = ArticleSet::new();
    for (code, plan) in plans {
        let articles = fetch_country(search, code, plan, window, page_size).await;
        all.merge(articles);
    }
    tracing::info!("Total unique articles: {}", all.len());
    all
}
