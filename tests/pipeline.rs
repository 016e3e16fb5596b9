use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok};

use newsfeed::config::{Config, DefaultSeed, IngestLimits};
use newsfeed::db::Repository;
use newsfeed::error::{AppError, Result};
use newsfeed::models::NewSource;
use newsfeed::newsapi::{ArticleSearch, RawArticle, RawSource, SearchQuery};
use newsfeed::pipeline::{run_configured, run_ingestion};
use newsfeed::services::{register_user, Registration};

/// Answers each query by its first source id; sources listed in `failing`
/// return an error instead.
struct ScriptedSearch {
    responses: Vec<(&'static str, Vec<RawArticle>)>,
    failing: Vec<&'static str>,
    queries: Mutex<Vec<SearchQuery>>,
}

impl ScriptedSearch {
    fn new(responses: Vec<(&'static str, Vec<RawArticle>)>) -> Self {
        Self {
            responses,
            failing: Vec::new(),
            queries: Mutex::new(Vec::new()),
        }
    }

    fn failing(mut self, source: &'static str) -> Self {
        self.failing.push(source);
        self
    }

    fn query_count(&self) -> usize {
        self.queries.lock().unwrap().len()
    }
}

#[async_trait]
impl ArticleSearch for ScriptedSearch {
    async fn search(&self, query: &SearchQuery) -> Result<Vec<RawArticle>> {
        self.queries.lock().unwrap().push(query.clone());
        let source = query.sources.first().map(String::as_str).unwrap_or_default();
        if self.failing.contains(&source) {
            return Err(AppError::NewsApi("rateLimited: too many requests".into()));
        }
        Ok(self
            .responses
            .iter()
            .filter(|(s, _)| *s == source)
            .flat_map(|(_, articles)| articles.clone())
            .collect())
    }
}

fn article(url: &str, title: &str, source_id: &str) -> RawArticle {
    RawArticle {
        url: Some(url.to_string()),
        title: Some(title.to_string()),
        description: Some("Coverage from the launch site".to_string()),
        published_at: Some("2026-03-01T09:30:00Z".to_string()),
        url_to_image: None,
        source: Some(RawSource {
            id: Some(source_id.to_string()),
            name: Some(source_id.to_uppercase()),
        }),
        malformed: None,
    }
}

struct Fixture {
    _dir: TempDir,
    repo: Repository,
}

async fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("newsfeed.db");
    let repo = Repository::new(path.to_str().unwrap()).await.unwrap();

    for (code, name) in [("gb", "United Kingdom"), ("us", "United States"), ("fr", "France")] {
        repo.upsert_country(code, name).await.unwrap();
    }
    for (external_id, code) in [("bbc-news", "gb"), ("cnn", "us")] {
        let country = repo.get_country_by_code(code).await.unwrap().unwrap();
        repo.upsert_source(NewSource {
            external_id: external_id.to_string(),
            name: external_id.to_uppercase(),
            description: None,
            url: None,
            category: Some("general".into()),
            language: Some("en".into()),
            country_code: Some(code.to_string()),
            country_id: Some(country.id),
        })
        .await
        .unwrap();
    }

    Fixture { _dir: dir, repo }
}

async fn register(repo: &Repository, login: &str, seed: DefaultSeed) -> i64 {
    let registration = Registration {
        login: login.to_string(),
        password: "launchpad".to_string(),
        ..Registration::default()
    };
    register_user(repo, registration, &seed).await.unwrap().user.id
}

fn seed(countries: &[&str], sources: &[&str], keywords: &[&str]) -> DefaultSeed {
    let owned = |items: &[&str]| -> Vec<String> { items.iter().map(|s| s.to_string()).collect() };
    DefaultSeed {
        countries: owned(countries),
        sources: owned(sources),
        keywords: owned(keywords),
    }
}

fn now() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

#[tokio::test]
async fn space_article_reaches_the_matching_user() {
    let Fixture { _dir, repo } = fixture().await;
    let user_id = register(&repo, "astro@example.com", seed(&["gb"], &["bbc-news"], &["space"])).await;

    let search = ScriptedSearch::new(vec![(
        "bbc-news",
        vec![article("https://bbc.example/space-launch", "Space launch succeeds", "bbc-news")],
    )]);

    let report = assert_ok!(run_ingestion(&repo, &search, &IngestLimits::default(), now()).await);
    assert_eq!(report.countries, 1);
    assert_eq!(report.articles_fetched, 1);
    assert_eq!(report.link.articles_created, 1);
    assert_eq!(report.link.links_created, 1);

    let queries = search.queries.lock().unwrap().clone();
    assert_eq!(queries.len(), 1);
    assert_eq!(queries[0].q, "\"space\"");
    assert_eq!(queries[0].sources, vec!["bbc-news"]);

    assert_eq!(repo.count_articles().await.unwrap(), 1);
    assert_eq!(repo.count_user_articles().await.unwrap(), 1);

    let feed = repo.user_feed(user_id, 10).await.unwrap();
    assert_eq!(feed.len(), 1);
    assert_eq!(feed[0].article.canonical_url, "https://bbc.example/space-launch");
}

#[tokio::test]
async fn repeated_runs_do_not_duplicate_rows() {
    let Fixture { _dir, repo } = fixture().await;
    register(&repo, "astro", seed(&["gb"], &["bbc-news"], &["space"])).await;
    register(&repo, "racer", seed(&["gb"], &["bbc-news"], &["car", "space"])).await;

    let search = ScriptedSearch::new(vec![(
        "bbc-news",
        vec![
            article("https://bbc.example/1", "Space station crew returns", "bbc-news"),
            article("https://bbc.example/2", "New car tax rules", "bbc-news"),
            article("https://bbc.example/1", "Space station crew returns (updated)", "bbc-news"),
        ],
    )]);
    let limits = IngestLimits::default();

    let first = assert_ok!(run_ingestion(&repo, &search, &limits, now()).await);
    assert_eq!(first.articles_fetched, 2);
    let articles = repo.count_articles().await.unwrap();
    let links = repo.count_user_articles().await.unwrap();
    assert_eq!(articles, 2);
    // astro: article 1; racer: articles 1 and 2
    assert_eq!(links, 3);

    let second = assert_ok!(run_ingestion(&repo, &search, &limits, now()).await);
    assert_eq!(second.link.articles_created, 0);
    assert_eq!(second.link.links_created, 0);
    assert_eq!(repo.count_articles().await.unwrap(), articles);
    assert_eq!(repo.count_user_articles().await.unwrap(), links);

    let stored = repo
        .find_article_by_url("https://bbc.example/1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.title, "Space station crew returns");
}

#[tokio::test]
async fn failing_country_does_not_block_the_others() {
    let Fixture { _dir, repo } = fixture().await;
    let uk = register(&repo, "uk-reader", seed(&["gb"], &["bbc-news"], &["space"])).await;
    let us = register(&repo, "us-reader", seed(&["us"], &["cnn"], &["space"])).await;

    let search = ScriptedSearch::new(vec![
        (
            "bbc-news",
            vec![article("https://bbc.example/space", "Space capsule lands", "bbc-news")],
        ),
        (
            "cnn",
            vec![article("https://cnn.example/space", "Space walk", "cnn")],
        ),
    ])
    .failing("cnn");

    let report = assert_ok!(run_ingestion(&repo, &search, &IngestLimits::default(), now()).await);
    assert_eq!(search.query_count(), 2);
    assert_eq!(report.articles_fetched, 1);

    assert_eq!(repo.user_feed(uk, 10).await.unwrap().len(), 1);
    assert!(repo.user_feed(us, 10).await.unwrap().is_empty());
    assert!(repo
        .find_article_by_url("https://cnn.example/space")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn country_without_sources_is_not_queried() {
    let Fixture { _dir, repo } = fixture().await;
    // bbc-news belongs to gb, so it does not count as a French source
    register(&repo, "paris", seed(&["fr"], &["bbc-news"], &["space"])).await;

    let search = ScriptedSearch::new(Vec::new());
    let report = assert_ok!(run_ingestion(&repo, &search, &IngestLimits::default(), now()).await);

    assert_eq!(report.preferences, 1);
    assert_eq!(report.countries, 0);
    assert_eq!(search.query_count(), 0);
    assert_eq!(repo.count_articles().await.unwrap(), 0);
}

#[tokio::test]
async fn no_preferences_means_no_requests() {
    let Fixture { _dir, repo } = fixture().await;
    let search = ScriptedSearch::new(Vec::new());

    let report = assert_ok!(run_ingestion(&repo, &search, &IngestLimits::default(), now()).await);
    assert_eq!(report.preferences, 0);
    assert_eq!(search.query_count(), 0);
}

#[tokio::test]
async fn missing_api_key_aborts_before_any_write() {
    let Fixture { _dir, repo } = fixture().await;
    register(&repo, "astro", seed(&["gb"], &["bbc-news"], &["space"])).await;

    let config = Config {
        newsapi_key: Some("   ".into()),
        ..Config::default()
    };
    let err = assert_err!(run_configured(&config, &repo).await);
    assert!(matches!(err, AppError::MissingApiKey));

    assert_eq!(repo.count_articles().await.unwrap(), 0);
    assert_eq!(repo.count_user_articles().await.unwrap(), 0);
}

#[tokio::test]
async fn zero_source_cap_is_refused_before_querying() {
    let Fixture { _dir, repo } = fixture().await;
    register(&repo, "astro", seed(&["gb"], &["bbc-news"], &["space"])).await;

    let search = ScriptedSearch::new(Vec::new());
    let limits = IngestLimits {
        max_sources: 0,
        ..IngestLimits::default()
    };
    let err = assert_err!(run_ingestion(&repo, &search, &limits, now()).await);
    assert!(matches!(err, AppError::Config(_)));
    assert_eq!(search.query_count(), 0);
}
