use std::collections::HashMap;

use crate::db::Repository;
use crate::error::Result;
use crate::models::{NewArticle, UserId, UserPreferences};
use crate::newsapi::RawArticle;

use super::matcher::MatchIndex;

/// Counts for one store-and-link pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LinkReport {
    pub articles_seen: usize,
    pub articles_rejected: usize,
    pub articles_created: usize,
    pub links_staged: usize,
    pub links_created: usize,
}

/// Persist every valid article (first write wins) and link it to the users
/// whose preferences match. Links are written in one duplicate-tolerant batch
/// at the end.
pub async fn store_and_link(
    repo: &Repository,
    articles: Vec<RawArticle>,
    preferences: &[UserPreferences],
) -> Result<LinkReport> {
    tracing::info!(
        "Processing {} articles for {} users",
        articles.len(),
        preferences.len()
    );

    let index = MatchIndex::build(preferences);
    let source_ids: HashMap<String, i64> = repo.source_ids_by_external_id().await?;

    let mut report = LinkReport {
        articles_seen: articles.len(),
        ..LinkReport::default()
    };
    let mut staged: Vec<(UserId, i64)> = Vec::new();

    for raw in articles {
        let valid = match raw.validate() {
            Ok(valid) => valid,
            Err(reason) => {
                tracing::debug!("Skipping article: {}", reason);
                report.articles_rejected += 1;
                continue;
            }
        };

        let local_source_id = valid
            .source_id
            .as_deref()
            .and_then(|id| source_ids.get(id))
            .copied();

        let (article, created) = repo
            .get_or_create_article(NewArticle {
                title: valid.title,
                summary: valid.summary,
                canonical_url: valid.url,
                source_name: valid.source_name,
                source_id: local_source_id,
                image_url: valid.image_url,
                published_at: valid.published_at,
            })
            .await?;
        if created {
            report.articles_created += 1;
        }

        let users = index.matching_users(
            valid.source_id.as_deref(),
            &article.title,
            article.summary.as_deref(),
        );
        staged.extend(users.into_iter().map(|user_id| (user_id, article.id)));
    }

    report.links_staged = staged.len();
    report.links_created = repo.insert_user_articles(staged).await?;

    tracing::info!(
        "Processing complete: {} new articles, {} new links ({} matched)",
        report.articles_created,
        report.links_created,
        report.links_staged
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DefaultSeed;
    use crate::models::{NewSource, NewUser};
    use crate::newsapi::RawSource;

    fn raw(url: &str, title: &str, published_at: &str, source_id: &str) -> RawArticle {
        RawArticle {
            url: Some(url.to_string()),
            title: Some(title.to_string()),
            description: Some("Rocket lifts off".to_string()),
            published_at: Some(published_at.to_string()),
            url_to_image: None,
            source: Some(RawSource {
                id: Some(source_id.to_string()),
                name: Some("Display Name".to_string()),
            }),
            malformed: None,
        }
    }

    #[tokio::test]
    async fn rejects_invalid_records_and_resolves_sources() {
        let repo = Repository::in_memory().await.unwrap();
        repo.upsert_source(NewSource {
            external_id: "bbc-news".into(),
            name: "BBC News".into(),
            description: None,
            url: None,
            category: None,
            language: None,
            country_code: None,
            country_id: None,
        })
        .await
        .unwrap();
        let user = repo
            .create_user_with_preferences(
                NewUser {
                    username: "ann".into(),
                    email: None,
                    password_hash: "x".into(),
                    first_name: String::new(),
                    last_name: String::new(),
                },
                "tok".into(),
                DefaultSeed {
                    countries: vec![],
                    sources: vec![],
                    keywords: vec!["rocket".into()],
                },
            )
            .await
            .unwrap()
            .user;
        let preferences = repo.load_preferences().await.unwrap();

        let articles = vec![
            raw("https://x/1", "Launch", "2026-03-01T10:00:00Z", "bbc-news"),
            raw("https://x/2", "Other launch", "2026-03-01T11:00:00Z", "unknown-wire"),
            raw("https://x/3", "Bad date", "not a date", "bbc-news"),
            RawArticle::default(),
            RawArticle::from_json(serde_json::json!({
                "url": "https://x/4",
                "title": 12345,
                "publishedAt": "2026-03-01T12:00:00Z"
            })),
        ];
        let report = store_and_link(&repo, articles, &preferences).await.unwrap();

        assert_eq!(report.articles_seen, 5);
        assert_eq!(report.articles_rejected, 3);
        assert_eq!(report.articles_created, 2);
        assert_eq!(report.links_staged, 2);
        assert_eq!(report.links_created, 2);

        let known = repo.find_article_by_url("https://x/1").await.unwrap().unwrap();
        assert!(known.source_id.is_some());
        assert_eq!(known.source_name.as_deref(), Some("Display Name"));
        let unknown = repo.find_article_by_url("https://x/2").await.unwrap().unwrap();
        assert!(unknown.source_id.is_none());
        assert!(repo.find_article_by_url("https://x/4").await.unwrap().is_none());

        let feed = repo.user_feed(user.id, 10).await.unwrap();
        assert_eq!(feed.len(), 2);
    }
}
