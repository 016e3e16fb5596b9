//! Periodic news fetching.

use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use tokio::time::{self, MissedTickBehavior};

use crate::config::IngestLimits;
use crate::db::Repository;
use crate::error::Result;
use crate::newsapi::ArticleSearch;
use crate::pipeline::run_ingestion;

/// Run the ingestion pipeline every `every`, starting immediately, until
/// `shutdown` resolves. A failed run is logged and the next tick proceeds.
///
/// Runs never overlap within one scheduler: a run that outlasts the interval
/// delays the next tick instead of queueing a burst.
pub async fn run_every<S, F>(
    repo: &Repository,
    search: &S,
    limits: &IngestLimits,
    every: Duration,
    shutdown: F,
) -> Result<usize>
where
    S: ArticleSearch + ?Sized,
    F: Future<Output = ()>,
{
    let mut interval = time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    tracing::info!("Scheduling news fetch every {}s", every.as_secs());

    let mut runs = 0;
    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => {
                tracing::info!("Stopping scheduler after {} runs", runs);
                return Ok(runs);
            }
            _ = interval.tick() => {}
        }

        runs += 1;
        match run_ingestion(repo, search, limits, Utc::now()).await {
            Ok(report) => tracing::info!(
                "Run {}: {} articles fetched, {} new, {} new links",
                runs,
                report.articles_fetched,
                report.link.articles_created,
                report.link.links_created
            ),
            Err(e) => tracing::error!("Run {} failed: {}", runs, e),
        }
    }
}

/// Resolves on Ctrl-C. If the signal handler cannot be installed the
/// scheduler runs until the process is killed.
pub async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Cannot listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use super::*;
    use crate::config::DefaultSeed;
    use crate::error::AppError;
    use crate::models::{NewSource, NewUser};
    use crate::newsapi::{RawArticle, SearchQuery};

    /// Fails every search and signals `done` on the third call.
    #[derive(Default)]
    struct FailingSearch {
        calls: AtomicUsize,
        done: Notify,
    }

    #[async_trait]
    impl ArticleSearch for FailingSearch {
        async fn search(&self, _query: &SearchQuery) -> Result<Vec<RawArticle>> {
            if self.calls.fetch_add(1, Ordering::SeqCst) + 1 == 3 {
                self.done.notify_one();
            }
            Err(AppError::NewsApi("maximumResultsReached".into()))
        }
    }

    #[tokio::test]
    async fn failed_runs_do_not_stop_the_schedule() {
        let repo = Repository::in_memory().await.unwrap();
        repo.upsert_country("gb", "United Kingdom").await.unwrap();
        let gb = repo.get_country_by_code("gb").await.unwrap().unwrap();
        repo.upsert_source(NewSource {
            external_id: "bbc-news".into(),
            name: "BBC News".into(),
            description: None,
            url: None,
            category: None,
            language: None,
            country_code: Some("gb".into()),
            country_id: Some(gb.id),
        })
        .await
        .unwrap();
        repo.create_user_with_preferences(
            NewUser {
                username: "ann".into(),
                email: None,
                password_hash: "x".into(),
                first_name: String::new(),
                last_name: String::new(),
            },
            "tok".into(),
            DefaultSeed {
                countries: vec!["gb".into()],
                sources: vec!["bbc-news".into()],
                keywords: vec!["space".into()],
            },
        )
        .await
        .unwrap();

        let search = FailingSearch::default();
        let limits = IngestLimits::default();
        let runs = run_every(
            &repo,
            &search,
            &limits,
            Duration::from_millis(5),
            search.done.notified(),
        )
        .await
        .unwrap();

        assert_eq!(runs, 3);
        assert_eq!(search.calls.load(Ordering::SeqCst), 3);
        assert_eq!(repo.count_articles().await.unwrap(), 0);
    }
}
