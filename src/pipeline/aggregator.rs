//! Groups user preferences by country and turns each country's keyword pool
//! into length-bounded query batches.

use std::collections::{BTreeMap, BTreeSet};

use crate::config::IngestLimits;
use crate::models::{normalize_keyword, UserId, UserPreferences};

const SEPARATOR: &str = " OR ";

/// Keywords that share one upstream query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordBatch(Vec<String>);

impl KeywordBatch {
    pub fn keywords(&self) -> &[String] {
        &self.0
    }

    /// Render as `"k1" OR "k2" OR ...`.
    pub fn query(&self) -> String {
        self.0
            .iter()
            .map(|k| format!("\"{k}\""))
            .collect::<Vec<_>>()
            .join(SEPARATOR)
    }
}

/// Everything needed to query the upstream API for one country.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountryPlan {
    pub user_ids: BTreeSet<UserId>,
    pub source_ids: Vec<String>,
    pub keyword_batches: Vec<KeywordBatch>,
}

#[derive(Default)]
struct CountryPool {
    user_ids: BTreeSet<UserId>,
    source_ids: BTreeSet<String>,
    keywords: Vec<String>,
}

/// Build one [`CountryPlan`] per lowercased ISO code. Countries without any
/// source or without any usable keyword are left out.
pub fn aggregate(
    preferences: &[UserPreferences],
    limits: &IngestLimits,
) -> BTreeMap<String, CountryPlan> {
    let mut pools: BTreeMap<String, CountryPool> = BTreeMap::new();

    for pref in preferences {
        if pref.countries.is_empty() {
            tracing::warn!("No countries found for user {}", pref.username);
            continue;
        }

        for country in &pref.countries {
            let pool = pools.entry(country.iso_code.to_lowercase()).or_default();
            pool.user_ids.insert(pref.user_id);
            pool.keywords.extend(pref.keywords.iter().cloned());

            for source in &pref.sources {
                if source.country_id == Some(country.id) {
                    pool.source_ids.insert(source.external_id.clone());
                }
            }
        }
    }

    let mut plans = BTreeMap::new();
    for (code, pool) in pools {
        if pool.source_ids.is_empty() {
            tracing::warn!("Skipping country {} - no sources", code);
            continue;
        }

        let keyword_batches = batch_keywords(&pool.keywords, limits.max_query_length);
        if keyword_batches.is_empty() {
            tracing::warn!("Skipping country {} - no keywords", code);
            continue;
        }

        let total_sources = pool.source_ids.len();
        let source_ids: Vec<String> = pool
            .source_ids
            .into_iter()
            .take(limits.max_sources)
            .collect();

        tracing::info!(
            "Country {}: {} users, {} sources ({} used), {} keyword batches",
            code,
            pool.user_ids.len(),
            total_sources,
            source_ids.len(),
            keyword_batches.len()
        );

        plans.insert(
            code,
            CountryPlan {
                user_ids: pool.user_ids,
                source_ids,
                keyword_batches,
            },
        );
    }

    plans
}

/// Normalize and dedupe `keywords`, then pack them greedily so each batch's
/// rendered query is at most `max_len` characters. A keyword too long to fit
/// in a batch of its own is dropped.
pub fn batch_keywords<S: AsRef<str>>(keywords: &[S], max_len: usize) -> Vec<KeywordBatch> {
    let unique: BTreeSet<String> = keywords
        .iter()
        .filter_map(|k| normalize_keyword(k.as_ref()))
        .collect();
    if unique.is_empty() {
        return Vec::new();
    }

    tracing::debug!("Processing {} unique keywords", unique.len());

    let separator_len = SEPARATOR.chars().count();
    let mut batches = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut current_len = 0;

    for keyword in unique {
        let quoted_len = keyword.chars().count() + 2;
        if quoted_len > max_len {
            tracing::warn!("Keyword too long, skipping: {}", keyword);
            continue;
        }

        if !current.is_empty() && current_len + separator_len + quoted_len > max_len {
            batches.push(KeywordBatch(std::mem::take(&mut current)));
            current_len = 0;
        }

        if !current.is_empty() {
            current_len += separator_len;
        }
        current_len += quoted_len;
        current.push(keyword);
    }

    if !current.is_empty() {
        batches.push(KeywordBatch(current));
    }

    tracing::debug!("Created {} keyword batches", batches.len());
    batches
}
