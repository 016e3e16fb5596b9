//! In-memory user matching for fetched articles.
//!
//! A user matches an article when both dimensions are satisfied:
//!
//! * source: the article's upstream source id is one the user prefers, or the
//!   user prefers no sources at all;
//! * keyword: one of the user's keywords occurs as a case-insensitive substring
//!   of `title + " " + summary`, or the user has no keywords at all.
//!
//! Keyword matching is plain substring search, so `"cat"` matches
//! `"category"`.

use std::collections::{BTreeSet, HashMap};

use crate::models::{UserId, UserPreferences};

/// Lookup tables built once per ingestion run from every preference record.
#[derive(Debug, Default, Clone)]
pub struct MatchIndex {
    users_by_source_id: HashMap<String, BTreeSet<UserId>>,
    users_by_keyword: HashMap<String, BTreeSet<UserId>>,
    users_with_no_sources: BTreeSet<UserId>,
    users_with_no_keywords: BTreeSet<UserId>,
}

impl MatchIndex {
    pub fn build(preferences: &[UserPreferences]) -> Self {
        let mut index = Self::default();

        for pref in preferences {
            if pref.sources.is_empty() {
                index.users_with_no_sources.insert(pref.user_id);
            } else {
                for source in &pref.sources {
                    index
                        .users_by_source_id
                        .entry(source.external_id.clone())
                        .or_default()
                        .insert(pref.user_id);
                }
            }

            let keywords = pref.normalized_keywords();
            if keywords.is_empty() {
                index.users_with_no_keywords.insert(pref.user_id);
            } else {
                for keyword in keywords {
                    index
                        .users_by_keyword
                        .entry(keyword)
                        .or_default()
                        .insert(pref.user_id);
                }
            }
        }

        index
    }

    pub fn matching_users(
        &self,
        source_id: Option<&str>,
        title: &str,
        summary: Option<&str>,
    ) -> BTreeSet<UserId> {
        let mut by_source = self.users_with_no_sources.clone();
        if let Some(users) = source_id.and_then(|id| self.users_by_source_id.get(id)) {
            by_source.extend(users);
        }
        if by_source.is_empty() {
            return BTreeSet::new();
        }

        let text = format!(
            "{} {}",
            title.to_lowercase(),
            summary.unwrap_or_default().to_lowercase()
        );

        let mut by_keyword = self.users_with_no_keywords.clone();
        for (keyword, users) in &self.users_by_keyword {
            if text.contains(keyword.as_str()) {
                by_keyword.extend(users);
            }
        }

        by_source.intersection(&by_keyword).copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Source;

    fn source(external_id: &str) -> Source {
        Source {
            id: 0,
            external_id: external_id.to_string(),
            name: external_id.to_string(),
            description: None,
            url: None,
            category: None,
            language: None,
            country_code: None,
            country_id: None,
        }
    }

    fn prefs(user_id: UserId, sources: &[&str], keywords: &[&str]) -> UserPreferences {
        UserPreferences {
            id: user_id,
            user_id,
            username: format!("user{user_id}"),
            countries: vec![],
            sources: sources.iter().map(|s| source(s)).collect(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }

    const A: UserId = 1;
    const B: UserId = 2;

    fn index_for_a_and_b() -> MatchIndex {
        MatchIndex::build(&[prefs(A, &[], &["car"]), prefs(B, &["bbc-news"], &[])])
    }

    #[test]
    fn vacuous_dimensions_match_on_the_other_one() {
        let index = index_for_a_and_b();
        let users = index.matching_users(Some("bbc-news"), "New car unveiled", None);
        assert_eq!(users, BTreeSet::from([A, B]));
    }

    #[test]
    fn unrelated_article_matches_nobody() {
        let index = index_for_a_and_b();
        let users = index.matching_users(Some("cnn"), "Election results", None);
        assert!(users.is_empty());
    }

    #[test]
    fn both_dimensions_are_required() {
        let index = MatchIndex::build(&[prefs(A, &["bbc-news"], &["space"])]);
        assert!(index
            .matching_users(Some("cnn"), "Space launch", None)
            .is_empty());
        assert!(index
            .matching_users(Some("bbc-news"), "Budget news", None)
            .is_empty());
        assert_eq!(
            index.matching_users(Some("bbc-news"), "Budget news", Some("Funding for SPACE agency")),
            BTreeSet::from([A])
        );
    }

    #[test]
    fn keyword_is_a_plain_substring() {
        let index = MatchIndex::build(&[prefs(A, &[], &["cat"])]);
        assert_eq!(
            index.matching_users(None, "Category error", None),
            BTreeSet::from([A])
        );
    }

    #[test]
    fn keywords_are_normalized() {
        let index = MatchIndex::build(&[prefs(A, &[], &["  SPACE "])]);
        assert_eq!(
            index.matching_users(None, "space launch", None),
            BTreeSet::from([A])
        );
    }

    #[test]
    fn blank_keywords_mean_no_restriction() {
        let index = MatchIndex::build(&[prefs(A, &[], &["", "  "])]);
        assert_eq!(
            index.matching_users(Some("anything"), "Anything at all", None),
            BTreeSet::from([A])
        );
    }

    #[test]
    fn missing_source_id_only_matches_unrestricted_users() {
        let index = index_for_a_and_b();
        assert_eq!(
            index.matching_users(None, "Car news", None),
            BTreeSet::from([A])
        );
    }
}
