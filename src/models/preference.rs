use serde::{Deserialize, Serialize};

use super::{Country, Source, UserId};

/// A user's preference record with its country and source relations resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPreferences {
    pub id: i64,
    pub user_id: UserId,
    pub username: String,
    pub countries: Vec<Country>,
    pub sources: Vec<Source>,
    pub keywords: Vec<String>,
}

impl UserPreferences {
    /// Keywords lowercased and trimmed, blanks dropped. Duplicates are kept.
    pub fn normalized_keywords(&self) -> Vec<String> {
        self.keywords
            .iter()
            .filter_map(|k| normalize_keyword(k))
            .collect()
    }
}

/// Lowercase and trim a keyword, returning `None` when nothing is left.
pub fn normalize_keyword(raw: &str) -> Option<String> {
    let keyword = raw.trim().to_lowercase();
    if keyword.is_empty() {
        None
    } else {
        Some(keyword)
    }
}
