use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, OptionalExtension, Row, TransactionBehavior};
use tokio_rusqlite::Connection;

use crate::config::DefaultSeed;
use crate::error::{AppError, Result};
use crate::models::{
    Article, AuthToken, Country, FeedEntry, NewArticle, NewSource, NewUser, RegisteredUser,
    Source, User, UserId, UserPreferences,
};

use super::schema::SCHEMA;

const ARTICLE_COLUMNS: &str = "a.id, a.title, a.summary, a.canonical_url, a.source_name, \
     a.source_id, a.image_url, a.published_at, a.fetched_at";

const SOURCE_COLUMNS: &str = "s.id, s.external_id, s.name, s.description, s.url, s.category, \
     s.language, s.country_code, s.country_id";

/// What happened to a country row during seeding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountryChange {
    Created,
    Renamed,
    Unchanged,
}

#[derive(Clone)]
pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub async fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).await?;
        Self::init(conn).await
    }

    pub async fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self> {
        conn.call(|conn| {
            // Overlapping runs from separate processes wait on each other's writes.
            conn.busy_timeout(Duration::from_secs(10))?;
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    // Country operations

    pub async fn upsert_country(&self, iso_code: &str, name: &str) -> Result<CountryChange> {
        let iso_code = iso_code.to_lowercase();
        let name = name.to_string();
        let change = self
            .conn
            .call(move |conn| {
                let existing: Option<String> = conn
                    .query_row(
                        "SELECT name FROM countries WHERE iso_code = ?1",
                        params![iso_code],
                        |row| row.get(0),
                    )
                    .optional()?;

                let change = match existing {
                    None => {
                        conn.execute(
                            "INSERT INTO countries (name, iso_code) VALUES (?1, ?2)
                             ON CONFLICT DO NOTHING",
                            params![name, iso_code],
                        )?;
                        CountryChange::Created
                    }
                    Some(current) if current != name => {
                        conn.execute(
                            "UPDATE countries SET name = ?1 WHERE iso_code = ?2",
                            params![name, iso_code],
                        )?;
                        CountryChange::Renamed
                    }
                    Some(_) => CountryChange::Unchanged,
                };
                Ok(change)
            })
            .await?;
        Ok(change)
    }

    pub async fn get_all_countries(&self) -> Result<Vec<Country>> {
        let countries = self
            .conn
            .call(|conn| {
                let mut stmt =
                    conn.prepare("SELECT id, name, iso_code FROM countries ORDER BY name")?;
                let countries = stmt
                    .query_map([], country_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(countries)
            })
            .await?;
        Ok(countries)
    }

    pub async fn get_country_by_code(&self, iso_code: &str) -> Result<Option<Country>> {
        let iso_code = iso_code.to_lowercase();
        let country = self
            .conn
            .call(move |conn| {
                let country = conn
                    .query_row(
                        "SELECT id, name, iso_code FROM countries WHERE iso_code = ?1",
                        params![iso_code],
                        country_from_row,
                    )
                    .optional()?;
                Ok(country)
            })
            .await?;
        Ok(country)
    }

    // Source operations

    /// Insert or refresh a source keyed by its external id. Returns `true` when created.
    pub async fn upsert_source(&self, source: NewSource) -> Result<bool> {
        let created = self
            .conn
            .call(move |conn| {
                let exists = conn
                    .query_row(
                        "SELECT 1 FROM sources WHERE external_id = ?1",
                        params![source.external_id],
                        |_| Ok(()),
                    )
                    .optional()?
                    .is_some();

                conn.execute(
                    r#"INSERT INTO sources (external_id, name, description, url, category, language, country_code, country_id)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                       ON CONFLICT(external_id) DO UPDATE SET
                           name = excluded.name,
                           description = excluded.description,
                           url = excluded.url,
                           category = excluded.category,
                           language = excluded.language,
                           country_code = excluded.country_code,
                           country_id = excluded.country_id"#,
                    params![
                        source.external_id,
                        source.name,
                        source.description,
                        source.url,
                        source.category,
                        source.language,
                        source.country_code,
                        source.country_id,
                    ],
                )?;
                Ok(!exists)
            })
            .await?;
        Ok(created)
    }

    /// Map of upstream source id to local row id, read once per ingestion run.
    pub async fn source_ids_by_external_id(&self) -> Result<HashMap<String, i64>> {
        let map = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare("SELECT external_id, id FROM sources")?;
                let map = stmt
                    .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                    .collect::<std::result::Result<HashMap<String, i64>, _>>()?;
                Ok(map)
            })
            .await?;
        Ok(map)
    }

    pub async fn count_sources(&self) -> Result<i64> {
        self.count("SELECT COUNT(*) FROM sources").await
    }

    // User operations

    pub async fn username_exists(&self, username: &str) -> Result<bool> {
        let username = username.to_string();
        let exists = self
            .conn
            .call(move |conn| {
                let exists = conn
                    .query_row(
                        "SELECT 1 FROM users WHERE username = ?1",
                        params![username],
                        |_| Ok(()),
                    )
                    .optional()?
                    .is_some();
                Ok(exists)
            })
            .await?;
        Ok(exists)
    }

    pub async fn email_exists(&self, email: &str) -> Result<bool> {
        let email = email.to_string();
        let exists = self
            .conn
            .call(move |conn| {
                let exists = conn
                    .query_row(
                        "SELECT 1 FROM users WHERE email = ?1 COLLATE NOCASE",
                        params![email],
                        |_| Ok(()),
                    )
                    .optional()?
                    .is_some();
                Ok(exists)
            })
            .await?;
        Ok(exists)
    }

    pub async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let username = username.to_string();
        let user = self
            .conn
            .call(move |conn| {
                let user = conn
                    .query_row(
                        "SELECT id, username, email, first_name, last_name, date_joined
                         FROM users WHERE username = ?1",
                        params![username],
                        user_from_row,
                    )
                    .optional()?;
                Ok(user)
            })
            .await?;
        Ok(user)
    }

    /// Create a user, their auth token and their seeded preference record in one
    /// transaction. Seed countries and sources that do not exist are skipped.
    pub async fn create_user_with_preferences(
        &self,
        user: NewUser,
        token_key: String,
        seed: DefaultSeed,
    ) -> Result<RegisteredUser> {
        let username = user.username.clone();
        let keywords_json = serde_json::to_string(&seed.keywords)?;

        let registered = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

                let taken = tx
                    .query_row(
                        "SELECT 1 FROM users WHERE username = ?1",
                        params![user.username],
                        |_| Ok(()),
                    )
                    .optional()?
                    .is_some();
                if taken {
                    return Ok(None);
                }

                tx.execute(
                    "INSERT INTO users (username, email, password_hash, first_name, last_name)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        user.username,
                        user.email,
                        user.password_hash,
                        user.first_name,
                        user.last_name
                    ],
                )?;
                let user_id = tx.last_insert_rowid();

                tx.execute(
                    "INSERT INTO auth_tokens (key, user_id) VALUES (?1, ?2)",
                    params![token_key, user_id],
                )?;

                tx.execute(
                    "INSERT INTO user_preferences (user_id, keywords) VALUES (?1, ?2)",
                    params![user_id, keywords_json],
                )?;
                let preference_id = tx.last_insert_rowid();

                for code in &seed.countries {
                    tx.execute(
                        "INSERT OR IGNORE INTO preference_countries (preference_id, country_id)
                         SELECT ?1, id FROM countries WHERE iso_code = ?2",
                        params![preference_id, code.to_lowercase()],
                    )?;
                }
                for external_id in &seed.sources {
                    tx.execute(
                        "INSERT OR IGNORE INTO preference_sources (preference_id, source_id)
                         SELECT ?1, id FROM sources WHERE external_id = ?2",
                        params![preference_id, external_id],
                    )?;
                }

                let user = tx.query_row(
                    "SELECT id, username, email, first_name, last_name, date_joined
                     FROM users WHERE id = ?1",
                    params![user_id],
                    user_from_row,
                )?;
                let token = tx.query_row(
                    "SELECT key, user_id, created_at FROM auth_tokens WHERE user_id = ?1",
                    params![user_id],
                    token_from_row,
                )?;

                tx.commit()?;
                Ok(Some(RegisteredUser { user, token }))
            })
            .await?;

        registered.ok_or(AppError::UsernameTaken(username))
    }

    // Preference operations

    /// Every preference record with countries and sources resolved.
    pub async fn load_preferences(&self) -> Result<Vec<UserPreferences>> {
        let preferences = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT p.id, p.user_id, u.username, p.keywords
                     FROM user_preferences p
                     JOIN users u ON u.id = p.user_id
                     ORDER BY p.user_id",
                )?;
                let mut preferences = stmt
                    .query_map([], preference_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;

                let index: HashMap<i64, usize> = preferences
                    .iter()
                    .enumerate()
                    .map(|(i, p)| (p.id, i))
                    .collect();

                let mut stmt = conn.prepare(
                    "SELECT pc.preference_id, c.id, c.name, c.iso_code
                     FROM preference_countries pc
                     JOIN countries c ON c.id = pc.country_id
                     ORDER BY c.iso_code",
                )?;
                let rows = stmt.query_map([], |row| {
                    let preference_id: i64 = row.get(0)?;
                    let country = Country {
                        id: row.get(1)?,
                        name: row.get(2)?,
                        iso_code: row.get(3)?,
                    };
                    Ok((preference_id, country))
                })?;
                for row in rows {
                    let (preference_id, country) = row?;
                    if let Some(&i) = index.get(&preference_id) {
                        preferences[i].countries.push(country);
                    }
                }

                let mut stmt = conn.prepare(&format!(
                    "SELECT ps.preference_id, {SOURCE_COLUMNS}
                     FROM preference_sources ps
                     JOIN sources s ON s.id = ps.source_id
                     ORDER BY s.external_id"
                ))?;
                let rows = stmt.query_map([], |row| {
                    let preference_id: i64 = row.get(0)?;
                    Ok((preference_id, source_from_row_at(row, 1)?))
                })?;
                for row in rows {
                    let (preference_id, source) = row?;
                    if let Some(&i) = index.get(&preference_id) {
                        preferences[i].sources.push(source);
                    }
                }

                Ok(preferences)
            })
            .await?;
        Ok(preferences)
    }

    pub async fn preferences_for_user(&self, user_id: UserId) -> Result<Option<UserPreferences>> {
        Ok(self
            .load_preferences()
            .await?
            .into_iter()
            .find(|p| p.user_id == user_id))
    }

    pub async fn set_keywords(&self, user_id: UserId, keywords: Vec<String>) -> Result<()> {
        let keywords_json = serde_json::to_string(&keywords)?;
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE user_preferences
                     SET keywords = ?1, updated_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now')
                     WHERE user_id = ?2",
                    params![keywords_json, user_id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Replace the user's preferred countries. Returns how many codes resolved.
    pub async fn set_preferred_countries(
        &self,
        user_id: UserId,
        iso_codes: Vec<String>,
    ) -> Result<usize> {
        let matched = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "DELETE FROM preference_countries WHERE preference_id =
                     (SELECT id FROM user_preferences WHERE user_id = ?1)",
                    params![user_id],
                )?;
                let mut matched = 0;
                for code in &iso_codes {
                    matched += tx.execute(
                        "INSERT OR IGNORE INTO preference_countries (preference_id, country_id)
                         SELECT p.id, c.id FROM user_preferences p, countries c
                         WHERE p.user_id = ?1 AND c.iso_code = ?2",
                        params![user_id, code.to_lowercase()],
                    )?;
                }
                tx.commit()?;
                Ok(matched)
            })
            .await?;
        Ok(matched)
    }

    /// Replace the user's preferred sources. Returns how many ids resolved.
    pub async fn set_preferred_sources(
        &self,
        user_id: UserId,
        external_ids: Vec<String>,
    ) -> Result<usize> {
        let matched = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "DELETE FROM preference_sources WHERE preference_id =
                     (SELECT id FROM user_preferences WHERE user_id = ?1)",
                    params![user_id],
                )?;
                let mut matched = 0;
                for external_id in &external_ids {
                    matched += tx.execute(
                        "INSERT OR IGNORE INTO preference_sources (preference_id, source_id)
                         SELECT p.id, s.id FROM user_preferences p, sources s
                         WHERE p.user_id = ?1 AND s.external_id = ?2",
                        params![user_id, external_id],
                    )?;
                }
                tx.commit()?;
                Ok(matched)
            })
            .await?;
        Ok(matched)
    }

    // Article operations

    /// Insert the article unless its canonical URL is already stored. Returns the
    /// stored row (which may predate this call) and whether it was created.
    pub async fn get_or_create_article(&self, article: NewArticle) -> Result<(Article, bool)> {
        let result = self
            .conn
            .call(move |conn| {
                let inserted = conn.execute(
                    r#"INSERT INTO articles (title, summary, canonical_url, source_name, source_id, image_url, published_at)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                       ON CONFLICT(canonical_url) DO NOTHING"#,
                    params![
                        article.title,
                        article.summary,
                        article.canonical_url,
                        article.source_name,
                        article.source_id,
                        article.image_url,
                        format_datetime(&article.published_at),
                    ],
                )?;
                let stored = conn.query_row(
                    &format!("SELECT {ARTICLE_COLUMNS} FROM articles a WHERE a.canonical_url = ?1"),
                    params![article.canonical_url],
                    article_from_row,
                )?;
                Ok((stored, inserted == 1))
            })
            .await?;
        Ok(result)
    }

    pub async fn find_article_by_url(&self, url: &str) -> Result<Option<Article>> {
        let url = url.to_string();
        let article = self
            .conn
            .call(move |conn| {
                let article = conn
                    .query_row(
                        &format!(
                            "SELECT {ARTICLE_COLUMNS} FROM articles a WHERE a.canonical_url = ?1"
                        ),
                        params![url],
                        article_from_row,
                    )
                    .optional()?;
                Ok(article)
            })
            .await?;
        Ok(article)
    }

    pub async fn count_articles(&self) -> Result<i64> {
        self.count("SELECT COUNT(*) FROM articles").await
    }

    // User-article links

    /// Bulk insert feed links in one transaction, ignoring pairs that already
    /// exist. Returns the number of rows actually written.
    pub async fn insert_user_articles(&self, links: Vec<(UserId, i64)>) -> Result<usize> {
        if links.is_empty() {
            return Ok(0);
        }
        let inserted = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let mut inserted = 0;
                {
                    let mut stmt = tx.prepare(
                        "INSERT OR IGNORE INTO user_articles (user_id, article_id) VALUES (?1, ?2)",
                    )?;
                    for (user_id, article_id) in &links {
                        inserted += stmt.execute(params![user_id, article_id])?;
                    }
                }
                tx.commit()?;
                Ok(inserted)
            })
            .await?;
        Ok(inserted)
    }

    pub async fn count_user_articles(&self) -> Result<i64> {
        self.count("SELECT COUNT(*) FROM user_articles").await
    }

    /// The user's personalized feed, newest publication first.
    pub async fn user_feed(&self, user_id: UserId, limit: usize) -> Result<Vec<FeedEntry>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let entries = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT ua.user_id, ua.saved_at, {ARTICLE_COLUMNS}
                     FROM user_articles ua
                     JOIN articles a ON a.id = ua.article_id
                     WHERE ua.user_id = ?1
                     ORDER BY a.published_at DESC, a.id DESC
                     LIMIT ?2"
                ))?;
                let entries = stmt
                    .query_map(params![user_id, limit], |row| {
                        Ok(FeedEntry {
                            user_id: row.get(0)?,
                            saved_at: timestamp_at(row, 1)?,
                            article: article_from_row_at(row, 2)?,
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(entries)
            })
            .await?;
        Ok(entries)
    }

    async fn count(&self, sql: &'static str) -> Result<i64> {
        let count = self
            .conn
            .call(move |conn| Ok(conn.query_row(sql, [], |row| row.get(0))?))
            .await?;
        Ok(count)
    }
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    // RFC3339 (e.g., "2026-01-11T12:34:56Z")
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // SQLite datetime format (e.g., "2026-01-11 12:34:56")
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    None
}

fn timestamp_at(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_datetime(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("invalid timestamp: {raw}").into(),
        )
    })
}

fn country_from_row(row: &Row) -> rusqlite::Result<Country> {
    Ok(Country {
        id: row.get(0)?,
        name: row.get(1)?,
        iso_code: row.get(2)?,
    })
}

fn source_from_row_at(row: &Row, start: usize) -> rusqlite::Result<Source> {
    Ok(Source {
        id: row.get(start)?,
        external_id: row.get(start + 1)?,
        name: row.get(start + 2)?,
        description: row.get(start + 3)?,
        url: row.get(start + 4)?,
        category: row.get(start + 5)?,
        language: row.get(start + 6)?,
        country_code: row.get(start + 7)?,
        country_id: row.get(start + 8)?,
    })
}

fn user_from_row(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        first_name: row.get(3)?,
        last_name: row.get(4)?,
        date_joined: timestamp_at(row, 5)?,
    })
}

fn token_from_row(row: &Row) -> rusqlite::Result<AuthToken> {
    Ok(AuthToken {
        key: row.get(0)?,
        user_id: row.get(1)?,
        created_at: timestamp_at(row, 2)?,
    })
}

fn preference_from_row(row: &Row) -> rusqlite::Result<UserPreferences> {
    let user_id: UserId = row.get(1)?;
    let keywords_json: String = row.get(3)?;
    // An unreadable list must not widen into "no keyword restriction".
    let keywords = serde_json::from_str(&keywords_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            format!("invalid keywords for user {user_id}: {e}").into(),
        )
    })?;
    Ok(UserPreferences {
        id: row.get(0)?,
        user_id,
        username: row.get(2)?,
        countries: Vec::new(),
        sources: Vec::new(),
        keywords,
    })
}

fn article_from_row(row: &Row) -> rusqlite::Result<Article> {
    article_from_row_at(row, 0)
}

fn article_from_row_at(row: &Row, start: usize) -> rusqlite::Result<Article> {
    Ok(Article {
        id: row.get(start)?,
        title: row.get(start + 1)?,
        summary: row.get(start + 2)?,
        canonical_url: row.get(start + 3)?,
        source_name: row.get(start + 4)?,
        source_id: row.get(start + 5)?,
        image_url: row.get(start + 6)?,
        published_at: timestamp_at(row, start + 7)?,
        fetched_at: timestamp_at(row, start + 8)?,
    })
}
