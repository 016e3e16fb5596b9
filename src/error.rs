use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database connection error: {0}")]
    Connection(#[from] tokio_rusqlite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("NEWSAPI_KEY not configured")]
    MissingApiKey,

    #[error("News API error: {0}")]
    NewsApi(String),

    #[error("Invalid registration: {0}")]
    InvalidRegistration(String),

    #[error("Password hashing failed: {0}")]
    PasswordHash(String),

    #[error("Username already taken: {0}")]
    UsernameTaken(String),

    #[error("Unknown user: {0}")]
    UnknownUser(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;
