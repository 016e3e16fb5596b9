use std::sync::LazyLock;

use argon2::password_hash::{PasswordHasher, SaltString};
use argon2::Argon2;
use regex::Regex;
use uuid::Uuid;

use crate::config::DefaultSeed;
use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::models::{NewUser, RegisteredUser};

const MIN_PASSWORD_LEN: usize = 8;

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
        .expect("email pattern should compile")
});

/// Sign-up input. `login` is either a plain username or an email address.
#[derive(Debug, Clone, Default)]
pub struct Registration {
    pub login: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

/// Create a user with an auth token and default preferences.
///
/// An email login gets a username derived from its local part, suffixed with
/// a counter until it is unique (`jane`, `jane1`, `jane2`, ...). A plain login
/// is used as the username as-is.
pub async fn register_user(
    repo: &Repository,
    registration: Registration,
    seed: &DefaultSeed,
) -> Result<RegisteredUser> {
    let login = registration.login.trim();
    if login.is_empty() {
        return Err(AppError::InvalidRegistration(
            "username or email is required".into(),
        ));
    }
    if registration.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::InvalidRegistration(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters long"
        )));
    }

    let (username, email) = if login.contains('@') {
        if !EMAIL_PATTERN.is_match(login) {
            return Err(AppError::InvalidRegistration(
                "enter a valid email address".into(),
            ));
        }
        if repo.email_exists(login).await? {
            return Err(AppError::InvalidRegistration(
                "a user with this email already exists".into(),
            ));
        }
        let username = unique_username(repo, email_local_part(login)).await?;
        (username, Some(login.to_string()))
    } else {
        (login.to_string(), None)
    };

    let user = NewUser {
        username,
        email,
        password_hash: hash_password(&registration.password)?,
        first_name: registration.first_name.trim().to_string(),
        last_name: registration.last_name.trim().to_string(),
    };
    let token_key = Uuid::new_v4().simple().to_string();

    let registered = repo
        .create_user_with_preferences(user, token_key, seed.clone())
        .await?;
    tracing::info!(
        "Registered user {} (id {})",
        registered.user.username,
        registered.user.id
    );
    Ok(registered)
}

fn email_local_part(email: &str) -> &str {
    email.split('@').next().unwrap_or(email)
}

async fn unique_username(repo: &Repository, base: &str) -> Result<String> {
    let mut candidate = base.to_string();
    let mut counter = 1;
    while repo.username_exists(&candidate).await? {
        candidate = format!("{base}{counter}");
        counter += 1;
    }
    Ok(candidate)
}

/// Argon2id with default parameters, stored as a PHC string
/// (`$argon2id$v=19$...`). The salt comes from a random v4 uuid.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::encode_b64(Uuid::new_v4().as_bytes())
        .map_err(|e| AppError::PasswordHash(e.to_string()))?;
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::PasswordHash(e.to_string()))?;
    Ok(hash.to_string())
}
