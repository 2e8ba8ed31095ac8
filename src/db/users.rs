//! User and session database queries.
//!
//! The credential store: username/password accounts (username is the local
//! part of an email address) and server-side web sessions. Password hashes
//! use argon2id; session cookies hold a random token whose keyed SHA-256
//! digest is what the database stores.

use argon2::password_hash::{rand_core::OsRng, SaltString};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::FromRow;

use super::DbPool;
use crate::{models, Error, Result};

/// Minimum accepted password length.
pub const MIN_PASSWORD_LEN: usize = 4;

/// Maximum normalized username length.
pub const MAX_USERNAME_LEN: usize = 64;

// ============================================================================
// Types
// ============================================================================

/// User record from the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: String,
}

/// Web session record.
#[derive(Debug, Clone, FromRow)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub token_hash: String,
    pub created_at: String,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }
}

// ============================================================================
// Username normalization and password hashing
// ============================================================================

/// Normalize a login to the stored username form.
///
/// The login is the local part of an email address: anything after the first
/// `@` is dropped, the rest is lowercased and restricted to `[a-z0-9.]`,
/// truncated to [`MAX_USERNAME_LEN`]. Returns an empty string when nothing
/// usable remains.
pub fn normalize_username(login: &str) -> String {
    let local = login.split('@').next().unwrap_or_default().trim();
    local
        .chars()
        .flat_map(char::to_lowercase)
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '.')
        .take(MAX_USERNAME_LEN)
        .collect()
}

/// Hash a password with argon2id.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| Error::Internal(format!("Password hashing failed: {}", e)))
}

/// Verify a password against a stored argon2id hash.
pub fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

/// Keyed digest of a session token. Only the digest is persisted, so a
/// leaked database does not yield usable cookies.
pub fn session_token_digest(secret: &str, token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.update(b":");
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

// ============================================================================
// User Queries
// ============================================================================

/// Register a new user.
///
/// Validates the login and password, hashes the password, and inserts the
/// user. A taken username maps to [`Error::AlreadyExists`].
pub async fn register(pool: &DbPool, login: &str, password: &str) -> Result<User> {
    let username = normalize_username(login);
    if username.is_empty() {
        return Err(Error::Validation("Username is required".into()));
    }
    if password.len() < MIN_PASSWORD_LEN {
        return Err(Error::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }

    let password_hash = hash_password(password)?;

    sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (id, username, password_hash)
        VALUES (?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(models::new_id())
    .bind(&username)
    .bind(&password_hash)
    .fetch_one(pool)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
            Error::AlreadyExists(format!("Username {} is taken", username))
        }
        _ => Error::Database(e),
    })
}

/// Authenticate a user by login and password.
pub async fn authenticate(pool: &DbPool, login: &str, password: &str) -> Result<User> {
    let username = normalize_username(login);

    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE username = ?")
        .bind(&username)
        .fetch_optional(pool)
        .await?;

    match user {
        Some(user) if verify_password(password, &user.password_hash) => Ok(user),
        _ => Err(Error::InvalidCredentials),
    }
}

/// Get a user by ID.
pub async fn get_user(pool: &DbPool, id: &str) -> Result<User> {
    sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("User {}", id)))
}

// ============================================================================
// Session Queries
// ============================================================================

/// Create a session for a user. Returns the session row and the raw token
/// that goes into the cookie.
pub async fn create_session(
    pool: &DbPool,
    user_id: &str,
    secret: &str,
    max_age_seconds: u64,
) -> Result<(Session, String)> {
    let token = nanoid::nanoid!(32);
    let expires_at = Utc::now() + Duration::seconds(max_age_seconds as i64);

    let session: Session = sqlx::query_as(
        r#"
        INSERT INTO sessions (id, user_id, token_hash, expires_at)
        VALUES (?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(models::new_id())
    .bind(user_id)
    .bind(session_token_digest(secret, &token))
    .bind(expires_at)
    .fetch_one(pool)
    .await?;

    Ok((session, token))
}

/// Look up a session by its cookie token.
pub async fn find_session_by_token(
    pool: &DbPool,
    secret: &str,
    token: &str,
) -> Result<Option<Session>> {
    let session = sqlx::query_as("SELECT * FROM sessions WHERE token_hash = ?")
        .bind(session_token_digest(secret, token))
        .fetch_optional(pool)
        .await?;
    Ok(session)
}

/// Delete a session by ID.
pub async fn delete_session(pool: &DbPool, id: &str) -> Result<()> {
    sqlx::query("DELETE FROM sessions WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Push a session's expiry forward.
pub async fn extend_session(pool: &DbPool, id: &str, expires_at: DateTime<Utc>) -> Result<()> {
    sqlx::query("UPDATE sessions SET expires_at = ? WHERE id = ?")
        .bind(expires_at)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    async fn pool() -> DbPool {
        let pool = db::init_pool(":memory:").await.unwrap();
        db::initialize_schema(&pool).await.unwrap();
        pool
    }

    #[test]
    fn test_normalize_username() {
        assert_eq!(normalize_username("Ivan@gmail.com"), "ivan");
        assert_eq!(normalize_username("  j.doe42 "), "j.doe42");
        assert_eq!(normalize_username("we!rd-ch@rs"), "werdch");
        assert_eq!(normalize_username("@nothing"), "");
        let long = "a".repeat(100);
        assert_eq!(normalize_username(&long).len(), MAX_USERNAME_LEN);
    }

    #[test]
    fn test_password_round_trip() {
        let hash = hash_password("hunter2").unwrap();
        assert!(verify_password("hunter2", &hash));
        assert!(!verify_password("hunter3", &hash));
        assert!(!verify_password("hunter2", "not-a-hash"));
    }

    #[test]
    fn test_token_digest_is_keyed() {
        let a = session_token_digest("secret-a", "token");
        let b = session_token_digest("secret-b", "token");
        assert_ne!(a, b);
        assert_eq!(a, session_token_digest("secret-a", "token"));
    }

    #[tokio::test]
    async fn test_register_and_authenticate() {
        let pool = pool().await;

        let user = register(&pool, "ivan@gmail.com", "pass123").await.unwrap();
        assert_eq!(user.username, "ivan");

        let authed = authenticate(&pool, "ivan", "pass123").await.unwrap();
        assert_eq!(authed.id, user.id);

        // Login with the full email also resolves to the same account
        let authed = authenticate(&pool, "IVAN@gmail.com", "pass123").await.unwrap();
        assert_eq!(authed.id, user.id);

        assert!(matches!(
            authenticate(&pool, "ivan", "wrong").await,
            Err(Error::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_register_duplicate() {
        let pool = pool().await;

        register(&pool, "ivan", "pass123").await.unwrap();
        let err = register(&pool, "ivan@elsewhere.org", "other").await.unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_register_short_password() {
        let pool = pool().await;
        let err = register(&pool, "ivan", "abc").await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let pool = pool().await;
        let user = register(&pool, "ivan", "pass123").await.unwrap();

        let (session, token) = create_session(&pool, &user.id, "secret", 3600).await.unwrap();
        assert!(!session.is_expired());

        let found = find_session_by_token(&pool, "secret", &token).await.unwrap();
        assert_eq!(found.unwrap().id, session.id);

        // Wrong secret can't resolve the token
        assert!(find_session_by_token(&pool, "other", &token).await.unwrap().is_none());

        delete_session(&pool, &session.id).await.unwrap();
        assert!(find_session_by_token(&pool, "secret", &token).await.unwrap().is_none());
    }
}
