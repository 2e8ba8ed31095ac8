//! Session-based authentication middleware.
//!
//! Validates session cookies for all job and file routes.
//!
//! # Session Flow
//!
//! 1. User registers or logs in; server creates a session row and sets the
//!    `bindery_session` cookie to a random token
//! 2. Subsequent requests include the cookie; this middleware resolves the
//!    token's keyed digest against the sessions table
//! 3. Sessions expire after the configured duration or on logout
//!
//! # Security Model
//!
//! - Tokens are cryptographically random (nanoid)
//! - Sessions are stored server-side; the row holds only a keyed digest
//! - Cookie is HttpOnly, SameSite=Lax
//! - Sessions can be invalidated server-side (logout)

use axum::{
    body::Body,
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::CookieJar;

use crate::{config::config, db, error::Error, AppState};

/// Session cookie name.
pub const SESSION_COOKIE_NAME: &str = "bindery_session";

/// User context injected into request extensions after successful session validation.
#[derive(Clone, Debug)]
pub struct SessionUser {
    /// Unique user identifier
    pub user_id: String,
    /// Normalized username
    pub username: String,
    /// Session row ID, for logout
    pub session_id: String,
}

/// Middleware that requires a valid session.
///
/// Extracts the token from the cookie, validates it against the database,
/// and injects [`SessionUser`] into request extensions.
///
/// # Errors
///
/// Returns 401 Unauthorized if:
/// - No session cookie present
/// - Session not found in database
/// - Session is expired
/// - User not found
pub async fn require_session(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, Error> {
    let token = jar
        .get(SESSION_COOKIE_NAME)
        .map(|c| c.value().to_string())
        .ok_or(Error::Unauthenticated)?;

    let session_user = validate_session(&state, &token).await?;

    req.extensions_mut().insert(session_user);

    Ok(next.run(req).await)
}

/// Validate a session token and return the session user.
async fn validate_session(state: &AppState, token: &str) -> Result<SessionUser, Error> {
    let config = config();

    let session = db::find_session_by_token(&state.db, &config.session.secret, token)
        .await?
        .ok_or(Error::Unauthenticated)?;

    if session.is_expired() {
        // Clean up the expired row off the request path
        let db = state.db.clone();
        let sid = session.id.clone();
        tokio::spawn(async move {
            let _ = db::delete_session(&db, &sid).await;
        });
        return Err(Error::Unauthenticated);
    }

    let user = db::get_user(&state.db, &session.user_id)
        .await
        .map_err(|_| Error::Unauthenticated)?;

    // Extend the session if it's more than halfway through its lifetime
    let max_age = chrono::Duration::seconds(config.session.max_age_seconds as i64);
    let halfway = chrono::Utc::now() + (max_age / 2);

    if session.expires_at < halfway {
        let new_expires = chrono::Utc::now() + max_age;
        let db = state.db.clone();
        let sid = session.id.clone();
        tokio::spawn(async move {
            let _ = db::extend_session(&db, &sid, new_expires).await;
        });
    }

    Ok(SessionUser {
        user_id: user.id,
        username: user.username,
        session_id: session.id,
    })
}

/// Optional session middleware - doesn't fail if no session, just doesn't inject user.
///
/// Used by the index page to choose between the login page and the workspace.
pub async fn optional_session(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    if let Some(token) = jar.get(SESSION_COOKIE_NAME).map(|c| c.value().to_string()) {
        if let Ok(session_user) = validate_session(&state, &token).await {
            req.extensions_mut().insert(session_user);
        }
    }

    next.run(req).await
}
