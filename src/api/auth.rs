//! Authentication Routes
//!
//! Username/password registration and login with server-side sessions.
//! Form errors come back as `{ok: false, error}` so the login page can show
//! them inline; unexpected failures surface as regular API errors.
//!
//! Routes:
//! - POST /register - Create an account and start a session
//! - POST /login - Start a session
//! - GET /logout - Invalidate the session and clear the cookie
//! - GET /api/me - Current username, or null when anonymous

use axum::{
    extract::State,
    response::Redirect,
    routing::{get, post},
    Extension, Form, Json, Router,
};
use axum_extra::extract::cookie::{Cookie, SameSite};
use axum_extra::extract::CookieJar;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::config;
use crate::middleware::{optional_session, SessionUser, SESSION_COOKIE_NAME};
use crate::{db, AppState, Error, Result};

/// Build authentication routes.
pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", get(logout))
        .merge(
            Router::new().route("/api/me", get(me)).layer(
                axum::middleware::from_fn_with_state(state, optional_session),
            ),
        )
}

/// Login/registration form fields.
#[derive(Debug, Deserialize)]
pub struct CredentialsForm {
    pub username: String,
    pub password: String,
}

/// Register a new account.
///
/// POST /register
#[axum::debug_handler]
async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<CredentialsForm>,
) -> Result<(CookieJar, Json<Value>)> {
    match db::register(&state.db, &form.username, &form.password).await {
        Ok(user) => {
            tracing::info!(username = %user.username, "user registered");
            let jar = start_session(&state, jar, &user.id).await?;
            Ok((jar, Json(json!({ "ok": true }))))
        }
        Err(e @ (Error::Validation(_) | Error::AlreadyExists(_))) => {
            Ok((jar, Json(json!({ "ok": false, "error": e.to_string() }))))
        }
        Err(e) => Err(e),
    }
}

/// Log in to an existing account.
///
/// POST /login
#[axum::debug_handler]
async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<CredentialsForm>,
) -> Result<(CookieJar, Json<Value>)> {
    match db::authenticate(&state.db, &form.username, &form.password).await {
        Ok(user) => {
            let jar = start_session(&state, jar, &user.id).await?;
            Ok((jar, Json(json!({ "ok": true }))))
        }
        Err(Error::InvalidCredentials) => Ok((
            jar,
            Json(json!({ "ok": false, "error": "Invalid username or password" })),
        )),
        Err(e) => Err(e),
    }
}

/// End the current session.
///
/// GET /logout
#[axum::debug_handler]
async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<(CookieJar, Redirect)> {
    if let Some(cookie) = jar.get(SESSION_COOKIE_NAME) {
        let config = config();
        if let Some(session) =
            db::find_session_by_token(&state.db, &config.session.secret, cookie.value()).await?
        {
            db::delete_session(&state.db, &session.id).await?;
        }
    }

    let cookie = Cookie::build((SESSION_COOKIE_NAME, ""))
        .path("/")
        .max_age(time::Duration::seconds(0))
        .build();

    Ok((jar.add(cookie), Redirect::to("/login")))
}

/// Current user, or `{"username": null}` when anonymous.
///
/// GET /api/me
#[axum::debug_handler]
async fn me(user: Option<Extension<SessionUser>>) -> Json<Value> {
    match user {
        Some(Extension(user)) => Json(json!({ "username": user.username })),
        None => Json(json!({ "username": null })),
    }
}

/// Create a session row and attach the cookie.
async fn start_session(state: &AppState, jar: CookieJar, user_id: &str) -> Result<CookieJar> {
    let config = config();
    let (_session, token) = db::create_session(
        &state.db,
        user_id,
        &config.session.secret,
        config.session.max_age_seconds,
    )
    .await?;

    let cookie = Cookie::build((SESSION_COOKIE_NAME, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::seconds(config.session.max_age_seconds as i64))
        .build();

    Ok(jar.add(cookie))
}
