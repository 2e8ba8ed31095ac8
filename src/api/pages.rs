//! HTML Pages
//!
//! The embedded login and workspace pages. The index serves the workspace
//! when a session is present and the login page otherwise.
//!
//! Routes:
//! - GET / - Workspace, or login page when anonymous
//! - GET /login - Login page

use axum::{
    response::Html,
    routing::get,
    Extension, Router,
};

use crate::middleware::{optional_session, SessionUser};
use crate::AppState;

const LOGIN_PAGE: &str = include_str!("../../static/login.html");
const INDEX_PAGE: &str = include_str!("../../static/index.html");

/// Build page routes.
pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/login", get(login_page))
        .layer(axum::middleware::from_fn_with_state(state, optional_session))
}

async fn index(user: Option<Extension<SessionUser>>) -> Html<&'static str> {
    match user {
        Some(_) => Html(INDEX_PAGE),
        None => Html(LOGIN_PAGE),
    }
}

async fn login_page() -> Html<&'static str> {
    Html(LOGIN_PAGE)
}
