//! Request middleware for bindery.

mod session_auth;

pub use session_auth::{optional_session, require_session, SessionUser, SESSION_COOKIE_NAME};
