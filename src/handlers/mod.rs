pub mod admin;
pub mod bookings;
pub mod catalog;
pub mod health;

use axum::http::HeaderMap;
use rusqlite::Connection;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::Caller;

/// Resolve the bearer token to a caller identity. Every lifecycle
/// endpoint authenticates before touching any booking data.
pub fn authenticate(headers: &HeaderMap, conn: &Connection) -> Result<Caller, AppError> {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let token = auth.strip_prefix("Bearer ").unwrap_or("");
    if token.is_empty() {
        return Err(AppError::Unauthenticated);
    }

    let profile = queries::get_profile_by_token(conn, token)?.ok_or(AppError::Unauthenticated)?;

    Ok(Caller {
        user_id: profile.id,
        is_admin: profile.is_admin,
    })
}
