use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;

use crate::AppState;

mod auth;
mod error;
mod forms;
mod handlers;
pub mod middleware;
mod routes;

pub use auth::{login_redirect, AuthRejection, AuthUser};
pub use error::AppError;

/// Room for the multipart envelope and text fields around an image upload.
/// The limit caps the body stream only, so an oversized image still reaches
/// form validation instead of being refused on its `Content-Length`.
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

pub fn router(state: AppState) -> Router {
    let body_limit = state.upload_max_bytes.saturating_add(FORM_OVERHEAD_BYTES);

    Router::new()
        .merge(routes::health())
        .merge(routes::index(state.clone()))
        .merge(routes::listings())
        .merge(routes::posts())
        .merge(routes::social())
        .merge(routes::media())
        .fallback(handlers::not_found)
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// `302 Found` to `location`.
pub(crate) fn found(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => (StatusCode::FOUND, [(header::LOCATION, value)]).into_response(),
        Err(_) => AppError::internal("invalid redirect target").into_response(),
    }
}
