use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::time::Duration;

use crate::http::AppError;
use crate::infra::cache::{page_key, CachedPage};
use crate::AppState;

/// Serves GET responses from the page cache, storing successful ones for
/// `index_cache_ttl_seconds`. Writes elsewhere never invalidate entries.
pub async fn cache_page(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if request.method() != Method::GET {
        return next.run(request).await;
    }

    let route = request
        .uri()
        .path_and_query()
        .map(|value| value.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let key = page_key(&route);

    match state.cache.get(&key).await {
        Ok(Some(page)) => return cached_response(page),
        Ok(None) => {}
        Err(err) => tracing::warn!(error = ?err, key = %key, "page cache read failed"),
    }

    let response = next.run(request).await;
    if response.status() != StatusCode::OK {
        return response;
    }

    let (parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::error!(error = ?err, "failed to buffer response body");
            return AppError::internal("render page failed").into_response();
        }
    };

    if let Ok(text) = std::str::from_utf8(&bytes) {
        let page = CachedPage {
            content_type: parts
                .headers
                .get(header::CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .unwrap_or("application/json")
                .to_string(),
            body: text.to_string(),
        };
        let ttl = Duration::from_secs(state.index_cache_ttl_seconds);
        if let Err(err) = state.cache.set(&key, &page, ttl).await {
            tracing::warn!(error = ?err, key = %key, "page cache write failed");
        }
    }

    Response::from_parts(parts, Body::from(bytes))
}

fn cached_response(page: CachedPage) -> Response {
    let content_type = HeaderValue::from_str(&page.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/json"));
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, content_type)],
        page.body,
    )
        .into_response()
}
