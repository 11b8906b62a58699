use axum::{middleware, routing::get, routing::post, Router};

use crate::http::handlers;
use crate::http::middleware::cache_page::cache_page;
use crate::AppState;

pub fn health() -> Router<AppState> {
    Router::new().route("/health", get(handlers::health))
}

/// The main listing, served through the page cache.
pub fn index(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::index))
        .route_layer(middleware::from_fn_with_state(state, cache_page))
}

pub fn listings() -> Router<AppState> {
    Router::new()
        .route("/group/:slug/", get(handlers::group_posts))
        .route("/profile/:username/", get(handlers::profile))
        .route("/follow/", get(handlers::follow_index))
}

pub fn posts() -> Router<AppState> {
    Router::new()
        .route(
            "/create/",
            get(handlers::create_form).post(handlers::create_post),
        )
        .route("/posts/:id/", get(handlers::post_detail))
        .route(
            "/posts/:id/edit/",
            get(handlers::edit_form).post(handlers::edit_post),
        )
        .route("/posts/:id/comment/", post(handlers::add_comment))
}

pub fn social() -> Router<AppState> {
    Router::new()
        .route("/profile/:username/follow/", get(handlers::profile_follow))
        .route("/profile/:username/unfollow/", get(handlers::profile_unfollow))
}

pub fn media() -> Router<AppState> {
    Router::new().route("/media/*key", get(handlers::get_media))
}
