#![allow(dead_code)]

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

use scribe::app::auth::AuthService;
use scribe::config::AppConfig;
use scribe::domain::group::{Group, NewGroup};
use scribe::domain::post::{NewPost, Post};
use scribe::domain::Id;
use scribe::infra::cache::{MemoryCache, SharedCache};
use scribe::infra::storage::ObjectStorage;
use scribe::infra::store::memory::MemoryStore;
use scribe::infra::store::SharedStore;
use scribe::AppState;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

// "0123456789abcdef0123456789abcdef" (32 bytes), test-only
const TEST_PASETO_ACCESS_KEY: [u8; 32] = *b"0123456789abcdef0123456789abcdef";
const MULTIPART_BOUNDARY: &str = "scribe-test-boundary";

// ---------------------------------------------------------------------------
// TestApp: one isolated in-process application per test
// ---------------------------------------------------------------------------

pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub store: SharedStore,
    pub cache: SharedCache,
    _media_dir: TempDir,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub location: Option<String>,
    pub content_type: Option<String>,
    body_bytes: bytes::Bytes,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body_bytes).unwrap_or(Value::Null)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.body_bytes
    }

    pub fn error_message(&self) -> String {
        self.json()["error"].as_str().unwrap_or("").to_string()
    }

    /// Texts of the posts on the returned page, in order.
    pub fn post_texts(&self) -> Vec<String> {
        self.json()["page_obj"]["object_list"]
            .as_array()
            .map(|posts| {
                posts
                    .iter()
                    .map(|post| post["text"].as_str().unwrap_or("").to_string())
                    .collect()
            })
            .unwrap_or_default()
    }
}

pub struct TestUser {
    pub id: Id,
    pub username: String,
    pub token: String,
}

pub fn test_config() -> AppConfig {
    AppConfig {
        http_addr: "127.0.0.1:0".into(),
        database_url: None,
        redis_url: None,
        s3_endpoint: None,
        s3_region: "us-east-1".into(),
        s3_bucket: None,
        media_root: "media".into(),
        db_max_connections: 1,
        db_connect_timeout_seconds: 1,
        db_idle_timeout_seconds: 1,
        db_max_lifetime_seconds: 1,
        paseto_access_key: TEST_PASETO_ACCESS_KEY,
        page_size: 10,
        index_cache_ttl_seconds: 20,
        login_url: "/auth/login/".into(),
        upload_max_bytes: 5 * 1024 * 1024,
    }
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: AppConfig) -> Self {
        let media_dir = tempfile::tempdir().expect("failed to create media dir");
        let store: SharedStore = Arc::new(MemoryStore::new());
        let cache: SharedCache = Arc::new(MemoryCache::new());
        let storage = ObjectStorage::local(media_dir.path());

        let state = AppState::with_backends(&config, store.clone(), cache.clone(), storage);
        let router = scribe::http::router(state.clone());

        TestApp {
            router,
            state,
            store,
            cache,
            _media_dir: media_dir,
        }
    }

    // ------------------------------------------------------------------
    // Low-level request helpers
    // ------------------------------------------------------------------
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router call failed");

        let status = response.status();
        let header_str = |name: header::HeaderName| {
            response
                .headers()
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        };
        let location = header_str(header::LOCATION);
        let content_type = header_str(header::CONTENT_TYPE);
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("failed to read body")
            .to_bytes();

        TestResponse {
            status,
            location,
            content_type,
            body_bytes,
        }
    }

    fn builder(method: Method, path: &str, token: Option<&str>) -> axum::http::request::Builder {
        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header("host", "localhost");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        builder
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> TestResponse {
        let request = Self::builder(Method::GET, path, token)
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    pub async fn post_form(
        &self,
        path: &str,
        fields: &[(&str, &str)],
        token: Option<&str>,
    ) -> TestResponse {
        let body: String = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(fields)
            .finish();
        let request = Self::builder(Method::POST, path, token)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .unwrap();
        self.send(request).await
    }

    pub async fn post_multipart(
        &self,
        path: &str,
        fields: &[(&str, &str)],
        image: Option<(&str, Vec<u8>)>,
        token: Option<&str>,
    ) -> TestResponse {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                    MULTIPART_BOUNDARY, name, value
                )
                .as_bytes(),
            );
        }
        if let Some((filename, bytes)) = image {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"{}\"\r\n\
                     Content-Type: application/octet-stream\r\n\r\n",
                    MULTIPART_BOUNDARY, filename
                )
                .as_bytes(),
            );
            body.extend_from_slice(&bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", MULTIPART_BOUNDARY).as_bytes());

        let request = Self::builder(Method::POST, path, token)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", MULTIPART_BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap();
        self.send(request).await
    }

    // ------------------------------------------------------------------
    // Fixtures
    // ------------------------------------------------------------------
    pub async fn create_user(&self, username: &str) -> TestUser {
        let user = self
            .store
            .create_user(username)
            .await
            .expect("create_user failed");
        let token = AuthService::new(self.state.paseto_access_key)
            .issue_access_token(user.id, Duration::from_secs(3600))
            .expect("issue_access_token failed");
        TestUser {
            id: user.id,
            username: user.username,
            token,
        }
    }

    pub async fn create_group(&self, title: &str, slug: &str) -> Group {
        self.store
            .create_group(NewGroup {
                title: title.into(),
                slug: slug.into(),
                description: format!("{} description", title),
            })
            .await
            .expect("create_group failed")
    }

    pub async fn create_post(&self, author_id: Id, text: &str, group_id: Option<Id>) -> Post {
        self.store
            .create_post(NewPost {
                author_id,
                text: text.into(),
                group_id,
                image: None,
            })
            .await
            .expect("create_post failed")
    }
}

/// A tiny valid PNG.
pub fn png_bytes() -> Vec<u8> {
    let image = image::RgbImage::from_pixel(2, 2, image::Rgb([10, 120, 200]));
    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, image::ImageFormat::Png)
        .expect("failed to encode png");
    out.into_inner()
}
