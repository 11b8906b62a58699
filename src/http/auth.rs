use axum::extract::FromRequestParts;
use axum::http::header;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};

use crate::app::auth::AuthService;
use crate::app::users::UserService;
use crate::domain::Id;
use crate::http::{found, AppError};
use crate::AppState;

/// The signed-in user. Rejects anonymous requests with a redirect to the
/// login page; use `Option<AuthUser>` where anonymous viewers are allowed.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Id,
    pub username: String,
}

pub enum AuthRejection {
    Login { location: String },
    Internal(AppError),
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        match self {
            Self::Login { location } => found(&location),
            Self::Internal(err) => err.into_response(),
        }
    }
}

/// `<login_url>?next=<path>`, keeping slashes readable.
pub fn login_redirect(login_url: &str, next: &str) -> String {
    let next: String = url::form_urlencoded::byte_serialize(next.as_bytes()).collect();
    format!("{}?next={}", login_url, next.replace("%2F", "/"))
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let login = || {
            let next = parts
                .uri
                .path_and_query()
                .map(|value| value.as_str())
                .unwrap_or_else(|| parts.uri.path());
            AuthRejection::Login {
                location: login_redirect(&state.login_url, next),
            }
        };

        let Some(token) = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
        else {
            return Err(login());
        };

        let service = AuthService::new(state.paseto_access_key);
        let session = service.authenticate_access_token(token.trim()).map_err(|err| {
            tracing::error!(error = ?err, "failed to authenticate");
            AuthRejection::Internal(AppError::internal("failed to authenticate"))
        })?;
        let Some(session) = session else {
            return Err(login());
        };

        let user = UserService::new(state.store.clone())
            .get_user(session.user_id)
            .await
            .map_err(|err| AuthRejection::Internal(AppError::failed("load user", err)))?;
        match user {
            Some(user) => Ok(AuthUser {
                user_id: user.id,
                username: user.username,
            }),
            // token for an account that no longer exists
            None => Err(login()),
        }
    }
}
