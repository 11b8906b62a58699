use axum::body::Body;
use axum::extract::{Path, RawQuery, State};
use axum::http::{header, HeaderValue, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::{Form, Json};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde::Serialize;

use crate::app::comments::{CommentOutcome, CommentService};
use crate::app::feed::FeedService;
use crate::app::media::MediaService;
use crate::app::pagination::Page;
use crate::app::posts::{EditAccess, PostForm, PostService, Submission};
use crate::app::social::SocialService;
use crate::app::users::UserService;
use crate::domain::comment::Comment;
use crate::domain::group::Group;
use crate::domain::post::{Post, PostFilter};
use crate::domain::user::PublicUser;
use crate::domain::Id;
use crate::http::forms::{CommentForm, PostFormInput};
use crate::http::{found, AppError, AuthUser};
use crate::AppState;

#[derive(Serialize)]
pub(crate) struct HealthResponse {
    status: &'static str,
}

#[derive(Serialize)]
pub struct ListContext {
    pub page_obj: Page<Post>,
}

#[derive(Serialize)]
pub struct GroupContext {
    pub group: Group,
    pub page_obj: Page<Post>,
}

#[derive(Serialize)]
pub struct ProfileContext {
    pub author: PublicUser,
    pub post_count: usize,
    pub follower_count: usize,
    pub following_count: usize,
    pub following: bool,
    pub page_obj: Page<Post>,
}

#[derive(Serialize)]
pub struct CommentFormContext {
    pub text: String,
}

#[derive(Serialize)]
pub struct DetailContext {
    pub post: Post,
    pub post_count: usize,
    pub comments: Vec<Comment>,
    pub form: CommentFormContext,
}

#[derive(Serialize)]
pub struct FormContext {
    pub form: PostForm,
    pub is_edit: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post: Option<Post>,
}

#[derive(Serialize)]
struct NotFoundResponse {
    error: &'static str,
    path: String,
}

fn post_service(state: &AppState) -> PostService {
    PostService::new(
        state.store.clone(),
        MediaService::new(state.storage.clone(), state.upload_max_bytes),
        state.page_size,
    )
}

/// Last `page` value of the query string, as the paginator expects it.
fn page_param(query: Option<String>) -> Option<String> {
    let query = query?;
    url::form_urlencoded::parse(query.as_bytes())
        .filter(|(key, _)| key == "page")
        .map(|(_, value)| value.into_owned())
        .last()
}

/// Path ids that are not integers cannot name a row.
fn parse_id(raw: &str) -> Result<Id, AppError> {
    raw.parse::<Id>()
        .map_err(|_| AppError::not_found("post not found"))
}

/// Characters escaped in a username path segment, `+` included.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'+')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

fn profile_url(username: &str) -> String {
    format!("/profile/{}/", utf8_percent_encode(username, PATH_SEGMENT))
}

fn post_url(post_id: Id) -> String {
    format!("/posts/{}/", post_id)
}

pub(crate) async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let store = state.store.ping().await.is_ok();
    let cache = state.cache.ping().await.is_ok();
    let status = if store && cache { "ok" } else { "degraded" };

    Json(HealthResponse { status })
}

pub async fn not_found(uri: Uri) -> Response {
    let body = Json(NotFoundResponse {
        error: "page not found",
        path: uri.path().to_string(),
    });
    (StatusCode::NOT_FOUND, body).into_response()
}

pub async fn index(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
) -> Result<Json<ListContext>, AppError> {
    let page_obj = post_service(&state)
        .list_page(PostFilter::All, page_param(query).as_deref())
        .await
        .map_err(|err| AppError::failed("list posts", err))?;

    Ok(Json(ListContext { page_obj }))
}

pub async fn group_posts(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    RawQuery(query): RawQuery,
) -> Result<Json<GroupContext>, AppError> {
    let service = post_service(&state);
    let group = service
        .group_by_slug(&slug)
        .await
        .map_err(|err| AppError::failed("load group", err))?
        .ok_or_else(|| AppError::not_found("group not found"))?;

    let page_obj = service
        .list_page(PostFilter::Group(group.id), page_param(query).as_deref())
        .await
        .map_err(|err| AppError::failed("list posts", err))?;

    Ok(Json(GroupContext { group, page_obj }))
}

pub async fn profile(
    State(state): State<AppState>,
    viewer: Option<AuthUser>,
    Path(username): Path<String>,
    RawQuery(query): RawQuery,
) -> Result<Json<ProfileContext>, AppError> {
    let author = UserService::new(state.store.clone())
        .get_by_username(&username)
        .await
        .map_err(|err| AppError::failed("load user", err))?
        .ok_or_else(|| AppError::not_found("user not found"))?;

    let page_obj = post_service(&state)
        .list_page(PostFilter::Author(author.id), page_param(query).as_deref())
        .await
        .map_err(|err| AppError::failed("list posts", err))?;

    let social = SocialService::new(state.store.clone());
    let counts = social
        .counts(author.id)
        .await
        .map_err(|err| AppError::failed("count follows", err))?;
    let following = social
        .is_following(viewer.map(|viewer| viewer.user_id), author.id)
        .await
        .map_err(|err| AppError::failed("check follow", err))?;

    Ok(Json(ProfileContext {
        author: PublicUser::from(&author),
        post_count: page_obj.count,
        follower_count: counts.followers,
        following_count: counts.following,
        following,
        page_obj,
    }))
}

pub async fn post_detail(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
) -> Result<Json<DetailContext>, AppError> {
    let post_id = parse_id(&post_id)?;
    let service = post_service(&state);
    let post = service
        .get_post(post_id)
        .await
        .map_err(|err| AppError::failed("load post", err))?
        .ok_or_else(|| AppError::not_found("post not found"))?;

    let post_count = service
        .count_by_author(post.author.id)
        .await
        .map_err(|err| AppError::failed("count posts", err))?;
    let comments = CommentService::new(state.store.clone())
        .list(post.id)
        .await
        .map_err(|err| AppError::failed("list comments", err))?;

    Ok(Json(DetailContext {
        post,
        post_count,
        comments,
        form: CommentFormContext {
            text: String::new(),
        },
    }))
}

pub async fn create_form(
    State(state): State<AppState>,
    _auth: AuthUser,
) -> Result<Json<FormContext>, AppError> {
    let form = post_service(&state)
        .empty_form()
        .await
        .map_err(|err| AppError::failed("build form", err))?;

    Ok(Json(FormContext {
        form,
        is_edit: false,
        post: None,
    }))
}

pub async fn create_post(
    State(state): State<AppState>,
    auth: AuthUser,
    PostFormInput(data): PostFormInput,
) -> Result<Response, AppError> {
    let submission = post_service(&state)
        .create(auth.user_id, data)
        .await
        .map_err(|err| AppError::failed("create post", err))?;

    Ok(match submission {
        Submission::Saved(_) => found(&profile_url(&auth.username)),
        Submission::Invalid(form) => Json(FormContext {
            form,
            is_edit: false,
            post: None,
        })
        .into_response(),
    })
}

pub async fn edit_form(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(post_id): Path<String>,
) -> Result<Response, AppError> {
    let post_id = parse_id(&post_id)?;
    let service = post_service(&state);
    let access = service
        .load_for_edit(post_id, auth.user_id)
        .await
        .map_err(|err| AppError::failed("load post", err))?;

    let post = match access {
        EditAccess::NotFound => return Err(AppError::not_found("post not found")),
        EditAccess::Forbidden(post) => return Ok(found(&post_url(post.id))),
        EditAccess::Allowed(post) => post,
    };
    let form = service
        .form_for(&post)
        .await
        .map_err(|err| AppError::failed("build form", err))?;

    Ok(Json(FormContext {
        form,
        is_edit: true,
        post: Some(post),
    })
    .into_response())
}

pub async fn edit_post(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(post_id): Path<String>,
    PostFormInput(data): PostFormInput,
) -> Result<Response, AppError> {
    let post_id = parse_id(&post_id)?;
    let service = post_service(&state);
    let access = service
        .load_for_edit(post_id, auth.user_id)
        .await
        .map_err(|err| AppError::failed("load post", err))?;

    let post = match access {
        EditAccess::NotFound => return Err(AppError::not_found("post not found")),
        EditAccess::Forbidden(post) => {
            tracing::info!(post_id, user_id = auth.user_id, "edit by non-author refused");
            return Ok(found(&post_url(post.id)));
        }
        EditAccess::Allowed(post) => post,
    };

    let submission = service
        .update(post.id, auth.user_id, data)
        .await
        .map_err(|err| AppError::failed("update post", err))?;

    Ok(match submission {
        Some(Submission::Invalid(form)) => Json(FormContext {
            form,
            is_edit: true,
            post: Some(post),
        })
        .into_response(),
        Some(Submission::Saved(_)) | None => found(&post_url(post.id)),
    })
}

pub async fn add_comment(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(post_id): Path<String>,
    Form(payload): Form<CommentForm>,
) -> Result<Response, AppError> {
    let post_id = parse_id(&post_id)?;
    let outcome = CommentService::new(state.store.clone())
        .add(post_id, auth.user_id, &payload.text)
        .await
        .map_err(|err| AppError::failed("add comment", err))?;

    match outcome {
        CommentOutcome::PostMissing => Err(AppError::not_found("post not found")),
        CommentOutcome::Added(_) | CommentOutcome::Blank => Ok(found(&post_url(post_id))),
    }
}

pub async fn follow_index(
    State(state): State<AppState>,
    auth: AuthUser,
    RawQuery(query): RawQuery,
) -> Result<Json<ListContext>, AppError> {
    let page_obj = FeedService::new(state.store.clone(), state.page_size)
        .follow_feed(auth.user_id, page_param(query).as_deref())
        .await
        .map_err(|err| AppError::failed("load feed", err))?;

    Ok(Json(ListContext { page_obj }))
}

pub async fn profile_follow(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(username): Path<String>,
) -> Result<Response, AppError> {
    let author = UserService::new(state.store.clone())
        .get_by_username(&username)
        .await
        .map_err(|err| AppError::failed("load user", err))?
        .ok_or_else(|| AppError::not_found("user not found"))?;

    SocialService::new(state.store.clone())
        .follow(auth.user_id, author.id)
        .await
        .map_err(|err| AppError::failed("follow", err))?;

    Ok(found(&profile_url(&author.username)))
}

pub async fn profile_unfollow(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(username): Path<String>,
) -> Result<Response, AppError> {
    let author = UserService::new(state.store.clone())
        .get_by_username(&username)
        .await
        .map_err(|err| AppError::failed("load user", err))?
        .ok_or_else(|| AppError::not_found("user not found"))?;

    SocialService::new(state.store.clone())
        .unfollow(auth.user_id, author.id)
        .await
        .map_err(|err| AppError::failed("unfollow", err))?;

    Ok(found(&profile_url(&author.username)))
}

pub async fn get_media(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Response, AppError> {
    let object = MediaService::new(state.storage.clone(), state.upload_max_bytes)
        .open(&key)
        .await
        .map_err(|err| AppError::failed("load media", err))?
        .ok_or_else(|| AppError::not_found("media not found"))?;

    let content_type = HeaderValue::from_str(&object.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, content_type)],
        Body::from(object.bytes),
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_param_takes_the_last_value() {
        assert_eq!(page_param(None), None);
        assert_eq!(page_param(Some("q=1".into())), None);
        assert_eq!(page_param(Some("page=2&page=3".into())).as_deref(), Some("3"));
    }

    #[test]
    fn profile_urls_escape_usernames() {
        assert_eq!(profile_url("leo"), "/profile/leo/");
        assert_eq!(profile_url("a+b"), "/profile/a%2Bb/");
        assert_eq!(profile_url("john doe"), "/profile/john%20doe/");
        assert_eq!(profile_url("a/b?c"), "/profile/a%2Fb%3Fc/");
        assert_eq!(profile_url("zoë"), "/profile/zo%C3%AB/");
    }
}
