//! Post route handlers: create, view, like, comment, delete.

use agora_core::{GroupId, PostId};
use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Multipart, Path, State},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use super::{MultipartForm, PageContext, finish, flash_or_fail, redirect_with_success};
use crate::backend::Access;
use crate::error::{AppError, Result};
use crate::filters;
use crate::middleware::RequireAuth;
use crate::models::Comment;
use crate::services::{FeedPost, FeedService, MediaService};
use crate::state::AppState;

/// Comment form data.
#[derive(Debug, Deserialize)]
pub struct CommentForm {
    pub body: String,
}

/// Where to send the user after a post action.
#[derive(Debug, Deserialize)]
pub struct ReturnForm {
    pub return_to: Option<String>,
}

/// Only same-site paths are followed.
fn return_path(raw: Option<&str>, fallback: &str) -> String {
    raw.filter(|p| p.starts_with('/') && !p.starts_with("//"))
        .unwrap_or(fallback)
        .to_string()
}

/// Post page template.
#[derive(Template, WebTemplate)]
#[template(path = "posts/show.html")]
pub struct PostTemplate {
    pub ctx: PageContext,
    pub item: FeedPost,
    pub comments: Vec<Comment>,
    pub is_author: bool,
}

/// Display a post with its comments.
#[instrument(skip(state, ctx))]
pub async fn show(
    State(state): State<AppState>,
    ctx: PageContext,
    Path(id): Path<PostId>,
) -> Result<impl IntoResponse> {
    let viewer = ctx.user.as_ref().map(|u| u.id);
    let access = ctx
        .user
        .as_ref()
        .map_or(Access::Anon, |u| Access::User(&u.access_token));
    let (item, comments) = FeedService::new(state.backend())
        .thread(id, viewer, access)
        .await?;
    let is_author = viewer == Some(item.post.author_id);

    Ok(PostTemplate {
        ctx,
        item,
        comments,
        is_author,
    })
}

/// Publish a post (multipart: `body`, optional `group_id`, optional `media`).
#[instrument(skip(state, session, user, multipart), fields(user_id = %user.id))]
pub async fn create(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(user): RequireAuth,
    multipart: Multipart,
) -> Response {
    let mut form = match MultipartForm::read(multipart, "media").await {
        Ok(form) => form,
        Err(e) => return flash_or_fail(&session, e, "/").await,
    };

    let group = match form.non_empty("group_id").map(str::parse::<GroupId>) {
        None => None,
        Some(Ok(id)) => Some(id),
        Some(Err(_)) => {
            return flash_or_fail(&session, AppError::BadRequest("Unknown group".into()), "/")
                .await;
        }
    };
    let back = group.map_or_else(|| "/".to_string(), |g| format!("/groups/{g}"));
    let access = Access::User(&user.access_token);

    let media = match form.take_file() {
        Some(file) => {
            match MediaService::new(state.backend())
                .upload(user.id, &file.content_type, file.bytes, access)
                .await
            {
                Ok(uploaded) => Some(uploaded),
                Err(e) => return flash_or_fail(&session, e.into(), &back).await,
            }
        }
        None => None,
    };

    let result = FeedService::new(state.backend())
        .publish(
            user.id,
            group,
            form.text("body"),
            media.as_ref().map(|m| (m.url.as_str(), m.kind)),
            access,
        )
        .await;

    if result.is_err()
        && let Some(media) = &media
    {
        MediaService::new(state.backend())
            .remove(&media.url, access)
            .await;
    }

    finish(&session, result, "Posted", &back, &back).await
}

/// Like or unlike a post.
pub async fn like(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(user): RequireAuth,
    Path(id): Path<PostId>,
    Form(form): Form<ReturnForm>,
) -> Response {
    let back = return_path(form.return_to.as_deref(), &format!("/posts/{id}"));
    match FeedService::new(state.backend())
        .toggle_like(id, user.id, Access::User(&user.access_token))
        .await
    {
        Ok(_) => Redirect::to(&back).into_response(),
        Err(e) => flash_or_fail(&session, e, &back).await,
    }
}

/// Add a comment.
pub async fn comment(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(user): RequireAuth,
    Path(id): Path<PostId>,
    Form(form): Form<CommentForm>,
) -> Response {
    let back = format!("/posts/{id}");
    let result = FeedService::new(state.backend())
        .comment(id, user.id, &form.body, Access::User(&user.access_token))
        .await;
    finish(&session, result, "Comment added", &back, &back).await
}

/// Delete one of the user's own posts and its media.
#[instrument(skip(state, session, user), fields(user_id = %user.id))]
pub async fn delete(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(user): RequireAuth,
    Path(id): Path<PostId>,
) -> Response {
    let access = Access::User(&user.access_token);
    match state.backend().delete_post(id, user.id, access).await {
        Ok(Some(post)) => {
            if let Some(url) = &post.media_url {
                MediaService::new(state.backend()).remove(url, access).await;
            }
            redirect_with_success(&session, &format!("/u/{}", user.username), "Post deleted")
                .await
        }
        Ok(None) => {
            flash_or_fail(&session, AppError::NotFound("post".into()), &format!("/posts/{id}"))
                .await
        }
        Err(e) => flash_or_fail(&session, e.into(), &format!("/posts/{id}")).await,
    }
}
