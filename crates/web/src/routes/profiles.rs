//! Profiles, following, profile editing and user search.

use agora_core::validation::{self, MAX_DESCRIPTION_LENGTH, MAX_NAME_LENGTH};
use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Multipart, Path, Query, State},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use super::home::FeedQuery;
use super::{MultipartForm, PageContext, finish, flash_or_fail};
use crate::backend::{Access, BackendError};
use crate::error::{AppError, Result};
use crate::filters;
use crate::middleware::RequireAuth;
use crate::models::{CurrentUser, MediaKind, Profile, Store};
use crate::services::feed::{self, FeedPage, FeedService};
use crate::services::MediaService;
use crate::services::media::{self, MediaError};
use crate::state::AppState;

/// Search results per page.
const SEARCH_LIMIT: usize = 30;

/// Look up a visible profile; banned accounts read as missing.
async fn visible_profile(state: &AppState, username: &str) -> Result<Profile> {
    let profile = state
        .backend()
        .profile_by_username(username)
        .await
        .map_err(|e| match e {
            BackendError::NotFound(_) => AppError::NotFound(format!("user @{username}")),
            other => other.into(),
        })?;
    if profile.is_banned() {
        return Err(AppError::NotFound(format!("user @{username}")));
    }
    Ok(profile)
}

/// Profile page template.
#[derive(Template, WebTemplate)]
#[template(path = "profiles/show.html")]
pub struct ProfileTemplate {
    pub ctx: PageContext,
    pub profile: Profile,
    pub followers: u64,
    pub following: u64,
    pub is_self: bool,
    pub is_following: bool,
    pub stores: Vec<Store>,
    pub feed: FeedPage,
    pub next_cursor: Option<String>,
}

/// Display a profile and its posts.
#[instrument(skip(state, ctx, query))]
pub async fn show(
    State(state): State<AppState>,
    ctx: PageContext,
    Path(username): Path<String>,
    Query(query): Query<FeedQuery>,
) -> Result<impl IntoResponse> {
    let profile = visible_profile(&state, &username).await?;
    let backend = state.backend();
    let viewer = ctx.user.as_ref().map(|u| u.id);
    let access = ctx
        .user
        .as_ref()
        .map_or(Access::Anon, |u| Access::User(&u.access_token));
    let before = feed::parse_cursor(query.before.as_deref());
    let posts = FeedService::new(backend);

    let ((followers, following), stores, page) = tokio::try_join!(
        async { backend.follow_counts(profile.id).await.map_err(AppError::from) },
        async { backend.stores_owned_by(profile.id).await.map_err(AppError::from) },
        posts.by_author(profile.id, before, viewer, access),
    )?;
    let is_following = match viewer {
        Some(viewer) if viewer != profile.id => backend.is_following(viewer, profile.id).await?,
        _ => false,
    };

    Ok(ProfileTemplate {
        is_self: viewer == Some(profile.id),
        is_following,
        followers,
        following,
        stores,
        next_cursor: page.next_cursor(),
        feed: page,
        profile,
        ctx,
    })
}

/// Follow or unfollow a user.
#[instrument(skip(state, session, user), fields(user_id = %user.id))]
pub async fn follow(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(user): RequireAuth,
    Path(username): Path<String>,
) -> Response {
    let back = format!("/u/{username}");
    let result = toggle_follow(&state, &user, &username).await;
    match result {
        Ok(_) => Redirect::to(&back).into_response(),
        Err(e) => flash_or_fail(&session, e, &back).await,
    }
}

async fn toggle_follow(state: &AppState, user: &CurrentUser, username: &str) -> Result<bool> {
    let target = visible_profile(state, username).await?;
    if target.id == user.id {
        return Err(AppError::BadRequest("You can't follow yourself".into()));
    }
    let backend = state.backend();
    let access = Access::User(&user.access_token);
    if backend.is_following(user.id, target.id).await? {
        backend.unfollow(user.id, target.id, access).await?;
        return Ok(false);
    }
    match backend.follow(user.id, target.id, access).await {
        Ok(()) | Err(BackendError::Conflict(_)) => Ok(true),
        Err(e) => Err(e.into()),
    }
}

/// Edit profile page template.
#[derive(Template, WebTemplate)]
#[template(path = "profiles/edit.html")]
pub struct EditProfileTemplate {
    pub ctx: PageContext,
    pub profile: Profile,
}

/// Display the edit profile form.
pub async fn edit_page(
    State(state): State<AppState>,
    ctx: PageContext,
    RequireAuth(user): RequireAuth,
) -> Result<impl IntoResponse> {
    let profile = state
        .backend()
        .profile_by_id(user.id)
        .await?
        .ok_or_else(|| AppError::NotFound("profile".into()))?;
    Ok(EditProfileTemplate { ctx, profile })
}

/// Save profile edits (multipart: `display_name`, `bio`, optional `avatar`).
#[instrument(skip(state, session, user, multipart), fields(user_id = %user.id))]
pub async fn update(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(user): RequireAuth,
    multipart: Multipart,
) -> Response {
    let result = save_profile(&state, &user, multipart).await;
    finish(
        &session,
        result,
        "Profile updated",
        &format!("/u/{}", user.username),
        "/profile/edit",
    )
    .await
}

async fn save_profile(state: &AppState, user: &CurrentUser, multipart: Multipart) -> Result<Profile> {
    let mut form = MultipartForm::read(multipart, "avatar").await?;
    let file = form.take_file();
    let display_name =
        validation::optional("display name", form.non_empty("display_name"), MAX_NAME_LENGTH)?;
    let bio = validation::optional("bio", form.non_empty("bio"), MAX_DESCRIPTION_LENGTH)?;
    let access = Access::User(&user.access_token);
    let uploader = MediaService::new(state.backend());

    let avatar = match file {
        Some(file) => {
            if media::accept(&file.content_type)?.kind != MediaKind::Image {
                return Err(MediaError::UnsupportedType(file.content_type).into());
            }
            let uploaded = uploader
                .upload(user.id, &file.content_type, file.bytes, access)
                .await?;
            Some(uploaded.url)
        }
        None => None,
    };

    Ok(state
        .backend()
        .update_profile(user.id, display_name, bio, avatar.as_deref(), access)
        .await?)
}

/// `?q=` search term.
#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

/// User search template.
#[derive(Template, WebTemplate)]
#[template(path = "profiles/search.html")]
pub struct SearchTemplate {
    pub ctx: PageContext,
    pub q: String,
    pub results: Vec<Profile>,
}

/// Search users by username or display name.
#[instrument(skip(state, ctx))]
pub async fn search(
    State(state): State<AppState>,
    ctx: PageContext,
    Query(query): Query<SearchQuery>,
) -> Result<impl IntoResponse> {
    let q = query.q.trim().to_string();
    let results = state.backend().search_profiles(&q, SEARCH_LIMIT).await?;
    Ok(SearchTemplate { ctx, q, results })
}
