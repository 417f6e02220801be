//! Groups: listing, creation, group feeds and membership.
//!
//! Public groups admit members straight away; private groups queue join
//! requests until an owner or moderator approves them, and only active
//! members see a private group's posts.

use agora_core::validation::{self, MAX_DESCRIPTION_LENGTH, MAX_NAME_LENGTH};
use agora_core::{GroupId, GroupVisibility, MembershipRole, MembershipStatus, UserId};
use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use super::home::FeedQuery;
use super::{PageContext, finish, flash_or_fail, redirect_with_success};
use crate::backend::{Access, BackendError};
use crate::error::{AppError, Result};
use crate::filters;
use crate::middleware::RequireAuth;
use crate::models::{CurrentUser, Group, Membership};
use crate::services::feed::{self, FeedPage, FeedService};
use crate::state::AppState;

/// Groups listed on the index page.
const GROUP_LIMIT: usize = 100;

/// Create group form data.
#[derive(Debug, Deserialize)]
pub struct CreateGroupForm {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub visibility: GroupVisibility,
}

/// Groups index template.
#[derive(Template, WebTemplate)]
#[template(path = "groups/index.html")]
pub struct GroupsTemplate {
    pub ctx: PageContext,
    pub groups: Vec<Group>,
}

/// List groups.
pub async fn index(State(state): State<AppState>, ctx: PageContext) -> Result<impl IntoResponse> {
    let groups = state.backend().list_groups(GROUP_LIMIT).await?;
    Ok(GroupsTemplate { ctx, groups })
}

/// Create a group; the creator becomes its owner.
#[instrument(skip(state, session, user, form), fields(user_id = %user.id))]
pub async fn create(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(user): RequireAuth,
    Form(form): Form<CreateGroupForm>,
) -> Response {
    let result = async {
        let name = validation::required("group name", &form.name, MAX_NAME_LENGTH)?;
        let description = validation::optional(
            "description",
            Some(form.description.as_str()),
            MAX_DESCRIPTION_LENGTH,
        )?;
        let group = state
            .backend()
            .create_group(
                user.id,
                name,
                description,
                form.visibility,
                Access::User(&user.access_token),
            )
            .await?;
        Ok::<_, AppError>(group)
    }
    .await;

    match result {
        Ok(group) => {
            redirect_with_success(&session, &format!("/groups/{}", group.id), "Group created")
                .await
        }
        Err(e) => flash_or_fail(&session, e, "/groups").await,
    }
}

/// Group page template.
#[derive(Template, WebTemplate)]
#[template(path = "groups/show.html")]
pub struct GroupTemplate {
    pub ctx: PageContext,
    pub group: Group,
    pub membership: Option<Membership>,
    pub can_view: bool,
    pub can_moderate: bool,
    pub members: Vec<Membership>,
    pub feed: FeedPage,
    pub next_cursor: Option<String>,
}

impl GroupTemplate {
    pub fn is_member(&self) -> bool {
        self.membership.as_ref().is_some_and(Membership::is_active)
    }

    pub fn is_pending(&self) -> bool {
        self.membership
            .as_ref()
            .is_some_and(|m| m.status == MembershipStatus::Pending)
    }

    pub fn is_owner(&self) -> bool {
        self.membership
            .as_ref()
            .is_some_and(|m| m.role == MembershipRole::Owner)
    }
}

/// Display a group's feed and members.
#[instrument(skip(state, ctx, query))]
pub async fn show(
    State(state): State<AppState>,
    ctx: PageContext,
    Path(id): Path<GroupId>,
    Query(query): Query<FeedQuery>,
) -> Result<impl IntoResponse> {
    let backend = state.backend();
    let group = backend.group_by_id(id).await.map_err(|e| match e {
        BackendError::NotFound(_) => AppError::NotFound("group".into()),
        other => other.into(),
    })?;

    let viewer = ctx.user.as_ref().map(|u| u.id);
    let membership = match viewer {
        Some(viewer) => backend.membership(id, viewer).await?,
        None => None,
    };
    let active = membership.as_ref().is_some_and(Membership::is_active);
    let can_view = !group.is_private() || active || ctx.is_admin();
    let can_moderate = membership.as_ref().is_some_and(Membership::can_moderate);

    let mut members = backend.members(id).await?;
    if !can_moderate {
        members.retain(Membership::is_active);
    }

    let page = if can_view {
        let access = ctx
            .user
            .as_ref()
            .map_or(Access::Anon, |u| Access::User(&u.access_token));
        let before = feed::parse_cursor(query.before.as_deref());
        FeedService::new(backend)
            .in_group(id, before, viewer, access)
            .await?
    } else {
        FeedPage::default()
    };

    Ok(GroupTemplate {
        ctx,
        group,
        membership,
        can_view,
        can_moderate,
        members,
        next_cursor: page.next_cursor(),
        feed: page,
    })
}

/// Join a group (or request to, for private groups).
#[instrument(skip(state, session, user), fields(user_id = %user.id))]
pub async fn join(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(user): RequireAuth,
    Path(id): Path<GroupId>,
) -> Response {
    let back = format!("/groups/{id}");
    let result = request_membership(&state, &user, id).await;
    match result {
        Ok(MembershipStatus::Active) => redirect_with_success(&session, &back, "Joined").await,
        Ok(MembershipStatus::Pending) => {
            redirect_with_success(&session, &back, "Request sent to the group's moderators").await
        }
        Err(e) => flash_or_fail(&session, e, &back).await,
    }
}

async fn request_membership(
    state: &AppState,
    user: &CurrentUser,
    id: GroupId,
) -> Result<MembershipStatus> {
    let backend = state.backend();
    let group = backend.group_by_id(id).await?;
    if let Some(existing) = backend.membership(id, user.id).await? {
        return Ok(existing.status);
    }
    let status = MembershipStatus::on_join(group.visibility);
    match backend
        .insert_membership(
            id,
            user.id,
            MembershipRole::Member,
            status,
            Access::User(&user.access_token),
        )
        .await
    {
        Ok(membership) => Ok(membership.status),
        Err(BackendError::Conflict(_)) => Ok(status),
        Err(e) => Err(e.into()),
    }
}

/// Leave a group. Owners cannot leave their own group.
pub async fn leave(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(user): RequireAuth,
    Path(id): Path<GroupId>,
) -> Response {
    let back = format!("/groups/{id}");
    let result = async {
        let backend = state.backend();
        let membership = backend.membership(id, user.id).await?;
        if membership
            .as_ref()
            .is_some_and(|m| m.role == MembershipRole::Owner)
        {
            return Err(AppError::BadRequest(
                "Owners can't leave their own group".into(),
            ));
        }
        backend
            .delete_membership(id, user.id, Access::User(&user.access_token))
            .await?;
        Ok(())
    }
    .await;
    finish(&session, result, "You left the group", "/groups", &back).await
}

/// Approve a pending join request (owners and moderators).
#[instrument(skip(state, session, user), fields(user_id = %user.id))]
pub async fn approve(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(user): RequireAuth,
    Path((id, member)): Path<(GroupId, UserId)>,
) -> Response {
    let back = format!("/groups/{id}");
    let backend = state.backend();
    let result = async {
        let allowed = backend
            .membership(id, user.id)
            .await?
            .is_some_and(|m| m.can_moderate());
        if !allowed {
            return Err(AppError::Forbidden(
                "Only group moderators can approve members".into(),
            ));
        }
        backend
            .approve_membership(id, member, Access::User(&user.access_token))
            .await?
            .ok_or_else(|| AppError::NotFound("join request".into()))
    }
    .await;

    match result {
        Ok(_) => redirect_with_success(&session, &back, "Member approved").await,
        Err(e) => flash_or_fail(&session, e, &back).await,
    }
}
