//! Home page: the signed-in user's feed, or a landing page for visitors.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Query, State},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::instrument;

use super::PageContext;
use crate::backend::Access;
use crate::error::Result;
use crate::filters;
use crate::models::{Group, Store};
use crate::services::feed::{self, FeedPage, FeedService};
use crate::state::AppState;

/// Stores and groups shown on the landing page.
const LANDING_LIMIT: usize = 8;

/// `?before=` cursor for paged feeds.
#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    pub before: Option<String>,
}

/// Feed page template.
#[derive(Template, WebTemplate)]
#[template(path = "home/feed.html")]
pub struct FeedTemplate {
    pub ctx: PageContext,
    pub feed: FeedPage,
    pub next_cursor: Option<String>,
}

/// Landing page template.
#[derive(Template, WebTemplate)]
#[template(path = "home/landing.html")]
pub struct LandingTemplate {
    pub ctx: PageContext,
    pub stores: Vec<Store>,
    pub groups: Vec<Group>,
}

/// Display the home page.
#[instrument(skip(state, ctx))]
pub async fn home(
    State(state): State<AppState>,
    ctx: PageContext,
    Query(query): Query<FeedQuery>,
) -> Result<Response> {
    let Some(user) = ctx.user.clone() else {
        let (mut stores, groups) = tokio::try_join!(
            state.backend().list_stores(),
            state.backend().list_groups(LANDING_LIMIT),
        )?;
        stores.truncate(LANDING_LIMIT);
        return Ok(LandingTemplate {
            ctx,
            stores,
            groups,
        }
        .into_response());
    };

    let before = feed::parse_cursor(query.before.as_deref());
    let page = FeedService::new(state.backend())
        .home(user.id, before, Access::User(&user.access_token))
        .await?;

    Ok(FeedTemplate {
        ctx,
        next_cursor: page.next_cursor(),
        feed: page,
    }
    .into_response())
}
