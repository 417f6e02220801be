//! `posts`, `likes` and `comments` tables.

use std::fmt;

use agora_core::{GroupId, PostId, UserId};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::json;
use tracing::instrument;

use super::{Access, BackendClient, BackendError, Query};
use crate::models::{AuthorRef, Comment, MediaKind, Post};

/// Position in a newest-first feed: the last post shown.
///
/// Posts sharing a timestamp are ordered by id, so a page boundary that falls
/// between them neither skips nor repeats any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedCursor {
    pub created_at: DateTime<Utc>,
    pub id: PostId,
}

impl FeedCursor {
    #[must_use]
    pub const fn of(post: &Post) -> Self {
        Self {
            created_at: post.created_at,
            id: post.id,
        }
    }

    /// Parse the `timestamp_id` text form. `None` for anything else.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let (timestamp, id) = raw.split_once('_')?;
        Some(Self {
            created_at: DateTime::parse_from_rfc3339(timestamp)
                .ok()?
                .with_timezone(&Utc),
            id: id.parse().ok()?,
        })
    }

    fn timestamp(&self) -> String {
        self.created_at.to_rfc3339_opts(SecondsFormat::Micros, true)
    }
}

impl fmt::Display for FeedCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.timestamp(), self.id)
    }
}

/// Where a page of posts comes from.
#[derive(Debug, Clone, Copy)]
pub enum PostSource<'a> {
    /// Top-level posts by any of these authors.
    Authors(&'a [UserId]),
    /// Posts inside a group.
    Group(GroupId),
}

impl BackendClient {
    /// A page of posts, newest first, strictly after the `before` cursor.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails.
    #[instrument(skip(self, access))]
    pub async fn list_posts(
        &self,
        source: PostSource<'_>,
        before: Option<FeedCursor>,
        limit: usize,
        access: Access<'_>,
    ) -> Result<Vec<Post>, BackendError> {
        let mut query = Query::table("posts").select(Post::LISTING);
        query = match source {
            PostSource::Authors(authors) => {
                if authors.is_empty() {
                    return Ok(Vec::new());
                }
                query.in_("author_id", authors).is_null("group_id")
            }
            PostSource::Group(group) => query.eq("group_id", group),
        };
        if let Some(cursor) = before {
            query = query.before("created_at", cursor.timestamp(), "id", cursor.id);
        }
        let query = query
            .order("created_at", false)
            .order("id", false)
            .limit(limit);
        self.select(&query, access).await
    }

    /// # Errors
    ///
    /// Returns `NotFound` if the post does not exist or is hidden.
    pub async fn post_by_id(&self, id: PostId, access: Access<'_>) -> Result<Post, BackendError> {
        let query = Query::table("posts").select(Post::LISTING).eq("id", id);
        self.select_one(&query, access).await
    }

    /// # Errors
    ///
    /// Returns error if the insert is rejected.
    #[instrument(skip(self, body, access))]
    pub async fn create_post(
        &self,
        author: UserId,
        group: Option<GroupId>,
        body: &str,
        media: Option<(&str, MediaKind)>,
        access: Access<'_>,
    ) -> Result<Post, BackendError> {
        let (media_url, media_kind) = media.map_or((None, None), |(u, k)| (Some(u), Some(k)));
        self.insert_one(
            "posts",
            &json!({
                "author_id": author,
                "group_id": group,
                "body": body,
                "media_url": media_url,
                "media_kind": media_kind,
            }),
            access,
        )
        .await
    }

    /// Delete a post if `author` wrote it. Returns whether a row was removed.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails.
    #[instrument(skip(self, access))]
    pub async fn delete_post(
        &self,
        id: PostId,
        author: UserId,
        access: Access<'_>,
    ) -> Result<Option<Post>, BackendError> {
        let query = Query::table("posts").eq("id", id).eq("author_id", author);
        let existing: Option<Post> = self.select_optional(&query, access).await?;
        if existing.is_some() {
            self.delete(&query, access).await?;
        }
        Ok(existing)
    }

    // =========================================================================
    // Likes
    // =========================================================================

    /// # Errors
    ///
    /// Returns error if the request fails.
    pub async fn has_liked(&self, post: PostId, user: UserId) -> Result<bool, BackendError> {
        let query = Query::table("likes")
            .select("post_id")
            .eq("post_id", post)
            .eq("user_id", user);
        Ok(self.count(&query, Access::Anon).await? > 0)
    }

    /// Posts among `posts` that `user` has liked.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails.
    pub async fn liked_among(
        &self,
        user: UserId,
        posts: &[PostId],
    ) -> Result<Vec<PostId>, BackendError> {
        #[derive(serde::Deserialize)]
        struct Row {
            post_id: PostId,
        }

        if posts.is_empty() {
            return Ok(Vec::new());
        }
        let query = Query::table("likes")
            .select("post_id")
            .eq("user_id", user)
            .in_("post_id", posts);
        let rows: Vec<Row> = self.select(&query, Access::Anon).await?;
        Ok(rows.into_iter().map(|r| r.post_id).collect())
    }

    /// # Errors
    ///
    /// Returns `Conflict` if already liked.
    pub async fn like(
        &self,
        post: PostId,
        user: UserId,
        access: Access<'_>,
    ) -> Result<(), BackendError> {
        let _: Vec<serde_json::Value> = self
            .insert("likes", &json!({ "post_id": post, "user_id": user }), access)
            .await?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns error if the request fails.
    pub async fn unlike(
        &self,
        post: PostId,
        user: UserId,
        access: Access<'_>,
    ) -> Result<(), BackendError> {
        let query = Query::table("likes").eq("post_id", post).eq("user_id", user);
        self.delete(&query, access).await
    }

    // =========================================================================
    // Comments
    // =========================================================================

    /// Comments on a post, oldest first.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails.
    pub async fn comments_for(
        &self,
        post: PostId,
        access: Access<'_>,
    ) -> Result<Vec<Comment>, BackendError> {
        let query = Query::table("comments")
            .select(&format!("*,author:profiles({})", AuthorRef::COLUMNS))
            .eq("post_id", post)
            .order("created_at", true)
            .limit(200);
        self.select(&query, access).await
    }

    /// # Errors
    ///
    /// Returns error if the insert is rejected.
    #[instrument(skip(self, body, access))]
    pub async fn add_comment(
        &self,
        post: PostId,
        author: UserId,
        body: &str,
        access: Access<'_>,
    ) -> Result<Comment, BackendError> {
        self.insert_one(
            "comments",
            &json!({ "post_id": post, "author_id": author, "body": body }),
            access,
        )
        .await
    }
}
