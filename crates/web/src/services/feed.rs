//! Posts, feeds and likes.
//!
//! Feeds page backwards by `(created_at, id)`: each page asks for one row
//! more than it shows, and the extra row only tells whether another page
//! exists.

use agora_core::validation::{self, MAX_COMMENT_LENGTH, MAX_POST_LENGTH};
use agora_core::{GroupId, PostId, UserId};
use tracing::instrument;

use crate::backend::{Access, BackendClient, BackendError, FeedCursor, PostSource};
use crate::error::{AppError, Result};
use crate::models::{Comment, MediaKind, Post};

/// Posts per feed page.
pub const PAGE_SIZE: usize = 20;

/// A post and whether the viewer liked it.
#[derive(Debug, Clone)]
pub struct FeedPost {
    pub post: Post,
    pub liked: bool,
}

/// One page of a feed.
#[derive(Debug, Clone, Default)]
pub struct FeedPage {
    pub posts: Vec<FeedPost>,
    pub has_more: bool,
}

impl FeedPage {
    /// Value for the next page's `before` parameter.
    #[must_use]
    pub fn next_cursor(&self) -> Option<String> {
        if !self.has_more {
            return None;
        }
        self.posts
            .last()
            .map(|p| FeedCursor::of(&p.post).to_string())
    }
}

/// Parse a `before` query parameter. Malformed cursors start from the top.
#[must_use]
pub fn parse_cursor(raw: Option<&str>) -> Option<FeedCursor> {
    raw.and_then(FeedCursor::parse)
}

/// Split an over-fetched page into the posts to show and a has-more flag.
fn paginate(mut rows: Vec<Post>, page_size: usize) -> (Vec<Post>, bool) {
    let has_more = rows.len() > page_size;
    rows.truncate(page_size);
    (rows, has_more)
}

/// Feed and post service.
pub struct FeedService<'a> {
    backend: &'a BackendClient,
}

impl<'a> FeedService<'a> {
    #[must_use]
    pub const fn new(backend: &'a BackendClient) -> Self {
        Self { backend }
    }

    /// Posts by people `viewer` follows and by `viewer`, newest first.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails.
    #[instrument(skip(self, access))]
    pub async fn home(
        &self,
        viewer: UserId,
        before: Option<FeedCursor>,
        access: Access<'_>,
    ) -> Result<FeedPage> {
        let mut authors = self.backend.followee_ids(viewer).await?;
        authors.push(viewer);
        self.page(PostSource::Authors(&authors), before, Some(viewer), access)
            .await
    }

    /// Top-level posts by one author.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails.
    pub async fn by_author(
        &self,
        author: UserId,
        before: Option<FeedCursor>,
        viewer: Option<UserId>,
        access: Access<'_>,
    ) -> Result<FeedPage> {
        self.page(PostSource::Authors(&[author]), before, viewer, access)
            .await
    }

    /// Posts inside a group.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails.
    pub async fn in_group(
        &self,
        group: GroupId,
        before: Option<FeedCursor>,
        viewer: Option<UserId>,
        access: Access<'_>,
    ) -> Result<FeedPage> {
        self.page(PostSource::Group(group), before, viewer, access)
            .await
    }

    async fn page(
        &self,
        source: PostSource<'_>,
        before: Option<FeedCursor>,
        viewer: Option<UserId>,
        access: Access<'_>,
    ) -> Result<FeedPage> {
        let rows = self
            .backend
            .list_posts(source, before, PAGE_SIZE + 1, access)
            .await?;
        let (posts, has_more) = paginate(rows, PAGE_SIZE);

        let liked = match viewer {
            Some(viewer) => {
                let ids: Vec<PostId> = posts.iter().map(|p| p.id).collect();
                self.backend.liked_among(viewer, &ids).await?
            }
            None => Vec::new(),
        };

        Ok(FeedPage {
            posts: posts
                .into_iter()
                .map(|post| FeedPost {
                    liked: liked.contains(&post.id),
                    post,
                })
                .collect(),
            has_more,
        })
    }

    /// A post with its comments.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the post is missing or hidden.
    pub async fn thread(
        &self,
        id: PostId,
        viewer: Option<UserId>,
        access: Access<'_>,
    ) -> Result<(FeedPost, Vec<Comment>)> {
        let (post, comments) = tokio::try_join!(
            self.backend.post_by_id(id, access),
            self.backend.comments_for(id, access),
        )?;
        let liked = match viewer {
            Some(viewer) => self.backend.has_liked(id, viewer).await?,
            None => false,
        };
        Ok((FeedPost { post, liked }, comments))
    }

    /// Publish a post, optionally inside a group the author belongs to.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for an empty or overlong body without media and
    /// `Forbidden` when the author is not an active group member.
    #[instrument(skip(self, body, access))]
    pub async fn publish(
        &self,
        author: UserId,
        group: Option<GroupId>,
        body: &str,
        media: Option<(&str, MediaKind)>,
        access: Access<'_>,
    ) -> Result<Post> {
        let body = if media.is_some() {
            validation::optional("post", Some(body), MAX_POST_LENGTH)?.unwrap_or_default()
        } else {
            validation::required("post", body, MAX_POST_LENGTH)?
        };

        if let Some(group) = group {
            let active = self
                .backend
                .membership(group, author)
                .await?
                .is_some_and(|m| m.is_active());
            if !active {
                return Err(AppError::Forbidden(
                    "Join the group before posting in it".to_string(),
                ));
            }
        }

        Ok(self
            .backend
            .create_post(author, group, body, media, access)
            .await?)
    }

    /// Like or unlike. Returns whether the post is now liked.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails.
    pub async fn toggle_like(&self, post: PostId, user: UserId, access: Access<'_>) -> Result<bool> {
        if self.backend.has_liked(post, user).await? {
            self.backend.unlike(post, user, access).await?;
            return Ok(false);
        }
        match self.backend.like(post, user, access).await {
            // Double-submitted like
            Ok(()) | Err(BackendError::Conflict(_)) => Ok(true),
            Err(e) => Err(e.into()),
        }
    }

    /// # Errors
    ///
    /// Returns `Validation` for an empty or overlong comment.
    pub async fn comment(
        &self,
        post: PostId,
        author: UserId,
        body: &str,
        access: Access<'_>,
    ) -> Result<Comment> {
        let body = validation::required("comment", body, MAX_COMMENT_LENGTH)?;
        Ok(self.backend.add_comment(post, author, body, access).await?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::backend::fake::FakeBackend;
    use chrono::{DateTime, Duration, Utc};

    fn post(created_at: DateTime<Utc>) -> Post {
        Post {
            id: PostId::generate(),
            author_id: UserId::generate(),
            group_id: None,
            body: "hello".to_string(),
            media_url: None,
            media_kind: None,
            created_at,
            author: None,
            likes: Vec::new(),
            comments: Vec::new(),
        }
    }

    fn rows(n: usize) -> Vec<Post> {
        let now = DateTime::parse_from_rfc3339("2026-03-01T12:00:00.123456Z")
            .unwrap()
            .with_timezone(&Utc);
        (0..n)
            .map(|i| post(now - Duration::minutes(i64::try_from(i).unwrap())))
            .collect()
    }

    #[test]
    fn test_paginate_detects_more() {
        let (posts, has_more) = paginate(rows(PAGE_SIZE + 1), PAGE_SIZE);
        assert_eq!(posts.len(), PAGE_SIZE);
        assert!(has_more);

        let (posts, has_more) = paginate(rows(PAGE_SIZE), PAGE_SIZE);
        assert_eq!(posts.len(), PAGE_SIZE);
        assert!(!has_more);
    }

    #[test]
    fn test_cursor_is_last_shown_post() {
        let (posts, has_more) = paginate(rows(PAGE_SIZE + 1), PAGE_SIZE);
        let last = FeedCursor::of(posts.last().unwrap());
        let page = FeedPage {
            posts: posts
                .into_iter()
                .map(|post| FeedPost { post, liked: false })
                .collect(),
            has_more,
        };

        let cursor = page.next_cursor().unwrap();
        assert_eq!(parse_cursor(Some(&cursor)), Some(last));
    }

    #[test]
    fn test_no_cursor_on_last_page() {
        let page = FeedPage {
            posts: rows(3)
                .into_iter()
                .map(|post| FeedPost { post, liked: false })
                .collect(),
            has_more: false,
        };
        assert!(page.next_cursor().is_none());
    }

    #[test]
    fn test_parse_cursor_ignores_garbage() {
        assert!(parse_cursor(Some("yesterday")).is_none());
        assert!(parse_cursor(None).is_none());
        assert!(parse_cursor(Some("2026-03-01T12:00:00.000001Z")).is_none());
        assert!(parse_cursor(Some("2026-03-01T12:00:00.000001Z_not-an-id")).is_none());
        assert!(
            parse_cursor(Some(
                "2026-03-01T12:00:00.000001Z_6f1c2d3e-4b5a-4c6d-8e7f-9a0b1c2d3e4f"
            ))
            .is_some()
        );
    }

    #[tokio::test]
    async fn test_paging_through_posts_with_equal_timestamps() {
        let fake = FakeBackend::new();
        let author = UserId::generate();
        // Five posts in the same microsecond, then one older
        let stamps = ["2026-03-01T12:00:00.000000Z"; 5]
            .into_iter()
            .chain(["2026-03-01T11:59:00.000000Z"]);
        fake.seed(
            "posts",
            stamps.map(|created_at| {
                serde_json::json!({
                    "id": PostId::generate(), "author_id": author, "group_id": null,
                    "body": "same moment", "created_at": created_at
                })
            }),
        );
        let backend = fake.start().await;

        let mut seen = Vec::new();
        let mut before = None;
        loop {
            let rows = backend
                .list_posts(PostSource::Authors(&[author]), before, 3, Access::Anon)
                .await
                .unwrap();
            let Some(last) = rows.last() else { break };
            before = Some(FeedCursor::of(last));
            seen.extend(rows.iter().map(|p| p.id));
        }

        assert_eq!(seen.len(), 6);
        let mut unique = seen.clone();
        unique.sort_by_key(ToString::to_string);
        unique.dedup();
        assert_eq!(unique.len(), 6);
    }
}
