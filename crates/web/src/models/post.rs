//! Posts, likes and comments.

use agora_core::{CommentId, GroupId, PostId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AuthorRef, CountRow, embedded_count};

/// Kind of media attached to a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
}

/// A row in `posts`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub author_id: UserId,
    #[serde(default)]
    pub group_id: Option<GroupId>,
    pub body: String,
    #[serde(default)]
    pub media_url: Option<String>,
    #[serde(default)]
    pub media_kind: Option<MediaKind>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub author: Option<AuthorRef>,
    #[serde(default)]
    pub likes: Vec<CountRow>,
    #[serde(default)]
    pub comments: Vec<CountRow>,
}

impl Post {
    /// Columns for feed and profile listings.
    pub const LISTING: &'static str =
        "*,author:profiles(username,display_name,avatar_url),likes(count),comments(count)";

    #[must_use]
    pub fn like_count(&self) -> u64 {
        embedded_count(&self.likes)
    }

    #[must_use]
    pub fn comment_count(&self) -> u64 {
        embedded_count(&self.comments)
    }

    #[must_use]
    pub fn author_name(&self) -> &str {
        self.author.as_ref().map_or("unknown", AuthorRef::name)
    }

    #[must_use]
    pub fn author_username(&self) -> &str {
        self.author.as_ref().map_or("", |a| a.username.as_str())
    }

    #[must_use]
    pub fn is_video(&self) -> bool {
        self.media_kind == Some(MediaKind::Video)
    }
}

/// A row in `comments`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub post_id: PostId,
    pub author_id: UserId,
    pub body: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub author: Option<AuthorRef>,
}

impl Comment {
    #[must_use]
    pub fn author_name(&self) -> &str {
        self.author.as_ref().map_or("unknown", AuthorRef::name)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_row_with_embeds() {
        let row = serde_json::json!({
            "id": "0b6e2a3c-9c7b-4f55-8f5a-1d8f9b1f1a10",
            "author_id": "6a2f41a3-c54c-fce8-32d2-0324e1c32e22",
            "group_id": null,
            "body": "New drop this Friday",
            "media_url": "https://cdn.example/media/a.mp4",
            "media_kind": "video",
            "created_at": "2024-05-04T08:30:00Z",
            "author": {"username": "kemi", "display_name": "Kemi A.", "avatar_url": null},
            "likes": [{"count": 12}],
            "comments": [{"count": 3}]
        });
        let post: Post = serde_json::from_value(row).unwrap();
        assert_eq!(post.like_count(), 12);
        assert_eq!(post.comment_count(), 3);
        assert_eq!(post.author_name(), "Kemi A.");
        assert!(post.is_video());
    }

    #[test]
    fn test_plain_row_without_embeds() {
        let row = serde_json::json!({
            "id": "0b6e2a3c-9c7b-4f55-8f5a-1d8f9b1f1a10",
            "author_id": "6a2f41a3-c54c-fce8-32d2-0324e1c32e22",
            "body": "hello",
            "created_at": "2024-05-04T08:30:00Z"
        });
        let post: Post = serde_json::from_value(row).unwrap();
        assert_eq!(post.like_count(), 0);
        assert_eq!(post.author_username(), "");
        assert!(!post.is_video());
    }
}
