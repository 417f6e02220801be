//! Groups and memberships.

use agora_core::{GroupId, GroupVisibility, MembershipRole, MembershipStatus, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AuthorRef, CountRow, embedded_count};

/// A row in `groups`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub visibility: GroupVisibility,
    pub owner_id: UserId,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub memberships: Vec<CountRow>,
}

impl Group {
    #[must_use]
    pub fn member_count(&self) -> u64 {
        embedded_count(&self.memberships)
    }

    #[must_use]
    pub fn is_private(&self) -> bool {
        self.visibility == GroupVisibility::Private
    }
}

/// A row in `memberships`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Membership {
    pub group_id: GroupId,
    pub user_id: UserId,
    pub role: MembershipRole,
    pub status: MembershipStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub member: Option<AuthorRef>,
}

impl Membership {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == MembershipStatus::Active
    }

    /// Active owners and moderators may approve requests.
    #[must_use]
    pub fn can_moderate(&self) -> bool {
        self.is_active() && self.role.can_moderate()
    }

    #[must_use]
    pub fn member_name(&self) -> &str {
        self.member.as_ref().map_or("unknown", AuthorRef::name)
    }

    #[must_use]
    pub fn member_username(&self) -> &str {
        self.member.as_ref().map_or("", |m| m.username.as_str())
    }
}
