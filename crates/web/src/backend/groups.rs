//! `groups` and `memberships` tables.

use agora_core::{GroupId, GroupVisibility, MembershipRole, MembershipStatus, UserId};
use serde_json::json;
use tracing::instrument;

use super::{Access, BackendClient, BackendError, Query};
use crate::models::{AuthorRef, Group, Membership};

const GROUP_LISTING: &str = "*,memberships(count)";

impl BackendClient {
    /// Groups, newest first.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails.
    pub async fn list_groups(&self, limit: usize) -> Result<Vec<Group>, BackendError> {
        let query = Query::table("groups")
            .select(GROUP_LISTING)
            .order("created_at", false)
            .limit(limit);
        self.select(&query, Access::Anon).await
    }

    /// # Errors
    ///
    /// Returns `NotFound` if the group does not exist.
    pub async fn group_by_id(&self, id: GroupId) -> Result<Group, BackendError> {
        let query = Query::table("groups").select(GROUP_LISTING).eq("id", id);
        self.select_one(&query, Access::Anon).await
    }

    /// Create a group and make `owner` its first, active member.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if the name is taken.
    #[instrument(skip(self, description, access))]
    pub async fn create_group(
        &self,
        owner: UserId,
        name: &str,
        description: Option<&str>,
        visibility: GroupVisibility,
        access: Access<'_>,
    ) -> Result<Group, BackendError> {
        let group: Group = self
            .insert_one(
                "groups",
                &json!({
                    "owner_id": owner,
                    "name": name,
                    "description": description,
                    "visibility": visibility,
                }),
                access,
            )
            .await?;
        self.insert_membership(
            group.id,
            owner,
            MembershipRole::Owner,
            MembershipStatus::Active,
            access,
        )
        .await?;
        Ok(group)
    }

    /// # Errors
    ///
    /// Returns error if the request fails.
    pub async fn membership(
        &self,
        group: GroupId,
        user: UserId,
    ) -> Result<Option<Membership>, BackendError> {
        let query = Query::table("memberships")
            .eq("group_id", group)
            .eq("user_id", user);
        self.select_optional(&query, Access::Anon).await
    }

    /// # Errors
    ///
    /// Returns `Conflict` if the user is already a member or has a request open.
    pub async fn insert_membership(
        &self,
        group: GroupId,
        user: UserId,
        role: MembershipRole,
        status: MembershipStatus,
        access: Access<'_>,
    ) -> Result<Membership, BackendError> {
        self.insert_one(
            "memberships",
            &json!({
                "group_id": group,
                "user_id": user,
                "role": role,
                "status": status,
            }),
            access,
        )
        .await
    }

    /// # Errors
    ///
    /// Returns error if the request fails.
    pub async fn delete_membership(
        &self,
        group: GroupId,
        user: UserId,
        access: Access<'_>,
    ) -> Result<(), BackendError> {
        let query = Query::table("memberships")
            .eq("group_id", group)
            .eq("user_id", user);
        self.delete(&query, access).await
    }

    /// Members of a group with their profiles, pending requests first.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails.
    pub async fn members(&self, group: GroupId) -> Result<Vec<Membership>, BackendError> {
        let query = Query::table("memberships")
            .select(&format!("*,member:profiles({})", AuthorRef::COLUMNS))
            .eq("group_id", group)
            .order("status", false)
            .order("created_at", true)
            .limit(500);
        self.select(&query, Access::Anon).await
    }

    /// Activate a pending membership. Returns `None` if none was pending.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails.
    #[instrument(skip(self, access))]
    pub async fn approve_membership(
        &self,
        group: GroupId,
        user: UserId,
        access: Access<'_>,
    ) -> Result<Option<Membership>, BackendError> {
        let query = Query::table("memberships")
            .eq("group_id", group)
            .eq("user_id", user)
            .eq("status", MembershipStatus::Pending);
        let rows: Vec<Membership> = self
            .update(&query, &json!({ "status": MembershipStatus::Active }), access)
            .await?;
        Ok(rows.into_iter().next())
    }
}
