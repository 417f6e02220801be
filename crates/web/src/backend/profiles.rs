//! `profiles` and `follows` tables.

use agora_core::{AccountStatus, UserId, UserRole};
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use super::{Access, BackendClient, BackendError, Query};
use crate::models::Profile;

#[derive(Deserialize)]
struct FolloweeRow {
    followee_id: UserId,
}

impl BackendClient {
    /// # Errors
    ///
    /// Returns error if the request fails.
    pub async fn profile_by_id(&self, id: UserId) -> Result<Option<Profile>, BackendError> {
        let query = Query::table("profiles").eq("id", id);
        self.select_optional(&query, Access::Anon).await
    }

    /// # Errors
    ///
    /// Returns `NotFound` if no profile has this username.
    pub async fn profile_by_username(&self, username: &str) -> Result<Profile, BackendError> {
        let query = Query::table("profiles").eq("username", username.to_ascii_lowercase());
        self.select_one(&query, Access::Anon).await
    }

    /// # Errors
    ///
    /// Returns error if the request fails.
    pub async fn username_taken(&self, username: &str) -> Result<bool, BackendError> {
        let query = Query::table("profiles").select("id").eq("username", username);
        Ok(self.count(&query, Access::Anon).await? > 0)
    }

    /// Create the profile row for a new auth user.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if the username was taken in the meantime.
    #[instrument(skip(self))]
    pub async fn create_profile(&self, id: UserId, username: &str) -> Result<Profile, BackendError> {
        self.insert_one(
            "profiles",
            &json!({
                "id": id,
                "username": username,
                "role": UserRole::Member,
                "status": AccountStatus::Active,
            }),
            Access::Service,
        )
        .await
    }

    /// Update the editable profile fields as the profile's owner.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when row-level security hides the row.
    #[instrument(skip(self, access))]
    pub async fn update_profile(
        &self,
        id: UserId,
        display_name: Option<&str>,
        bio: Option<&str>,
        avatar_url: Option<&str>,
        access: Access<'_>,
    ) -> Result<Profile, BackendError> {
        let mut patch = json!({ "display_name": display_name, "bio": bio });
        if let Some(url) = avatar_url {
            patch["avatar_url"] = json!(url);
        }
        let rows: Vec<Profile> = self
            .update(&Query::table("profiles").eq("id", id), &patch, access)
            .await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| BackendError::NotFound("profiles".to_string()))
    }

    /// Profiles whose username or display name contains `term`.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails.
    pub async fn search_profiles(
        &self,
        term: &str,
        limit: usize,
    ) -> Result<Vec<Profile>, BackendError> {
        let cleaned: String = term
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '_' || *c == ' ')
            .collect();
        let mut query = Query::table("profiles")
            .eq("status", AccountStatus::Active)
            .order("username", true)
            .limit(limit);
        if !cleaned.trim().is_empty() {
            query = query.or(&[
                ("username", "ilike", &format!("*{}*", cleaned.trim())),
                ("display_name", "ilike", &format!("*{}*", cleaned.trim())),
            ]);
        }
        self.select(&query, Access::Anon).await
    }

    /// Every profile, newest first, for the admin panel.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails.
    pub async fn list_profiles(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Profile>, BackendError> {
        let query = Query::table("profiles")
            .order("created_at", false)
            .offset(offset)
            .limit(limit);
        self.select(&query, Access::Service).await
    }

    /// # Errors
    ///
    /// Returns `NotFound` if the profile does not exist.
    #[instrument(skip(self))]
    pub async fn set_account_status(
        &self,
        id: UserId,
        status: AccountStatus,
    ) -> Result<Profile, BackendError> {
        self.patch_profile_as_service(id, &json!({ "status": status }))
            .await
    }

    /// # Errors
    ///
    /// Returns `NotFound` if the profile does not exist.
    #[instrument(skip(self))]
    pub async fn set_role(&self, id: UserId, role: UserRole) -> Result<Profile, BackendError> {
        self.patch_profile_as_service(id, &json!({ "role": role }))
            .await
    }

    async fn patch_profile_as_service(
        &self,
        id: UserId,
        patch: &serde_json::Value,
    ) -> Result<Profile, BackendError> {
        let rows: Vec<Profile> = self
            .update(&Query::table("profiles").eq("id", id), patch, Access::Service)
            .await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| BackendError::NotFound("profiles".to_string()))
    }

    // =========================================================================
    // Follows
    // =========================================================================

    /// # Errors
    ///
    /// Returns error if the request fails.
    pub async fn is_following(
        &self,
        follower: UserId,
        followee: UserId,
    ) -> Result<bool, BackendError> {
        let query = Query::table("follows")
            .select("follower_id")
            .eq("follower_id", follower)
            .eq("followee_id", followee);
        Ok(self.count(&query, Access::Anon).await? > 0)
    }

    /// # Errors
    ///
    /// Returns `Conflict` if already following.
    pub async fn follow(
        &self,
        follower: UserId,
        followee: UserId,
        access: Access<'_>,
    ) -> Result<(), BackendError> {
        let _: Vec<serde_json::Value> = self
            .insert(
                "follows",
                &json!({ "follower_id": follower, "followee_id": followee }),
                access,
            )
            .await?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns error if the request fails.
    pub async fn unfollow(
        &self,
        follower: UserId,
        followee: UserId,
        access: Access<'_>,
    ) -> Result<(), BackendError> {
        let query = Query::table("follows")
            .eq("follower_id", follower)
            .eq("followee_id", followee);
        self.delete(&query, access).await
    }

    /// Ids of everyone `user` follows.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails.
    pub async fn followee_ids(&self, user: UserId) -> Result<Vec<UserId>, BackendError> {
        let query = Query::table("follows")
            .select("followee_id")
            .eq("follower_id", user);
        let rows: Vec<FolloweeRow> = self.select(&query, Access::Anon).await?;
        Ok(rows.into_iter().map(|r| r.followee_id).collect())
    }

    /// `(followers, following)` counts for a profile.
    ///
    /// # Errors
    ///
    /// Returns error if either count fails.
    pub async fn follow_counts(&self, user: UserId) -> Result<(u64, u64), BackendError> {
        let followers = Query::table("follows")
            .select("follower_id")
            .eq("followee_id", user);
        let following = Query::table("follows")
            .select("followee_id")
            .eq("follower_id", user);
        let (a, b) = tokio::try_join!(
            self.count(&followers, Access::Anon),
            self.count(&following, Access::Anon)
        )?;
        Ok((a, b))
    }
}
