//! Object storage for uploaded media.

use reqwest::Method;
use serde_json::json;
use tracing::instrument;

use super::{Access, BackendClient, BackendError, check_status};

impl BackendClient {
    /// Bucket uploads go to.
    #[must_use]
    pub fn media_bucket(&self) -> &str {
        &self.inner.media_bucket
    }

    /// Upload `bytes` to `path` in the media bucket as the signed-in user.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if an object already exists at `path`.
    #[instrument(skip(self, bytes, access), fields(size = bytes.len()))]
    pub async fn upload(
        &self,
        path: &str,
        content_type: &str,
        bytes: Vec<u8>,
        access: Access<'_>,
    ) -> Result<(), BackendError> {
        let url = format!(
            "{}/storage/v1/object/{}/{path}",
            self.url(),
            self.media_bucket()
        );
        let response = self
            .request(Method::POST, &url, access)
            .header("Content-Type", content_type)
            .header("x-upsert", "false")
            .body(bytes)
            .send()
            .await?;
        check_status(response).await.map(|_| ())
    }

    /// Public URL of an object in the media bucket.
    #[must_use]
    pub fn public_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{path}",
            self.url(),
            self.media_bucket()
        )
    }

    /// Path of an object from its public URL, if it lives in the media bucket.
    #[must_use]
    pub fn object_path<'a>(&self, public_url: &'a str) -> Option<&'a str> {
        let prefix = self.public_url("");
        public_url.strip_prefix(prefix.as_str())
    }

    /// Delete objects from the media bucket.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails.
    #[instrument(skip(self, access))]
    pub async fn remove(&self, paths: &[&str], access: Access<'_>) -> Result<(), BackendError> {
        if paths.is_empty() {
            return Ok(());
        }
        let url = format!("{}/storage/v1/object/{}", self.url(), self.media_bucket());
        let response = self
            .request(Method::DELETE, &url, access)
            .json(&json!({ "prefixes": paths }))
            .send()
            .await?;
        check_status(response).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use crate::backend::tests::client_for;

    #[test]
    fn test_public_url_and_back() {
        let client = client_for("https://proj.backend.example");
        let url = client.public_url("user-1/abc.jpg");
        assert_eq!(
            url,
            "https://proj.backend.example/storage/v1/object/public/media/user-1/abc.jpg"
        );
        assert_eq!(client.object_path(&url), Some("user-1/abc.jpg"));
        assert_eq!(client.object_path("https://elsewhere.example/x.jpg"), None);
    }
}
