//! Allow-list access.

use crate::error::MetadataResult;
use crate::models::AllowedImageRow;
use async_trait::async_trait;

/// Repository for allow-list entries.
#[async_trait]
pub trait AllowedImageRepo: Send + Sync {
    /// Insert an allow-list entry. Administrative seeding only; the webhook
    /// path never creates entries.
    async fn create_allowed_image(&self, name: &str, tag: &str) -> MetadataResult<i64>;

    /// Get an entry by name and tag.
    async fn get_allowed_image(
        &self,
        name: &str,
        tag: &str,
    ) -> MetadataResult<Option<AllowedImageRow>>;

    /// All entries for a repository name, ordered by tag.
    async fn list_allowed_images(&self, name: &str) -> MetadataResult<Vec<AllowedImageRow>>;
}
