//! Repository and tag identity.

use crate::error::MetadataResult;
use crate::models::{RepositoryRow, TagRow};
use async_trait::async_trait;

/// Repository for registry identities.
///
/// `resolve_*` return the existing id or create one. Concurrent callers for
/// the same name converge on a single row.
#[async_trait]
pub trait RegistryRepo: Send + Sync {
    /// Get or create the repository id for a full name.
    async fn resolve_repo(&self, full_name: &str) -> MetadataResult<i64>;

    /// Get or create the tag id under a repository.
    async fn resolve_tag(&self, repository_id: i64, tag: &str) -> MetadataResult<i64>;

    /// Look up a repository without creating it.
    async fn find_repo(&self, full_name: &str) -> MetadataResult<Option<RepositoryRow>>;

    /// Look up a tag without creating it.
    async fn find_tag(&self, repository_id: i64, tag: &str) -> MetadataResult<Option<TagRow>>;

    /// All tags of a repository, ordered by name.
    async fn list_tags(&self, repository_id: i64) -> MetadataResult<Vec<TagRow>>;
}
