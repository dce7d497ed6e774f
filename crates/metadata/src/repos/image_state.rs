//! Pull-state transitions.

use crate::error::MetadataResult;
use crate::models::{DeleteOutcome, PullOutcome, PullStateRow};
use async_trait::async_trait;
use regsync_core::{DeleteTarget, ImageRef};
use time::OffsetDateTime;

/// Repository for image pull state.
///
/// Each transition is atomic: identity resolution, the pull-state write and
/// the allow-list annotation commit together or not at all.
#[async_trait]
pub trait ImageStateRepo: Send + Sync {
    /// Record that an image is present in the registry.
    async fn mark_pulled(&self, image: &ImageRef, at: OffsetDateTime)
    -> MetadataResult<PullOutcome>;

    /// Record that a tag, or every tag of a repository, was removed.
    ///
    /// Never creates identities. An unknown repository only touches the
    /// allow-list.
    async fn mark_deleted(
        &self,
        target: &DeleteTarget,
        at: OffsetDateTime,
    ) -> MetadataResult<DeleteOutcome>;

    /// Current pull state of a tag.
    async fn get_pull_state(&self, tag_id: i64) -> MetadataResult<Option<PullStateRow>>;
}
