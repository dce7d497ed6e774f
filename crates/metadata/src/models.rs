//! Database models mapping to the registry sync schema.

use sqlx::FromRow;
use time::OffsetDateTime;

// =============================================================================
// Identity
// =============================================================================

/// Repository record. Identity is the full name; rows are never renamed or removed.
#[derive(Debug, Clone, FromRow, PartialEq, Eq)]
pub struct RepositoryRow {
    pub id: i64,
    pub full_name: String,
}

/// Tag record, unique per repository.
#[derive(Debug, Clone, FromRow, PartialEq, Eq)]
pub struct TagRow {
    pub id: i64,
    pub repository_id: i64,
    pub tag: String,
}

// =============================================================================
// State
// =============================================================================

/// Pull state of a tag (at most one row per tag).
#[derive(Debug, Clone, FromRow)]
pub struct PullStateRow {
    pub tag_id: i64,
    pub is_pulled: bool,
    pub last_pulled_at: Option<OffsetDateTime>,
}

/// Allow-list entry. Maintained externally; this service only annotates it.
#[derive(Debug, Clone, FromRow)]
pub struct AllowedImageRow {
    pub id: i64,
    pub name: String,
    pub tag: String,
    /// Back-reference to the tag, set when the image is seen pulled.
    pub tag_id: Option<i64>,
    pub raw_name: Option<String>,
    pub raw_tag: Option<String>,
    pub deleted_at: Option<OffsetDateTime>,
    pub harbor_deleted: bool,
    pub harbor_deleted_at: Option<OffsetDateTime>,
}

// =============================================================================
// Transition outcomes
// =============================================================================

/// Result of a mark-pulled transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PullOutcome {
    pub repo_id: i64,
    pub tag_id: i64,
    /// Allow-list rows whose back-reference was refreshed (zero is normal).
    pub allow_list_rows: u64,
}

/// Result of a mark-deleted transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteOutcome {
    /// `None` when the repository was never tracked.
    pub repo_id: Option<i64>,
    /// Allow-list rows marked deleted.
    pub allow_list_rows: u64,
    /// Pull-state rows flipped to not pulled.
    pub pull_states_cleared: u64,
}

impl DeleteOutcome {
    pub(crate) fn untracked(allow_list_rows: u64) -> Self {
        Self {
            repo_id: None,
            allow_list_rows,
            pull_states_cleared: 0,
        }
    }
}
