//! Metadata store trait and implementations.

use crate::error::{MetadataError, MetadataResult};
use crate::repos::{AllowedImageRepo, ImageStateRepo, RegistryRepo};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite, SqliteConnection};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore: RegistryRepo + ImageStateRepo + AllowedImageRepo + Send + Sync {
    /// Create the schema if it does not exist.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open (creating if needed) a SQLite database and apply the schema.
    pub async fn new(path: impl AsRef<Path>) -> MetadataResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        // One connection: SQLite serializes writers anyway, and a single
        // connection keeps concurrent transitions from hitting "database is locked".
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        tracing::debug!(path = %path.display(), "SQLite metadata store ready");
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// Select, insert-if-absent, reselect. Runs on the caller's connection so the
// resolution joins whatever transaction is open there.
async fn resolve_repo_on(conn: &mut SqliteConnection, full_name: &str) -> MetadataResult<i64> {
    let existing: Option<i64> = sqlx::query_scalar("SELECT id FROM repos WHERE full_name = ?")
        .bind(full_name)
        .fetch_optional(&mut *conn)
        .await?;
    if let Some(id) = existing {
        return Ok(id);
    }

    let inserted: Option<i64> = sqlx::query_scalar(
        "INSERT INTO repos (full_name) VALUES (?) ON CONFLICT (full_name) DO NOTHING RETURNING id",
    )
    .bind(full_name)
    .fetch_optional(&mut *conn)
    .await?;
    if let Some(id) = inserted {
        tracing::debug!(repository = full_name, repo_id = id, "Created repository");
        return Ok(id);
    }

    sqlx::query_scalar::<_, i64>("SELECT id FROM repos WHERE full_name = ?")
        .bind(full_name)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| {
            MetadataError::Resolution(format!("repository '{full_name}' missing after insert"))
        })
}

async fn resolve_tag_on(
    conn: &mut SqliteConnection,
    repository_id: i64,
    tag: &str,
) -> MetadataResult<i64> {
    let existing: Option<i64> =
        sqlx::query_scalar("SELECT id FROM tags WHERE repository_id = ? AND tag = ?")
            .bind(repository_id)
            .bind(tag)
            .fetch_optional(&mut *conn)
            .await?;
    if let Some(id) = existing {
        return Ok(id);
    }

    let inserted: Option<i64> = sqlx::query_scalar(
        r#"
        INSERT INTO tags (repository_id, tag) VALUES (?, ?)
        ON CONFLICT (repository_id, tag) DO NOTHING
        RETURNING id
        "#,
    )
    .bind(repository_id)
    .bind(tag)
    .fetch_optional(&mut *conn)
    .await?;
    if let Some(id) = inserted {
        tracing::debug!(repo_id = repository_id, tag = tag, tag_id = id, "Created tag");
        return Ok(id);
    }

    sqlx::query_scalar::<_, i64>("SELECT id FROM tags WHERE repository_id = ? AND tag = ?")
        .bind(repository_id)
        .bind(tag)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| {
            MetadataError::Resolution(format!(
                "tag '{tag}' of repository {repository_id} missing after insert"
            ))
        })
}

// Implement all the repository traits for SqliteStore
mod sqlite_impl {
    use super::*;
    use crate::models::*;
    use regsync_core::{DeleteTarget, ImageRef};
    use time::OffsetDateTime;

    #[async_trait]
    impl RegistryRepo for SqliteStore {
        async fn resolve_repo(&self, full_name: &str) -> MetadataResult<i64> {
            let mut tx = self.pool.begin().await?;
            let id = resolve_repo_on(&mut tx, full_name).await?;
            tx.commit().await?;
            Ok(id)
        }

        async fn resolve_tag(&self, repository_id: i64, tag: &str) -> MetadataResult<i64> {
            let mut tx = self.pool.begin().await?;
            let id = resolve_tag_on(&mut tx, repository_id, tag).await?;
            tx.commit().await?;
            Ok(id)
        }

        async fn find_repo(&self, full_name: &str) -> MetadataResult<Option<RepositoryRow>> {
            let row = sqlx::query_as::<_, RepositoryRow>(
                "SELECT id, full_name FROM repos WHERE full_name = ?",
            )
            .bind(full_name)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn find_tag(&self, repository_id: i64, tag: &str) -> MetadataResult<Option<TagRow>> {
            let row = sqlx::query_as::<_, TagRow>(
                "SELECT id, repository_id, tag FROM tags WHERE repository_id = ? AND tag = ?",
            )
            .bind(repository_id)
            .bind(tag)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn list_tags(&self, repository_id: i64) -> MetadataResult<Vec<TagRow>> {
            let rows = sqlx::query_as::<_, TagRow>(
                "SELECT id, repository_id, tag FROM tags WHERE repository_id = ? ORDER BY tag",
            )
            .bind(repository_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }
    }

    #[async_trait]
    impl ImageStateRepo for SqliteStore {
        async fn mark_pulled(
            &self,
            image: &ImageRef,
            at: OffsetDateTime,
        ) -> MetadataResult<PullOutcome> {
            let mut tx = self.pool.begin().await?;

            let repo_id = resolve_repo_on(&mut tx, image.repository()).await?;
            let tag_id = resolve_tag_on(&mut tx, repo_id, image.tag()).await?;

            sqlx::query(
                r#"
                INSERT INTO image_pulls (tag_id, is_pulled, last_pulled_at)
                VALUES (?, 1, ?)
                ON CONFLICT (tag_id) DO UPDATE SET
                    is_pulled = excluded.is_pulled,
                    last_pulled_at = excluded.last_pulled_at
                "#,
            )
            .bind(tag_id)
            .bind(at)
            .execute(&mut *tx)
            .await?;

            let allow_list_rows = sqlx::query(
                r#"
                UPDATE allowed_images SET tag_id = ?, raw_name = ?, raw_tag = ?
                WHERE name = ? AND tag = ?
                "#,
            )
            .bind(tag_id)
            .bind(image.repository())
            .bind(image.tag())
            .bind(image.repository())
            .bind(image.tag())
            .execute(&mut *tx)
            .await?
            .rows_affected();

            tx.commit().await?;

            Ok(PullOutcome {
                repo_id,
                tag_id,
                allow_list_rows,
            })
        }

        async fn mark_deleted(
            &self,
            target: &DeleteTarget,
            at: OffsetDateTime,
        ) -> MetadataResult<DeleteOutcome> {
            let mut tx = self.pool.begin().await?;

            let allow_list_rows = match target.tag_name() {
                Some(tag) => {
                    sqlx::query(
                        r#"
                        UPDATE allowed_images
                        SET deleted_at = ?, harbor_deleted = 1, harbor_deleted_at = ?
                        WHERE name = ? AND tag = ?
                        "#,
                    )
                    .bind(at)
                    .bind(at)
                    .bind(target.repository())
                    .bind(tag)
                    .execute(&mut *tx)
                    .await?
                }
                None => {
                    sqlx::query(
                        r#"
                        UPDATE allowed_images
                        SET deleted_at = ?, harbor_deleted = 1, harbor_deleted_at = ?
                        WHERE name = ?
                        "#,
                    )
                    .bind(at)
                    .bind(at)
                    .bind(target.repository())
                    .execute(&mut *tx)
                    .await?
                }
            }
            .rows_affected();

            let repo_id: Option<i64> =
                sqlx::query_scalar("SELECT id FROM repos WHERE full_name = ?")
                    .bind(target.repository())
                    .fetch_optional(&mut *tx)
                    .await?;

            let Some(repo_id) = repo_id else {
                tx.commit().await?;
                return Ok(DeleteOutcome::untracked(allow_list_rows));
            };

            let pull_states_cleared = match target.tag_name() {
                Some(tag) => {
                    sqlx::query(
                        r#"
                        UPDATE image_pulls SET is_pulled = 0
                        WHERE tag_id IN (SELECT id FROM tags WHERE repository_id = ? AND tag = ?)
                        "#,
                    )
                    .bind(repo_id)
                    .bind(tag)
                    .execute(&mut *tx)
                    .await?
                }
                None => {
                    sqlx::query(
                        r#"
                        UPDATE image_pulls SET is_pulled = 0
                        WHERE tag_id IN (SELECT id FROM tags WHERE repository_id = ?)
                        "#,
                    )
                    .bind(repo_id)
                    .execute(&mut *tx)
                    .await?
                }
            }
            .rows_affected();

            tx.commit().await?;

            Ok(DeleteOutcome {
                repo_id: Some(repo_id),
                allow_list_rows,
                pull_states_cleared,
            })
        }

        async fn get_pull_state(&self, tag_id: i64) -> MetadataResult<Option<PullStateRow>> {
            let row = sqlx::query_as::<_, PullStateRow>(
                "SELECT tag_id, is_pulled, last_pulled_at FROM image_pulls WHERE tag_id = ?",
            )
            .bind(tag_id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }
    }

    #[async_trait]
    impl AllowedImageRepo for SqliteStore {
        async fn create_allowed_image(&self, name: &str, tag: &str) -> MetadataResult<i64> {
            let id: i64 = sqlx::query_scalar(
                "INSERT INTO allowed_images (name, tag) VALUES (?, ?) RETURNING id",
            )
            .bind(name)
            .bind(tag)
            .fetch_one(&self.pool)
            .await?;
            Ok(id)
        }

        async fn get_allowed_image(
            &self,
            name: &str,
            tag: &str,
        ) -> MetadataResult<Option<AllowedImageRow>> {
            let row = sqlx::query_as::<_, AllowedImageRow>(
                r#"
                SELECT id, name, tag, tag_id, raw_name, raw_tag,
                       deleted_at, harbor_deleted, harbor_deleted_at
                FROM allowed_images WHERE name = ? AND tag = ?
                ORDER BY id LIMIT 1
                "#,
            )
            .bind(name)
            .bind(tag)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn list_allowed_images(&self, name: &str) -> MetadataResult<Vec<AllowedImageRow>> {
            let rows = sqlx::query_as::<_, AllowedImageRow>(
                r#"
                SELECT id, name, tag, tag_id, raw_name, raw_tag,
                       deleted_at, harbor_deleted, harbor_deleted_at
                FROM allowed_images WHERE name = ?
                ORDER BY tag, id
                "#,
            )
            .bind(name)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }
    }
}

/// SQL schema for SQLite.
const SCHEMA_SQL: &str = r#"
-- Registry identities
CREATE TABLE IF NOT EXISTS repos (
    id INTEGER PRIMARY KEY,
    full_name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS tags (
    id INTEGER PRIMARY KEY,
    repository_id INTEGER NOT NULL REFERENCES repos(id),
    tag TEXT NOT NULL,
    UNIQUE (repository_id, tag)
);

-- One pull-state row per tag
CREATE TABLE IF NOT EXISTS image_pulls (
    id INTEGER PRIMARY KEY,
    tag_id INTEGER NOT NULL UNIQUE REFERENCES tags(id),
    is_pulled INTEGER NOT NULL DEFAULT 0,
    last_pulled_at TEXT
);

-- Allow-list, populated outside this service
CREATE TABLE IF NOT EXISTS allowed_images (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    tag TEXT NOT NULL,
    tag_id INTEGER REFERENCES tags(id),
    raw_name TEXT,
    raw_tag TEXT,
    deleted_at TEXT,
    harbor_deleted INTEGER NOT NULL DEFAULT 0,
    harbor_deleted_at TEXT
);
CREATE INDEX IF NOT EXISTS idx_allowed_images_name_tag ON allowed_images(name, tag);
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use regsync_core::{DeleteTarget, ImageRef};
    use time::OffsetDateTime;

    async fn open() -> (tempfile::TempDir, SqliteStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::new(dir.path().join("meta.db")).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_migrate_is_idempotent() {
        let (_dir, store) = open().await;
        store.migrate().await.unwrap();
        store.migrate().await.unwrap();
        store.health_check().await.unwrap();
    }

    #[tokio::test]
    async fn test_resolve_returns_same_ids() {
        let (_dir, store) = open().await;
        let repo = store.resolve_repo("org/app").await.unwrap();
        assert_eq!(store.resolve_repo("org/app").await.unwrap(), repo);

        let tag = store.resolve_tag(repo, "v1").await.unwrap();
        assert_eq!(store.resolve_tag(repo, "v1").await.unwrap(), tag);
        assert_ne!(store.resolve_tag(repo, "v2").await.unwrap(), tag);
    }

    #[tokio::test]
    async fn test_mark_pulled_then_deleted() {
        let (_dir, store) = open().await;
        let image = ImageRef::new("org/app", "v1").unwrap();
        let at = OffsetDateTime::now_utc();

        let pulled = store.mark_pulled(&image, at).await.unwrap();
        assert_eq!(pulled.allow_list_rows, 0);
        let state = store.get_pull_state(pulled.tag_id).await.unwrap().unwrap();
        assert!(state.is_pulled);
        assert!(state.last_pulled_at.is_some());

        let deleted = store
            .mark_deleted(&DeleteTarget::from(image), at)
            .await
            .unwrap();
        assert_eq!(deleted.repo_id, Some(pulled.repo_id));
        assert_eq!(deleted.pull_states_cleared, 1);
        let state = store.get_pull_state(pulled.tag_id).await.unwrap().unwrap();
        assert!(!state.is_pulled);
    }

    #[tokio::test]
    async fn test_delete_untracked_repository_creates_nothing() {
        let (_dir, store) = open().await;
        let target = DeleteTarget::repository_wide("ghost").unwrap();
        let outcome = store
            .mark_deleted(&target, OffsetDateTime::now_utc())
            .await
            .unwrap();
        assert_eq!(outcome.repo_id, None);
        assert!(store.find_repo("ghost").await.unwrap().is_none());
    }
}
