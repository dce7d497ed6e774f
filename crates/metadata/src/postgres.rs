//! PostgreSQL-based metadata store implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::models::*;
use crate::repos::{AllowedImageRepo, ImageStateRepo, RegistryRepo};
use crate::store::MetadataStore;
use async_trait::async_trait;
use regsync_core::config::PgSslMode;
use regsync_core::{DeleteTarget, ImageRef};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode as SqlxPgSslMode};
use sqlx::{PgConnection, Pool, Postgres};
use std::str::FromStr;
use time::OffsetDateTime;

/// PostgreSQL schema (embedded).
const POSTGRES_SCHEMA: &str = include_str!("postgres_schema.sql");

fn postgres_schema_statements(schema: &str) -> Vec<&str> {
    schema
        .split(';')
        .filter_map(|statement| {
            let trimmed = statement.trim();
            if trimmed.is_empty() {
                return None;
            }
            let has_sql = trimmed.lines().any(|line| {
                let line = line.trim();
                !line.is_empty() && !line.starts_with("--")
            });
            has_sql.then_some(trimmed)
        })
        .collect()
}

/// PostgreSQL-based metadata store.
pub struct PostgresStore {
    pool: Pool<Postgres>,
}

impl PostgresStore {
    /// Create a new PostgreSQL store from a connection URL.
    pub async fn from_url(
        url: &str,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        let opts = PgConnectOptions::from_str(url)?;
        Self::connect(opts, max_connections, statement_timeout_ms).await
    }

    /// Create a new PostgreSQL store from individual connection parameters.
    #[allow(clippy::too_many_arguments)]
    pub async fn from_params(
        host: &str,
        port: u16,
        username: Option<&str>,
        password: Option<&str>,
        database: &str,
        ssl_mode: Option<PgSslMode>,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        let mut opts = PgConnectOptions::new()
            .host(host)
            .port(port)
            .database(database);

        if let Some(user) = username {
            opts = opts.username(user);
        }

        if let Some(pass) = password {
            opts = opts.password(pass);
        }

        if let Some(mode) = ssl_mode {
            let sqlx_mode = match mode {
                PgSslMode::Disable => SqlxPgSslMode::Disable,
                PgSslMode::Prefer => SqlxPgSslMode::Prefer,
                PgSslMode::Require => SqlxPgSslMode::Require,
            };
            opts = opts.ssl_mode(sqlx_mode);
        }

        // Never log the password.
        tracing::info!(
            host = host,
            port = port,
            database = database,
            username = username.unwrap_or("<none>"),
            ssl_mode = ?ssl_mode,
            "Connecting to PostgreSQL with individual parameters"
        );

        Self::connect(opts, max_connections, statement_timeout_ms).await
    }

    async fn connect(
        mut opts: PgConnectOptions,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        if let Some(timeout_ms) = statement_timeout_ms {
            opts = opts.options([("statement_timeout", format!("{timeout_ms}ms"))]);
            tracing::info!("PostgreSQL statement_timeout set to {}ms", timeout_ms);
        }

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for PostgresStore {
    async fn migrate(&self) -> MetadataResult<()> {
        // Prepared statements take one command each.
        for statement in postgres_schema_statements(POSTGRES_SCHEMA) {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// ON CONFLICT DO NOTHING waits for a concurrent inserter of the same key, so
// the reselect sees its committed row under READ COMMITTED.
async fn resolve_repo_on(conn: &mut PgConnection, full_name: &str) -> MetadataResult<i64> {
    let existing: Option<i64> = sqlx::query_scalar("SELECT id FROM repos WHERE full_name = $1")
        .bind(full_name)
        .fetch_optional(&mut *conn)
        .await?;
    if let Some(id) = existing {
        return Ok(id);
    }

    let inserted: Option<i64> = sqlx::query_scalar(
        "INSERT INTO repos (full_name) VALUES ($1) ON CONFLICT (full_name) DO NOTHING RETURNING id",
    )
    .bind(full_name)
    .fetch_optional(&mut *conn)
    .await?;
    if let Some(id) = inserted {
        tracing::debug!(repository = full_name, repo_id = id, "Created repository");
        return Ok(id);
    }

    sqlx::query_scalar::<_, i64>("SELECT id FROM repos WHERE full_name = $1")
        .bind(full_name)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| {
            MetadataError::Resolution(format!("repository '{full_name}' missing after insert"))
        })
}

async fn resolve_tag_on(
    conn: &mut PgConnection,
    repository_id: i64,
    tag: &str,
) -> MetadataResult<i64> {
    let existing: Option<i64> =
        sqlx::query_scalar("SELECT id FROM tags WHERE repository_id = $1 AND tag = $2")
            .bind(repository_id)
            .bind(tag)
            .fetch_optional(&mut *conn)
            .await?;
    if let Some(id) = existing {
        return Ok(id);
    }

    let inserted: Option<i64> = sqlx::query_scalar(
        r#"
        INSERT INTO tags (repository_id, tag) VALUES ($1, $2)
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

    sqlx::query_scalar::<_, i64>("SELECT id FROM tags WHERE repository_id = $1 AND tag = $2")
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

#[async_trait]
impl RegistryRepo for PostgresStore {
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
            "SELECT id, full_name FROM repos WHERE full_name = $1",
        )
        .bind(full_name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_tag(&self, repository_id: i64, tag: &str) -> MetadataResult<Option<TagRow>> {
        let row = sqlx::query_as::<_, TagRow>(
            "SELECT id, repository_id, tag FROM tags WHERE repository_id = $1 AND tag = $2",
        )
        .bind(repository_id)
        .bind(tag)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_tags(&self, repository_id: i64) -> MetadataResult<Vec<TagRow>> {
        let rows = sqlx::query_as::<_, TagRow>(
            "SELECT id, repository_id, tag FROM tags WHERE repository_id = $1 ORDER BY tag",
        )
        .bind(repository_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[async_trait]
impl ImageStateRepo for PostgresStore {
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
            VALUES ($1, TRUE, $2)
            ON CONFLICT (tag_id) DO UPDATE SET
                is_pulled = EXCLUDED.is_pulled,
                last_pulled_at = EXCLUDED.last_pulled_at
            "#,
        )
        .bind(tag_id)
        .bind(at)
        .execute(&mut *tx)
        .await?;

        let allow_list_rows = sqlx::query(
            r#"
            UPDATE allowed_images SET tag_id = $1, raw_name = $2, raw_tag = $3
            WHERE name = $2 AND tag = $3
            "#,
        )
        .bind(tag_id)
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
                    SET deleted_at = $1, harbor_deleted = TRUE, harbor_deleted_at = $1
                    WHERE name = $2 AND tag = $3
                    "#,
                )
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
                    SET deleted_at = $1, harbor_deleted = TRUE, harbor_deleted_at = $1
                    WHERE name = $2
                    "#,
                )
                .bind(at)
                .bind(target.repository())
                .execute(&mut *tx)
                .await?
            }
        }
        .rows_affected();

        let repo_id: Option<i64> = sqlx::query_scalar("SELECT id FROM repos WHERE full_name = $1")
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
                    UPDATE image_pulls SET is_pulled = FALSE
                    WHERE tag_id IN (SELECT id FROM tags WHERE repository_id = $1 AND tag = $2)
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
                    UPDATE image_pulls SET is_pulled = FALSE
                    WHERE tag_id IN (SELECT id FROM tags WHERE repository_id = $1)
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
            "SELECT tag_id, is_pulled, last_pulled_at FROM image_pulls WHERE tag_id = $1",
        )
        .bind(tag_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }
}

#[async_trait]
impl AllowedImageRepo for PostgresStore {
    async fn create_allowed_image(&self, name: &str, tag: &str) -> MetadataResult<i64> {
        let id: i64 =
            sqlx::query_scalar("INSERT INTO allowed_images (name, tag) VALUES ($1, $2) RETURNING id")
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
            FROM allowed_images WHERE name = $1 AND tag = $2
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
            FROM allowed_images WHERE name = $1
            ORDER BY tag, id
            "#,
        )
        .bind(name)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
