//! User repository (MySQL) and its PostgreSQL mirror
//!
//! Users are soft-deleted: DELETE stamps `deleted_at`, reads skip those rows
//! unless asked, and restore clears the stamp. PostgreSQL keeps a slim copy
//! of the live users (id, username, email) for the notes author join.

use chrono::{DateTime, Utc};
use devdash_core::models::{NewUser, Paginated, Pagination, User, UserFilter, UserPatch};
use sqlx::mysql::MySqlRow;
use sqlx::{MySql, MySqlPool, PgPool, QueryBuilder, Row};

use super::DbError;
use crate::db::{like_pattern, parse_column};

const USER_COLUMNS: &str = "id, username, email, first_name, last_name, status, is_active, \
                            created_at, updated_at, deleted_at";

/// User repository
pub struct UserRepo<'a> {
    pool: &'a MySqlPool,
}

impl<'a> UserRepo<'a> {
    pub fn new(pool: &'a MySqlPool) -> Self {
        Self { pool }
    }

    /// List users matching `filter`, newest first.
    pub async fn list(&self, filter: &UserFilter, page: Pagination) -> Result<Paginated<User>, DbError> {
        let mut count = QueryBuilder::<MySql>::new("SELECT COUNT(*) FROM users WHERE 1=1");
        push_filters(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(self.pool).await?;

        let mut select = QueryBuilder::<MySql>::new(format!("SELECT {} FROM users WHERE 1=1", USER_COLUMNS));
        push_filters(&mut select, filter);
        select
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(page.limit() as i64)
            .push(" OFFSET ")
            .push_bind(page.offset() as i64);

        let rows = select.build().fetch_all(self.pool).await?;
        let items = rows.iter().map(user_from_row).collect::<Result<Vec<_>, _>>()?;

        Ok(Paginated::new(items, total, page))
    }

    /// Get a user by id. Soft-deleted users are only visible with `include_deleted`.
    pub async fn get(&self, id: i64, include_deleted: bool) -> Result<User, DbError> {
        let sql = if include_deleted {
            format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS)
        } else {
            format!("SELECT {} FROM users WHERE id = ? AND deleted_at IS NULL", USER_COLUMNS)
        };
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("user", id))?;

        Ok(user_from_row(&row)?)
    }

    /// Insert a user; duplicate username or email becomes a conflict.
    pub async fn create(&self, user: NewUser) -> Result<User, DbError> {
        let result = sqlx::query(
            r#"
            INSERT INTO users (username, email, first_name, last_name, status, is_active)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user.username.as_str())
        .bind(user.email.as_str())
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.status.as_str())
        .bind(user.status.is_active())
        .execute(self.pool)
        .await
        .map_err(|e| DbError::from_write(e, "username or email", "user_id"))?;

        self.get(result.last_insert_id() as i64, false).await
    }

    /// Apply a partial update. An empty patch just returns the current row.
    pub async fn update(&self, id: i64, patch: &UserPatch) -> Result<User, DbError> {
        if patch.is_empty() {
            return self.get(id, false).await;
        }

        let mut query = QueryBuilder::<MySql>::new("UPDATE users SET updated_at = CURRENT_TIMESTAMP(3)");
        if let Some(ref email) = patch.email {
            query.push(", email = ").push_bind(email.as_str().to_owned());
        }
        if let Some(ref first_name) = patch.first_name {
            query.push(", first_name = ").push_bind(first_name.clone());
        }
        if let Some(ref last_name) = patch.last_name {
            query.push(", last_name = ").push_bind(last_name.clone());
        }
        if let Some(status) = patch.status {
            query
                .push(", status = ")
                .push_bind(status.as_str())
                .push(", is_active = ")
                .push_bind(status.is_active());
        }
        query
            .push(" WHERE id = ")
            .push_bind(id)
            .push(" AND deleted_at IS NULL");

        query
            .build()
            .execute(self.pool)
            .await
            .map_err(|e| DbError::from_write(e, "email", "user_id"))?;

        // MySQL reports 0 affected rows for no-op updates, so existence is
        // decided by the re-read.
        self.get(id, false).await
    }

    /// Soft delete.
    pub async fn soft_delete(&self, id: i64) -> Result<(), DbError> {
        let result = sqlx::query(
            "UPDATE users SET deleted_at = CURRENT_TIMESTAMP(3), is_active = 0 \
             WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("user", id));
        }
        tracing::info!(user_id = id, "user soft-deleted");
        Ok(())
    }

    /// Clear `deleted_at` on a soft-deleted user.
    pub async fn restore(&self, id: i64) -> Result<User, DbError> {
        let result = sqlx::query(
            "UPDATE users SET deleted_at = NULL, is_active = (status = 'active'), \
             updated_at = CURRENT_TIMESTAMP(3) WHERE id = ? AND deleted_at IS NOT NULL",
        )
        .bind(id)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("deleted user", id));
        }
        tracing::info!(user_id = id, "user restored");
        self.get(id, false).await
    }

    /// Random sample of live ids, used by the data generator.
    pub async fn sample_ids(&self, limit: i64) -> Result<Vec<i64>, DbError> {
        let ids = sqlx::query_scalar("SELECT id FROM users WHERE deleted_at IS NULL AND is_active = 1 ORDER BY RAND() LIMIT ?")
            .bind(limit)
            .fetch_all(self.pool)
            .await?;
        Ok(ids)
    }
}

/// Live-user copy in PostgreSQL
pub struct UserMirror<'a> {
    pool: &'a PgPool,
}

impl<'a> UserMirror<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert or refresh one user under its MySQL id.
    pub async fn upsert(&self, user: &User) -> Result<(), DbError> {
        self.upsert_parts(user.id, &user.username, &user.email, user.created_at).await
    }

    async fn upsert_parts(&self, id: i64, username: &str, email: &str, created_at: DateTime<Utc>) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, username, email, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE SET username = EXCLUDED.username, email = EXCLUDED.email
            "#,
        )
        .bind(id)
        .bind(username)
        .bind(email)
        .bind(created_at)
        .execute(self.pool)
        .await
        .map_err(|e| DbError::from_write(e, &format!("mirrored user {}", id), "user_id"))?;
        Ok(())
    }

    /// Drop a user from the mirror (soft-deleted in MySQL).
    pub async fn remove(&self, id: i64) -> Result<(), DbError> {
        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Copy every live MySQL user across and drop mirrored rows MySQL no
    /// longer has. Returns the number of users copied.
    pub async fn sync_from(&self, mysql: &MySqlPool) -> Result<usize, DbError> {
        let rows = sqlx::query("SELECT id, username, email, created_at FROM users WHERE deleted_at IS NULL ORDER BY id")
            .fetch_all(mysql)
            .await?;

        let mut ids = Vec::with_capacity(rows.len());
        for row in &rows {
            let id: i64 = row.try_get("id")?;
            let username: String = row.try_get("username")?;
            let email: String = row.try_get("email")?;
            let created_at: DateTime<Utc> = row.try_get("created_at")?;
            self.upsert_parts(id, &username, &email, created_at).await?;
            ids.push(id);
        }

        let stale = sqlx::query("DELETE FROM users WHERE NOT (id = ANY($1))")
            .bind(&ids)
            .execute(self.pool)
            .await?;
        tracing::info!(copied = ids.len(), removed = stale.rows_affected(), "user mirror synced");
        Ok(ids.len())
    }
}

fn push_filters(query: &mut QueryBuilder<'_, MySql>, filter: &UserFilter) {
    if !filter.include_deleted {
        query.push(" AND deleted_at IS NULL");
    }
    if let Some(status) = filter.status {
        query.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(ref search) = filter.search {
        let pattern = like_pattern(search);
        query
            .push(" AND (username LIKE ")
            .push_bind(pattern.clone())
            .push(" OR email LIKE ")
            .push_bind(pattern.clone())
            .push(" OR first_name LIKE ")
            .push_bind(pattern.clone())
            .push(" OR last_name LIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

fn user_from_row(r: &MySqlRow) -> Result<User, sqlx::Error> {
    let status: String = r.try_get("status")?;
    Ok(User {
        id: r.try_get("id")?,
        username: r.try_get("username")?,
        email: r.try_get("email")?,
        first_name: r.try_get("first_name")?,
        last_name: r.try_get("last_name")?,
        status: parse_column(&status, "status")?,
        is_active: r.try_get("is_active")?,
        created_at: r.try_get("created_at")?,
        updated_at: r.try_get("updated_at")?,
        deleted_at: r.try_get("deleted_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use devdash_core::models::{CreateUserRequest, UserStatus};

    #[test]
    fn filters_exclude_deleted_by_default() {
        let mut query = QueryBuilder::<MySql>::new("SELECT COUNT(*) FROM users WHERE 1=1");
        push_filters(&mut query, &UserFilter::default());
        assert!(query.sql().contains("deleted_at IS NULL"));

        let mut query = QueryBuilder::<MySql>::new("SELECT COUNT(*) FROM users WHERE 1=1");
        push_filters(
            &mut query,
            &UserFilter {
                include_deleted: true,
                status: Some(UserStatus::Suspended),
                search: Some("bob".into()),
            },
        );
        let sql = query.sql();
        assert!(!sql.contains("deleted_at"));
        assert!(sql.contains("status = ?"));
        assert_eq!(sql.matches("LIKE ?").count(), 4);
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn soft_delete_and_restore() {
        let url = std::env::var("MYSQL_URL").expect("MYSQL_URL required");
        let pool = MySqlPool::connect(&url).await.unwrap();
        crate::db::migrations::run_mysql(&pool).await.unwrap();
        let repo = UserRepo::new(&pool);

        let suffix = rand::random::<u32>();
        let user = repo
            .create(
                CreateUserRequest {
                    username: format!("user{}", suffix),
                    email: format!("user{}@example.com", suffix),
                    first_name: None,
                    last_name: None,
                    status: None,
                }
                .validate()
                .unwrap(),
            )
            .await
            .unwrap();

        repo.soft_delete(user.id).await.unwrap();
        assert!(repo.get(user.id, false).await.unwrap_err().is_not_found());
        assert!(repo.get(user.id, true).await.unwrap().deleted_at.is_some());

        let restored = repo.restore(user.id).await.unwrap();
        assert!(restored.deleted_at.is_none());
        assert!(restored.is_active);
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn mirrored_user_can_author_notes_in_both_engines() {
        use crate::notes::{MySqlNoteStore, NoteStore, PgNoteStore};
        use devdash_core::models::CreateNoteRequest;

        let mysql = MySqlPool::connect(&std::env::var("MYSQL_URL").expect("MYSQL_URL required"))
            .await
            .unwrap();
        let pg = PgPool::connect(&std::env::var("DATABASE_URL").expect("DATABASE_URL required"))
            .await
            .unwrap();
        crate::db::migrations::run_mysql(&mysql).await.unwrap();
        crate::db::migrations::run_pg(&pg).await.unwrap();

        let suffix = rand::random::<u32>();
        let user = UserRepo::new(&mysql)
            .create(
                CreateUserRequest {
                    username: format!("author{}", suffix),
                    email: format!("author{}@example.com", suffix),
                    first_name: None,
                    last_name: None,
                    status: None,
                }
                .validate()
                .unwrap(),
            )
            .await
            .unwrap();
        UserMirror::new(&pg).upsert(&user).await.unwrap();

        let stores: Vec<Box<dyn NoteStore>> = vec![
            Box::new(PgNoteStore::new(pg.clone())),
            Box::new(MySqlNoteStore::new(mysql.clone())),
        ];
        for store in stores {
            let id = format!("{}-author-{}", store.backend(), suffix);
            let note = CreateNoteRequest {
                id: Some(id.clone()),
                title: "authored".into(),
                content: String::new(),
                tags: None,
                is_public: None,
                user_id: Some(user.id),
            }
            .validate()
            .unwrap();

            let created = store.create(note).await.unwrap();
            assert_eq!(created.author_username.as_deref(), Some(user.username.as_str()));
            assert!(store.delete(&id).await.unwrap());
        }

        UserMirror::new(&pg).remove(user.id).await.unwrap();
    }
}
