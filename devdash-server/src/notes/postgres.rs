//! PostgreSQL note store (tags as native `TEXT[]`)

use async_trait::async_trait;
use devdash_core::models::{NewNote, Note, NoteFilter, NotePatch, Paginated, Pagination};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};

use super::{NoteList, NoteStore};
use crate::db::{like_pattern, DbError};

const NOTE_SELECT: &str = r#"
    SELECT n.id, n.title, n.content, n.tags, n.is_public, n.user_id,
           u.username AS author_username, n.created_at, n.updated_at
    FROM notes n
    LEFT JOIN users u ON u.id = n.user_id
"#;

pub struct PgNoteStore {
    pool: PgPool,
}

impl PgNoteStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch(&self, filter: &NoteFilter, limit: i64, offset: i64) -> Result<Vec<Note>, DbError> {
        let mut select = QueryBuilder::<Postgres>::new(NOTE_SELECT);
        select.push(" WHERE 1=1");
        push_filters(&mut select, filter);
        select
            .push(" ORDER BY n.created_at DESC, n.id LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let rows = select.build().fetch_all(&self.pool).await?;
        Ok(rows.iter().map(note_from_row).collect::<Result<Vec<_>, _>>()?)
    }
}

#[async_trait]
impl NoteStore for PgNoteStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn list(&self, filter: &NoteFilter, page: Pagination) -> Result<NoteList, DbError> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM notes n WHERE 1=1");
        push_filters(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let items = self.fetch(filter, page.limit() as i64, page.offset() as i64).await?;
        Ok(Paginated::new(items, total, page).into())
    }

    async fn head(&self, filter: &NoteFilter, take: u64) -> Result<Vec<Note>, DbError> {
        self.fetch(filter, take as i64, 0).await
    }

    async fn ids(&self, filter: &NoteFilter) -> Result<Vec<String>, DbError> {
        let mut query = QueryBuilder::<Postgres>::new("SELECT n.id FROM notes n WHERE 1=1");
        push_filters(&mut query, filter);
        Ok(query.build_query_scalar().fetch_all(&self.pool).await?)
    }

    async fn get(&self, id: &str) -> Result<Note, DbError> {
        let row = sqlx::query(&format!("{} WHERE n.id = $1", NOTE_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("note", id))?;

        Ok(note_from_row(&row)?)
    }

    async fn create(&self, note: NewNote) -> Result<Note, DbError> {
        // CTE insert + JOIN so the author comes back in the same round trip
        let row = sqlx::query(
            r#"
            WITH inserted AS (
                INSERT INTO notes (id, title, content, tags, is_public, user_id)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING *
            )
            SELECT n.id, n.title, n.content, n.tags, n.is_public, n.user_id,
                   u.username AS author_username, n.created_at, n.updated_at
            FROM inserted n
            LEFT JOIN users u ON u.id = n.user_id
            "#,
        )
        .bind(note.id.as_str())
        .bind(&note.title)
        .bind(&note.content)
        .bind(note.tags.as_slice())
        .bind(note.is_public)
        .bind(note.user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DbError::from_write(e, &format!("note '{}'", note.id.as_str()), "user_id"))?;

        Ok(note_from_row(&row)?)
    }

    async fn update(&self, id: &str, patch: &NotePatch) -> Result<Note, DbError> {
        let result = sqlx::query(
            r#"
            UPDATE notes SET
                title = COALESCE($2, title),
                content = COALESCE($3, content),
                tags = COALESCE($4, tags),
                is_public = COALESCE($5, is_public),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&patch.title)
        .bind(&patch.content)
        .bind(patch.tags.as_ref().map(|t| t.as_slice()))
        .bind(patch.is_public)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("note", id));
        }
        self.get(id).await
    }

    async fn delete(&self, id: &str) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM notes WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn ping(&self) -> Result<(), DbError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

fn push_filters(query: &mut QueryBuilder<'_, Postgres>, filter: &NoteFilter) {
    if let Some(user_id) = filter.user_id {
        query.push(" AND n.user_id = ").push_bind(user_id);
    }
    if let Some(is_public) = filter.is_public {
        query.push(" AND n.is_public = ").push_bind(is_public);
    }
    if let Some(ref tag) = filter.tag {
        query.push(" AND ").push_bind(tag.clone()).push(" = ANY(n.tags)");
    }
    if let Some(ref search) = filter.search {
        let pattern = like_pattern(search);
        query
            .push(" AND (n.title ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR n.content ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

fn note_from_row(r: &PgRow) -> Result<Note, sqlx::Error> {
    Ok(Note {
        id: r.try_get("id")?,
        title: r.try_get("title")?,
        content: r.try_get("content")?,
        tags: r.try_get("tags")?,
        is_public: r.try_get("is_public")?,
        user_id: r.try_get("user_id")?,
        author_username: r.try_get("author_username")?,
        created_at: r.try_get("created_at")?,
        updated_at: r.try_get("updated_at")?,
        source: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use devdash_core::models::CreateNoteRequest;

    #[test]
    fn tag_filter_uses_array_membership() {
        let mut query = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM notes n WHERE 1=1");
        push_filters(
            &mut query,
            &NoteFilter {
                tag: Some("ops".into()),
                search: Some("deploy".into()),
                ..Default::default()
            },
        );
        let sql = query.sql();
        assert!(sql.contains("$1 = ANY(n.tags)"));
        assert!(sql.contains("n.title ILIKE $2"));
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn tags_round_trip_in_order() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = PgPool::connect(&url).await.unwrap();
        crate::db::migrations::run_pg(&pool).await.unwrap();
        let store = PgNoteStore::new(pool);

        let id = format!("pg-test-{}", rand::random::<u32>());
        let note = CreateNoteRequest {
            id: Some(id.clone()),
            title: "order".into(),
            content: String::new(),
            tags: Some(vec!["z".into(), "a".into(), "m".into()]),
            is_public: None,
            user_id: None,
        }
        .validate()
        .unwrap();

        store.create(note).await.unwrap();
        assert_eq!(store.get(&id).await.unwrap().tags, vec!["z", "a", "m"]);
        assert!(store.delete(&id).await.unwrap());
        assert!(!store.delete(&id).await.unwrap());
    }
}
