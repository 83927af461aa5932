//! MySQL note store (tags as JSON-encoded TEXT)

use async_trait::async_trait;
use devdash_core::models::tags::{decode_json, encode_json};
use devdash_core::models::{NewNote, Note, NoteFilter, NotePatch, Paginated, Pagination};
use sqlx::mysql::MySqlRow;
use sqlx::{MySql, MySqlPool, QueryBuilder, Row};

use super::{NoteList, NoteStore};
use crate::db::{like_pattern, DbError};

const NOTE_SELECT: &str = r#"
    SELECT n.id, n.title, n.content, n.tags, n.is_public, n.user_id,
           u.username AS author_username, n.created_at, n.updated_at
    FROM notes n
    LEFT JOIN users u ON u.id = n.user_id
"#;

pub struct MySqlNoteStore {
    pool: MySqlPool,
}

impl MySqlNoteStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    async fn fetch(&self, filter: &NoteFilter, limit: i64, offset: i64) -> Result<Vec<Note>, DbError> {
        let mut select = QueryBuilder::<MySql>::new(NOTE_SELECT);
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
impl NoteStore for MySqlNoteStore {
    fn backend(&self) -> &'static str {
        "mysql"
    }

    async fn list(&self, filter: &NoteFilter, page: Pagination) -> Result<NoteList, DbError> {
        let mut count = QueryBuilder::<MySql>::new("SELECT COUNT(*) FROM notes n WHERE 1=1");
        push_filters(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let items = self.fetch(filter, page.limit() as i64, page.offset() as i64).await?;
        Ok(Paginated::new(items, total, page).into())
    }

    async fn head(&self, filter: &NoteFilter, take: u64) -> Result<Vec<Note>, DbError> {
        self.fetch(filter, take as i64, 0).await
    }

    async fn ids(&self, filter: &NoteFilter) -> Result<Vec<String>, DbError> {
        let mut query = QueryBuilder::<MySql>::new("SELECT n.id FROM notes n WHERE 1=1");
        push_filters(&mut query, filter);
        Ok(query.build_query_scalar().fetch_all(&self.pool).await?)
    }

    async fn get(&self, id: &str) -> Result<Note, DbError> {
        let row = sqlx::query(&format!("{} WHERE n.id = ?", NOTE_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("note", id))?;

        Ok(note_from_row(&row)?)
    }

    async fn create(&self, note: NewNote) -> Result<Note, DbError> {
        sqlx::query(
            r#"
            INSERT INTO notes (id, title, content, tags, is_public, user_id)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(note.id.as_str())
        .bind(&note.title)
        .bind(&note.content)
        .bind(note.tags.to_json_text())
        .bind(note.is_public)
        .bind(note.user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| DbError::from_write(e, &format!("note '{}'", note.id.as_str()), "user_id"))?;

        self.get(note.id.as_str()).await
    }

    async fn update(&self, id: &str, patch: &NotePatch) -> Result<Note, DbError> {
        sqlx::query(
            r#"
            UPDATE notes SET
                title = COALESCE(?, title),
                content = COALESCE(?, content),
                tags = COALESCE(?, tags),
                is_public = COALESCE(?, is_public),
                updated_at = CURRENT_TIMESTAMP(3)
            WHERE id = ?
            "#,
        )
        .bind(&patch.title)
        .bind(&patch.content)
        .bind(patch.tags.as_ref().map(|t| encode_json(t.as_slice())))
        .bind(patch.is_public)
        .bind(id)
        .execute(&self.pool)
        .await?;

        // affected-row counts are unreliable for no-op updates in MySQL
        self.get(id).await
    }

    async fn delete(&self, id: &str) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM notes WHERE id = ?")
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

fn push_filters(query: &mut QueryBuilder<'_, MySql>, filter: &NoteFilter) {
    if let Some(user_id) = filter.user_id {
        query.push(" AND n.user_id = ").push_bind(user_id);
    }
    if let Some(is_public) = filter.is_public {
        query.push(" AND n.is_public = ").push_bind(is_public);
    }
    if let Some(ref tag) = filter.tag {
        // malformed tag text must not abort the whole query
        query
            .push(" AND (CASE WHEN JSON_VALID(n.tags) THEN JSON_CONTAINS(n.tags, JSON_QUOTE(")
            .push_bind(tag.clone())
            .push(")) ELSE 0 END) = 1");
    }
    if let Some(ref search) = filter.search {
        let pattern = like_pattern(search);
        query
            .push(" AND (n.title LIKE ")
            .push_bind(pattern.clone())
            .push(" OR n.content LIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

fn note_from_row(r: &MySqlRow) -> Result<Note, sqlx::Error> {
    let tags: Option<String> = r.try_get("tags")?;
    Ok(Note {
        id: r.try_get("id")?,
        title: r.try_get("title")?,
        content: r.try_get("content")?,
        tags: decode_json(tags.as_deref()),
        is_public: r.try_get("is_public")?,
        user_id: r.try_get("user_id")?,
        author_username: r.try_get("author_username")?,
        created_at: r.try_get("created_at")?,
        updated_at: r.try_get("updated_at")?,
        source: None,
    })
}
