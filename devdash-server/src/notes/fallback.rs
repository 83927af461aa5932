//! Primary-then-secondary note store
//!
//! Each operation runs against the primary. If the primary fails with a
//! database error (not a not-found or conflict) the operation is repeated
//! once against the secondary.

use std::sync::Arc;

use async_trait::async_trait;
use devdash_core::models::{NewNote, Note, NoteFilter, NotePatch, Pagination};

use super::{NoteList, NoteStore};
use crate::db::DbError;

pub struct FallbackNoteStore {
    primary: Arc<dyn NoteStore>,
    secondary: Arc<dyn NoteStore>,
}

impl FallbackNoteStore {
    pub fn new(primary: Arc<dyn NoteStore>, secondary: Arc<dyn NoteStore>) -> Self {
        Self { primary, secondary }
    }

    fn should_fall_back(&self, op: &'static str, result: &Result<impl Sized, DbError>) -> bool {
        match result {
            Err(e) if e.is_backend_failure() => {
                tracing::warn!(
                    error = %e,
                    op,
                    primary = self.primary.backend(),
                    secondary = self.secondary.backend(),
                    "notes primary failed, falling back"
                );
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl NoteStore for FallbackNoteStore {
    fn backend(&self) -> &'static str {
        "fallback"
    }

    async fn list(&self, filter: &NoteFilter, page: Pagination) -> Result<NoteList, DbError> {
        let result = self.primary.list(filter, page).await;
        if self.should_fall_back("list", &result) {
            return self.secondary.list(filter, page).await;
        }
        result
    }

    async fn head(&self, filter: &NoteFilter, take: u64) -> Result<Vec<Note>, DbError> {
        let result = self.primary.head(filter, take).await;
        if self.should_fall_back("head", &result) {
            return self.secondary.head(filter, take).await;
        }
        result
    }

    async fn ids(&self, filter: &NoteFilter) -> Result<Vec<String>, DbError> {
        let result = self.primary.ids(filter).await;
        if self.should_fall_back("ids", &result) {
            return self.secondary.ids(filter).await;
        }
        result
    }

    async fn get(&self, id: &str) -> Result<Note, DbError> {
        let result = self.primary.get(id).await;
        if self.should_fall_back("get", &result) {
            return self.secondary.get(id).await;
        }
        result
    }

    async fn create(&self, note: NewNote) -> Result<Note, DbError> {
        let result = self.primary.create(note.clone()).await;
        if self.should_fall_back("create", &result) {
            return self.secondary.create(note).await;
        }
        result
    }

    async fn update(&self, id: &str, patch: &NotePatch) -> Result<Note, DbError> {
        let result = self.primary.update(id, patch).await;
        if self.should_fall_back("update", &result) {
            return self.secondary.update(id, patch).await;
        }
        result
    }

    async fn delete(&self, id: &str) -> Result<bool, DbError> {
        let result = self.primary.delete(id).await;
        if self.should_fall_back("delete", &result) {
            return self.secondary.delete(id).await;
        }
        result
    }

    async fn ping(&self) -> Result<(), DbError> {
        let result = self.primary.ping().await;
        if self.should_fall_back("ping", &result) {
            return self.secondary.ping().await;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notes::MemoryNoteStore;
    use devdash_core::models::CreateNoteRequest;

    /// Store whose database is always down
    struct DownStore;

    #[async_trait]
    impl NoteStore for DownStore {
        fn backend(&self) -> &'static str {
            "down"
        }
        async fn list(&self, _: &NoteFilter, _: Pagination) -> Result<NoteList, DbError> {
            Err(sqlx::Error::PoolTimedOut.into())
        }
        async fn head(&self, _: &NoteFilter, _: u64) -> Result<Vec<Note>, DbError> {
            Err(sqlx::Error::PoolTimedOut.into())
        }
        async fn ids(&self, _: &NoteFilter) -> Result<Vec<String>, DbError> {
            Err(sqlx::Error::PoolTimedOut.into())
        }
        async fn get(&self, _: &str) -> Result<Note, DbError> {
            Err(sqlx::Error::PoolTimedOut.into())
        }
        async fn create(&self, _: NewNote) -> Result<Note, DbError> {
            Err(sqlx::Error::PoolTimedOut.into())
        }
        async fn update(&self, _: &str, _: &NotePatch) -> Result<Note, DbError> {
            Err(sqlx::Error::PoolTimedOut.into())
        }
        async fn delete(&self, _: &str) -> Result<bool, DbError> {
            Err(sqlx::Error::PoolTimedOut.into())
        }
        async fn ping(&self) -> Result<(), DbError> {
            Err(sqlx::Error::PoolTimedOut.into())
        }
    }

    fn new_note(id: &str) -> NewNote {
        CreateNoteRequest {
            id: Some(id.into()),
            title: id.into(),
            content: String::new(),
            tags: None,
            is_public: None,
            user_id: None,
        }
        .validate()
        .unwrap()
    }

    #[tokio::test]
    async fn database_errors_fall_back() {
        let secondary = Arc::new(MemoryNoteStore::new());
        let store = FallbackNoteStore::new(Arc::new(DownStore), secondary.clone());

        store.create(new_note("a")).await.unwrap();
        assert!(secondary.get("a").await.is_ok());
        assert_eq!(store.get("a").await.unwrap().id, "a");
        assert!(store.ping().await.is_ok());
    }

    #[tokio::test]
    async fn not_found_does_not_fall_back() {
        let primary = Arc::new(MemoryNoteStore::new());
        let secondary = Arc::new(MemoryNoteStore::new());
        secondary.create(new_note("only-in-secondary")).await.unwrap();

        let store = FallbackNoteStore::new(primary, secondary);
        assert!(store.get("only-in-secondary").await.unwrap_err().is_not_found());
    }
}
