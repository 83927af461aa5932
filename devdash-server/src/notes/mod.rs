//! Note storage behind one async trait
//!
//! The notes API is served by a single route set; which database backs it
//! is decided at startup by `server.notes_backend`:
//!
//! | backend    | store                                   |
//! |------------|-----------------------------------------|
//! | `postgres` | [`PgNoteStore`] (native `TEXT[]` tags)   |
//! | `mysql`    | [`MySqlNoteStore`] (JSON text tags)     |
//! | `dual`     | [`DualNoteStore`] over both             |
//! | `fallback` | [`FallbackNoteStore`] over both         |
//! | `memory`   | [`MemoryNoteStore`]                     |

mod dual;
mod fallback;
mod memory;
mod mysql;
mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use devdash_core::models::{NewNote, Note, NoteFilter, NotePatch, Paginated, Pagination};
use devdash_core::NotesBackend;
use serde::Serialize;
use sqlx::{MySqlPool, PgPool};

use crate::db::DbError;

pub use dual::DualNoteStore;
pub use fallback::FallbackNoteStore;
pub use memory::MemoryNoteStore;
pub use mysql::MySqlNoteStore;
pub use postgres::PgNoteStore;

/// Per-database row counts in a dual-mode listing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SourceCounts {
    pub postgresql: usize,
    pub mysql: usize,
}

/// A page of notes, plus source counts when more than one database answered
#[derive(Debug, Clone)]
pub struct NoteList {
    pub page: Paginated<Note>,
    pub sources: Option<SourceCounts>,
}

impl From<Paginated<Note>> for NoteList {
    fn from(page: Paginated<Note>) -> Self {
        Self { page, sources: None }
    }
}

/// Storage operations for notes.
///
/// `get`, `update` return [`DbError::NotFound`] for unknown ids; `delete`
/// reports whether a row was removed.
#[async_trait]
pub trait NoteStore: Send + Sync {
    /// Backend name for logs and health output
    fn backend(&self) -> &'static str;

    async fn list(&self, filter: &NoteFilter, page: Pagination) -> Result<NoteList, DbError>;

    /// The first `take` matching notes in listing order, newest first.
    async fn head(&self, filter: &NoteFilter, take: u64) -> Result<Vec<Note>, DbError>;

    /// Ids of every matching note.
    async fn ids(&self, filter: &NoteFilter) -> Result<Vec<String>, DbError>;

    async fn get(&self, id: &str) -> Result<Note, DbError>;

    async fn create(&self, note: NewNote) -> Result<Note, DbError>;

    async fn update(&self, id: &str, patch: &NotePatch) -> Result<Note, DbError>;

    async fn delete(&self, id: &str) -> Result<bool, DbError>;

    async fn ping(&self) -> Result<(), DbError>;
}

/// Build the configured store from whichever pools exist.
pub fn build_store(
    backend: NotesBackend,
    postgres: Option<&PgPool>,
    mysql: Option<&MySqlPool>,
) -> Result<Arc<dyn NoteStore>, DbError> {
    let pg = || {
        postgres
            .cloned()
            .map(PgNoteStore::new)
            .ok_or(DbError::Unavailable("postgresql"))
    };
    let my = || {
        mysql
            .cloned()
            .map(MySqlNoteStore::new)
            .ok_or(DbError::Unavailable("mysql"))
    };

    let store: Arc<dyn NoteStore> = match backend {
        NotesBackend::Postgres => Arc::new(pg()?),
        NotesBackend::Mysql => Arc::new(my()?),
        NotesBackend::Dual => Arc::new(DualNoteStore::new(Arc::new(pg()?), Arc::new(my()?))),
        NotesBackend::Fallback => Arc::new(FallbackNoteStore::new(Arc::new(pg()?), Arc::new(my()?))),
        NotesBackend::Memory => Arc::new(MemoryNoteStore::new()),
    };
    tracing::info!(backend = store.backend(), "notes store ready");
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sql_backends_need_their_pool() {
        let err = build_store(NotesBackend::Postgres, None, None).err().unwrap();
        assert!(matches!(err, DbError::Unavailable("postgresql")));

        let err = build_store(NotesBackend::Dual, None, None).err().unwrap();
        assert!(matches!(err, DbError::Unavailable(_)));
    }

    #[test]
    fn memory_backend_needs_nothing() {
        let store = build_store(NotesBackend::Memory, None, None).unwrap();
        assert_eq!(store.backend(), "memory");
    }
}
