//! Dual-write note store
//!
//! Writes go to the primary and are mirrored to the secondary on a best
//! effort basis. Reads query both databases concurrently, wait for both
//! answers, and merge them by id with the primary winning. Every returned
//! note is tagged with the database that served it.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use devdash_core::models::{NewNote, Note, NoteFilter, NotePatch, Paginated, Pagination};
use devdash_core::DbKind;

use super::{NoteList, NoteStore, SourceCounts};
use crate::db::DbError;

pub struct DualNoteStore {
    primary: Arc<dyn NoteStore>,
    secondary: Arc<dyn NoteStore>,
}

impl DualNoteStore {
    /// `primary` is PostgreSQL, `secondary` is MySQL.
    pub fn new(primary: Arc<dyn NoteStore>, secondary: Arc<dyn NoteStore>) -> Self {
        Self { primary, secondary }
    }
}

fn tagged(mut note: Note, source: DbKind) -> Note {
    note.source = Some(source);
    note
}

/// Union of two listings by id, primary first, newest first.
fn merge_notes(primary: Vec<Note>, secondary: Vec<Note>) -> Vec<Note> {
    let mut seen = HashSet::new();
    let mut merged: Vec<Note> = primary
        .into_iter()
        .map(|n| tagged(n, DbKind::Postgresql))
        .chain(secondary.into_iter().map(|n| tagged(n, DbKind::Mysql)))
        .filter(|n| seen.insert(n.id.clone()))
        .collect();

    merged.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
    merged
}

fn source_counts(notes: &[Note]) -> SourceCounts {
    let mut counts = SourceCounts::default();
    for note in notes {
        match note.source {
            Some(DbKind::Postgresql) => counts.postgresql += 1,
            Some(DbKind::Mysql) => counts.mysql += 1,
            None => {}
        }
    }
    counts
}

/// Leading notes plus every matching id from one store.
async fn window(store: &dyn NoteStore, filter: &NoteFilter, take: u64) -> Result<(Vec<Note>, Vec<String>), DbError> {
    let (head, ids) = tokio::join!(store.head(filter, take), store.ids(filter));
    Ok((head?, ids?))
}

#[async_trait]
impl NoteStore for DualNoteStore {
    fn backend(&self) -> &'static str {
        "dual"
    }

    async fn list(&self, filter: &NoteFilter, page: Pagination) -> Result<NoteList, DbError> {
        // The union's first `offset + limit` rows are drawn from at most that
        // many rows of each store.
        let offset = page.offset();
        let take = offset + page.limit() as u64;
        let (primary, secondary) = tokio::join!(
            window(self.primary.as_ref(), filter, take),
            window(self.secondary.as_ref(), filter, take)
        );

        let (primary, secondary) = match (primary, secondary) {
            (Ok(p), Ok(s)) => (p, s),
            (Ok(p), Err(e)) => {
                tracing::warn!(error = %e, "dual notes: secondary list failed");
                (p, Default::default())
            }
            (Err(e), Ok(s)) => {
                tracing::warn!(error = %e, "dual notes: primary list failed");
                (Default::default(), s)
            }
            (Err(e), Err(_)) => return Err(e),
        };

        let total = primary.1.iter().chain(&secondary.1).collect::<HashSet<_>>().len() as i64;
        let items: Vec<Note> = merge_notes(primary.0, secondary.0)
            .into_iter()
            .skip(offset as usize)
            .take(page.limit() as usize)
            .collect();
        let counts = source_counts(&items);

        Ok(NoteList {
            page: Paginated::new(items, total, page),
            sources: Some(counts),
        })
    }

    async fn head(&self, filter: &NoteFilter, take: u64) -> Result<Vec<Note>, DbError> {
        let (primary, secondary) = tokio::join!(self.primary.head(filter, take), self.secondary.head(filter, take));
        let (primary, secondary) = match (primary, secondary) {
            (Ok(p), Ok(s)) => (p, s),
            (Ok(p), Err(_)) => (p, Vec::new()),
            (Err(_), Ok(s)) => (Vec::new(), s),
            (Err(e), Err(_)) => return Err(e),
        };
        let mut merged = merge_notes(primary, secondary);
        merged.truncate(take as usize);
        Ok(merged)
    }

    async fn ids(&self, filter: &NoteFilter) -> Result<Vec<String>, DbError> {
        let (primary, secondary) = tokio::join!(self.primary.ids(filter), self.secondary.ids(filter));
        let (primary, secondary) = match (primary, secondary) {
            (Ok(p), Ok(s)) => (p, s),
            (Ok(p), Err(_)) => (p, Vec::new()),
            (Err(_), Ok(s)) => (Vec::new(), s),
            (Err(e), Err(_)) => return Err(e),
        };
        let mut seen = HashSet::new();
        Ok(primary.into_iter().chain(secondary).filter(|id| seen.insert(id.clone())).collect())
    }

    async fn get(&self, id: &str) -> Result<Note, DbError> {
        let (primary, secondary) = tokio::join!(self.primary.get(id), self.secondary.get(id));
        match (primary, secondary) {
            (Ok(note), _) => Ok(tagged(note, DbKind::Postgresql)),
            (Err(_), Ok(note)) => Ok(tagged(note, DbKind::Mysql)),
            (Err(p), Err(s)) if p.is_not_found() => Err(s),
            (Err(p), Err(_)) => Err(p),
        }
    }

    async fn create(&self, note: NewNote) -> Result<Note, DbError> {
        let created = self.primary.create(note.clone()).await?;
        if let Err(e) = self.secondary.create(note).await {
            tracing::warn!(error = %e, id = %created.id, "dual notes: mirror create failed");
        }
        Ok(tagged(created, DbKind::Postgresql))
    }

    async fn update(&self, id: &str, patch: &NotePatch) -> Result<Note, DbError> {
        let (primary, secondary) = tokio::join!(self.primary.update(id, patch), self.secondary.update(id, patch));
        match (primary, secondary) {
            (Ok(note), secondary) => {
                if let Err(e) = secondary {
                    tracing::warn!(error = %e, id, "dual notes: mirror update failed");
                }
                Ok(tagged(note, DbKind::Postgresql))
            }
            (Err(p), Ok(note)) => {
                tracing::warn!(error = %p, id, "dual notes: primary update failed, served from mirror");
                Ok(tagged(note, DbKind::Mysql))
            }
            (Err(p), Err(s)) if p.is_not_found() => Err(s),
            (Err(p), Err(_)) => Err(p),
        }
    }

    async fn delete(&self, id: &str) -> Result<bool, DbError> {
        let (primary, secondary) = tokio::join!(self.primary.delete(id), self.secondary.delete(id));
        match (primary, secondary) {
            (Ok(p), Ok(s)) => Ok(p || s),
            (Ok(p), Err(e)) => {
                tracing::warn!(error = %e, id, "dual notes: mirror delete failed");
                Ok(p)
            }
            (Err(e), Ok(true)) => {
                tracing::warn!(error = %e, id, "dual notes: primary delete failed");
                Ok(true)
            }
            (Err(e), _) => Err(e),
        }
    }

    async fn ping(&self) -> Result<(), DbError> {
        let (primary, secondary) = tokio::join!(self.primary.ping(), self.secondary.ping());
        primary.or(secondary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notes::MemoryNoteStore;
    use devdash_core::models::{CreateNoteRequest, UpdateNoteRequest};

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

    fn stores() -> (Arc<MemoryNoteStore>, Arc<MemoryNoteStore>, DualNoteStore) {
        let pg = Arc::new(MemoryNoteStore::new());
        let my = Arc::new(MemoryNoteStore::new());
        let dual = DualNoteStore::new(pg.clone(), my.clone());
        (pg, my, dual)
    }

    #[tokio::test]
    async fn create_mirrors_to_both() {
        let (pg, my, dual) = stores();
        let note = dual.create(new_note("a")).await.unwrap();
        assert_eq!(note.source, Some(DbKind::Postgresql));
        assert!(pg.get("a").await.is_ok());
        assert!(my.get("a").await.is_ok());
    }

    #[tokio::test]
    async fn list_merges_and_counts_sources() {
        let (pg, my, dual) = stores();
        dual.create(new_note("shared")).await.unwrap();
        pg.create(new_note("pg-only")).await.unwrap();
        my.create(new_note("my-only")).await.unwrap();

        let list = dual.list(&NoteFilter::default(), Pagination::default()).await.unwrap();
        assert_eq!(list.page.items.len(), 3);
        assert_eq!(
            list.sources,
            Some(SourceCounts {
                postgresql: 2,
                mysql: 1
            })
        );
        let shared = list.page.items.iter().find(|n| n.id == "shared").unwrap();
        assert_eq!(shared.source, Some(DbKind::Postgresql));
    }

    #[tokio::test]
    async fn get_falls_through_to_secondary() {
        let (_, my, dual) = stores();
        my.create(new_note("legacy")).await.unwrap();
        let note = dual.get("legacy").await.unwrap();
        assert_eq!(note.source, Some(DbKind::Mysql));
        assert!(dual.get("ghost").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn update_and_delete_cover_both() {
        let (pg, my, dual) = stores();
        dual.create(new_note("a")).await.unwrap();

        let patch = UpdateNoteRequest {
            title: Some("renamed".into()),
            ..Default::default()
        }
        .validate()
        .unwrap();
        dual.update("a", &patch).await.unwrap();
        assert_eq!(my.get("a").await.unwrap().title, "renamed");

        assert!(dual.delete("a").await.unwrap());
        assert!(pg.get("a").await.is_err());
        assert!(my.get("a").await.is_err());
        assert!(!dual.delete("a").await.unwrap());
    }

    #[tokio::test]
    async fn paging_walks_the_whole_union() {
        let (pg, my, dual) = stores();
        // interleave creation so each store's newest rows alternate
        for i in 0..4 {
            pg.create(new_note(&format!("pg{}", i))).await.unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
            my.create(new_note(&format!("my{}", i))).await.unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }

        let mut seen = Vec::new();
        for page in 1..=4 {
            let list = dual.list(&NoteFilter::default(), Pagination::new(page, 2)).await.unwrap();
            assert_eq!(list.page.total, 8);
            assert_eq!(list.page.total_pages(), 4);
            seen.extend(list.page.items.into_iter().map(|n| n.id));
        }
        assert_eq!(seen, vec!["my3", "pg3", "my2", "pg2", "my1", "pg1", "my0", "pg0"]);
    }

    #[tokio::test]
    async fn total_counts_shared_notes_once() {
        let (pg, my, dual) = stores();
        dual.create(new_note("shared")).await.unwrap();
        pg.create(new_note("pg-only")).await.unwrap();
        my.create(new_note("my-only")).await.unwrap();

        let list = dual.list(&NoteFilter::default(), Pagination::new(1, 1)).await.unwrap();
        assert_eq!(list.page.total, 3);
        assert_eq!(list.page.items.len(), 1);
        assert_eq!(dual.ids(&NoteFilter::default()).await.unwrap().len(), 3);
    }
}
