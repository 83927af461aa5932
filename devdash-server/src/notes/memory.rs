//! In-process note store

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use devdash_core::models::{NewNote, Note, NoteFilter, NotePatch, Paginated, Pagination};
use tokio::sync::RwLock;

use super::{NoteList, NoteStore};
use crate::db::DbError;

/// Notes kept in a map; lost on restart
#[derive(Debug, Default)]
pub struct MemoryNoteStore {
    notes: RwLock<HashMap<String, Note>>,
}

impl MemoryNoteStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn sorted_matches<'a>(notes: &'a HashMap<String, Note>, filter: &NoteFilter) -> Vec<&'a Note> {
    let mut matching: Vec<&Note> = notes.values().filter(|n| filter.matches(n)).collect();
    matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
    matching
}

#[async_trait]
impl NoteStore for MemoryNoteStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn list(&self, filter: &NoteFilter, page: Pagination) -> Result<NoteList, DbError> {
        let notes = self.notes.read().await;
        let matching = sorted_matches(&notes, filter);

        let total = matching.len() as i64;
        let items = matching
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit() as usize)
            .cloned()
            .collect();

        Ok(Paginated::new(items, total, page).into())
    }

    async fn head(&self, filter: &NoteFilter, take: u64) -> Result<Vec<Note>, DbError> {
        let notes = self.notes.read().await;
        Ok(sorted_matches(&notes, filter)
            .into_iter()
            .take(take as usize)
            .cloned()
            .collect())
    }

    async fn ids(&self, filter: &NoteFilter) -> Result<Vec<String>, DbError> {
        let notes = self.notes.read().await;
        Ok(notes
            .values()
            .filter(|n| filter.matches(n))
            .map(|n| n.id.clone())
            .collect())
    }

    async fn get(&self, id: &str) -> Result<Note, DbError> {
        self.notes
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| DbError::not_found("note", id))
    }

    async fn create(&self, note: NewNote) -> Result<Note, DbError> {
        let mut notes = self.notes.write().await;
        let id = note.id.as_str().to_owned();
        if notes.contains_key(&id) {
            return Err(DbError::Conflict(format!("note '{}' already exists", id)));
        }
        let note = note.into_note(Utc::now());
        notes.insert(id, note.clone());
        Ok(note)
    }

    async fn update(&self, id: &str, patch: &NotePatch) -> Result<Note, DbError> {
        let mut notes = self.notes.write().await;
        let note = notes.get_mut(id).ok_or_else(|| DbError::not_found("note", id))?;
        patch.apply(note, Utc::now());
        Ok(note.clone())
    }

    async fn delete(&self, id: &str) -> Result<bool, DbError> {
        Ok(self.notes.write().await.remove(id).is_some())
    }

    async fn ping(&self) -> Result<(), DbError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devdash_core::models::{CreateNoteRequest, UpdateNoteRequest};

    fn new_note(id: &str, tags: &[&str]) -> NewNote {
        CreateNoteRequest {
            id: Some(id.into()),
            title: format!("note {}", id),
            content: "body".into(),
            tags: Some(tags.iter().map(|t| t.to_string()).collect()),
            is_public: None,
            user_id: None,
        }
        .validate()
        .unwrap()
    }

    #[tokio::test]
    async fn create_then_get() {
        let store = MemoryNoteStore::new();
        let created = store.create(new_note("a", &["ops", "aws"])).await.unwrap();
        let fetched = store.get("a").await.unwrap();
        assert_eq!(created, fetched);
        assert_eq!(fetched.tags, vec!["ops", "aws"]);
    }

    #[tokio::test]
    async fn duplicate_id_conflicts() {
        let store = MemoryNoteStore::new();
        store.create(new_note("a", &[])).await.unwrap();
        let err = store.create(new_note("a", &[])).await.unwrap_err();
        assert!(matches!(err, DbError::Conflict(_)));
    }

    #[tokio::test]
    async fn delete_reports_missing() {
        let store = MemoryNoteStore::new();
        store.create(new_note("a", &[])).await.unwrap();
        assert!(store.delete("a").await.unwrap());
        assert!(!store.delete("a").await.unwrap());
        assert!(store.get("a").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn update_missing_is_not_found() {
        let store = MemoryNoteStore::new();
        let patch = UpdateNoteRequest::default().validate().unwrap();
        assert!(store.update("ghost", &patch).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn list_paginates_and_filters() {
        let store = MemoryNoteStore::new();
        for i in 0..5 {
            let tags: &[&str] = if i % 2 == 0 { &["even"] } else { &[] };
            store.create(new_note(&format!("n{}", i), tags)).await.unwrap();
        }

        let list = store.list(&NoteFilter::default(), Pagination::new(2, 2)).await.unwrap();
        assert_eq!(list.page.total, 5);
        assert_eq!(list.page.items.len(), 2);
        assert_eq!(list.page.total_pages(), 3);
        assert!(list.sources.is_none());

        let filter = NoteFilter {
            tag: Some("even".into()),
            ..Default::default()
        };
        let list = store.list(&filter, Pagination::default()).await.unwrap();
        assert_eq!(list.page.total, 3);
    }
}
