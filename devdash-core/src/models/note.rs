//! Notes: client-identified rows stored in PostgreSQL, MySQL or both.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::validation::{optional_text, required_text};
use super::{Pagination, Tags, ValidationError};
use crate::config::DbKind;

const MAX_NOTE_ID_LEN: usize = 64;
const MAX_TITLE_LEN: usize = 255;
const MAX_CONTENT_LEN: usize = 100_000;
const MAX_SEARCH_LEN: usize = 100;

static NOTE_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.:-]*$").expect("invalid note id regex"));

/// Note as returned by the API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    pub is_public: bool,
    pub user_id: Option<i64>,
    /// Filled from the LEFT JOIN on users
    pub author_username: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Which database served this row (dual mode only)
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub source: Option<DbKind>,
}

/// Client-supplied (or generated) note identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NoteId(String);

impl NoteId {
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        if s.is_empty() {
            return Err(ValidationError::Empty { field: "id" });
        }
        if s.len() > MAX_NOTE_ID_LEN {
            return Err(ValidationError::TooLong {
                field: "id",
                max: MAX_NOTE_ID_LEN,
            });
        }
        if !NOTE_ID_RE.is_match(s) {
            return Err(ValidationError::InvalidFormat {
                field: "id",
                reason: "must be alphanumeric with '_', '.', ':' or '-', starting with alphanumeric",
            });
        }
        Ok(Self(s.to_owned()))
    }

    /// Server-side id for clients that did not send one
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// POST /api/notes body
#[derive(Debug, Clone, Deserialize)]
pub struct CreateNoteRequest {
    pub id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub content: String,
    pub tags: Option<Vec<String>>,
    #[serde(alias = "isPublic")]
    pub is_public: Option<bool>,
    #[serde(alias = "userId")]
    pub user_id: Option<i64>,
}

/// Validated note insert
#[derive(Debug, Clone)]
pub struct NewNote {
    pub id: NoteId,
    pub title: String,
    pub content: String,
    pub tags: Tags,
    pub is_public: bool,
    pub user_id: Option<i64>,
}

impl CreateNoteRequest {
    pub fn validate(self) -> Result<NewNote, ValidationError> {
        let id = match self.id.as_deref().map(str::trim) {
            None | Some("") => NoteId::generate(),
            Some(id) => NoteId::new(id)?,
        };
        Ok(NewNote {
            id,
            title: required_text("title", &self.title, MAX_TITLE_LEN)?,
            content: validate_content(self.content)?,
            tags: Tags::new(self.tags.unwrap_or_default())?,
            is_public: self.is_public.unwrap_or(false),
            user_id: self.user_id,
        })
    }
}

impl NewNote {
    /// Materialize the row a store would persist, stamped with `now`.
    pub fn into_note(self, now: DateTime<Utc>) -> Note {
        Note {
            id: self.id.as_str().to_owned(),
            title: self.title,
            content: self.content,
            tags: self.tags.into_vec(),
            is_public: self.is_public,
            user_id: self.user_id,
            author_username: None,
            created_at: now,
            updated_at: now,
            source: None,
        }
    }
}

fn validate_content(content: String) -> Result<String, ValidationError> {
    if content.chars().count() > MAX_CONTENT_LEN {
        return Err(ValidationError::TooLong {
            field: "content",
            max: MAX_CONTENT_LEN,
        });
    }
    Ok(content)
}

/// PUT /api/notes/:id body
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateNoteRequest {
    pub title: Option<String>,
    pub content: Option<String>,
    pub tags: Option<Vec<String>>,
    #[serde(alias = "isPublic")]
    pub is_public: Option<bool>,
}

/// Validated partial update
#[derive(Debug, Clone, Default)]
pub struct NotePatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub tags: Option<Tags>,
    pub is_public: Option<bool>,
}

impl UpdateNoteRequest {
    pub fn validate(self) -> Result<NotePatch, ValidationError> {
        Ok(NotePatch {
            title: self
                .title
                .map(|t| required_text("title", &t, MAX_TITLE_LEN))
                .transpose()?,
            content: self.content.map(validate_content).transpose()?,
            tags: self.tags.map(Tags::new).transpose()?,
            is_public: self.is_public,
        })
    }
}

impl NotePatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.content.is_none() && self.tags.is_none() && self.is_public.is_none()
    }

    /// Apply to an in-memory note, bumping `updated_at`.
    pub fn apply(&self, note: &mut Note, now: DateTime<Utc>) {
        if let Some(ref title) = self.title {
            note.title = title.clone();
        }
        if let Some(ref content) = self.content {
            note.content = content.clone();
        }
        if let Some(ref tags) = self.tags {
            note.tags = tags.as_slice().to_vec();
        }
        if let Some(is_public) = self.is_public {
            note.is_public = is_public;
        }
        note.updated_at = now;
    }
}

/// GET /api/notes query string
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NoteQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub user_id: Option<i64>,
    pub is_public: Option<bool>,
    pub tag: Option<String>,
    pub search: Option<String>,
}

/// List filter for notes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NoteFilter {
    pub user_id: Option<i64>,
    pub is_public: Option<bool>,
    pub tag: Option<String>,
    pub search: Option<String>,
}

impl NoteQuery {
    pub fn into_parts(self) -> Result<(NoteFilter, Pagination), ValidationError> {
        let filter = NoteFilter {
            user_id: self.user_id,
            is_public: self.is_public,
            tag: optional_text("tag", self.tag.as_deref(), super::tags::MAX_TAG_LEN)?,
            search: optional_text("search", self.search.as_deref(), MAX_SEARCH_LEN)?,
        };
        Ok((filter, Pagination::from_options(self.page, self.limit)))
    }
}

impl NoteFilter {
    /// In-process evaluation of the filter; SQL stores express the same
    /// predicate in their WHERE clause.
    pub fn matches(&self, note: &Note) -> bool {
        if let Some(user_id) = self.user_id {
            if note.user_id != Some(user_id) {
                return false;
            }
        }
        if let Some(is_public) = self.is_public {
            if note.is_public != is_public {
                return false;
            }
        }
        if let Some(ref tag) = self.tag {
            if !note.tags.iter().any(|t| t == tag) {
                return false;
            }
        }
        if let Some(ref search) = self.search {
            let needle = search.to_lowercase();
            if !note.title.to_lowercase().contains(&needle)
                && !note.content.to_lowercase().contains(&needle)
            {
                return false;
            }
        }
        true
    }
}
