//! Note tags and their two storage encodings
//!
//! PostgreSQL keeps tags in a native `TEXT[]`; MySQL keeps them as a
//! JSON-encoded array in a `TEXT` column. Both must read back the same
//! ordered list that was written.

use serde::{Deserialize, Serialize};

use super::ValidationError;

pub const MAX_TAGS: usize = 20;
pub const MAX_TAG_LEN: usize = 50;

/// Validated, ordered list of tags
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tags(Vec<String>);

impl Tags {
    /// Validate raw tags.
    ///
    /// Each tag is trimmed; blank tags and oversize lists are rejected.
    /// Order and duplicates are preserved.
    pub fn new(raw: Vec<String>) -> Result<Self, ValidationError> {
        if raw.len() > MAX_TAGS {
            return Err(ValidationError::TooMany {
                field: "tags",
                max: MAX_TAGS,
            });
        }

        let mut tags = Vec::with_capacity(raw.len());
        for tag in raw {
            let tag = tag.trim();
            if tag.is_empty() {
                return Err(ValidationError::Empty { field: "tag" });
            }
            if tag.chars().count() > MAX_TAG_LEN {
                return Err(ValidationError::TooLong {
                    field: "tag",
                    max: MAX_TAG_LEN,
                });
            }
            tags.push(tag.to_owned());
        }

        Ok(Self(tags))
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Encoding for the MySQL TEXT column
    pub fn to_json_text(&self) -> String {
        encode_json(&self.0)
    }
}

/// Encode tags for a JSON text column.
pub fn encode_json(tags: &[String]) -> String {
    // Serializing a Vec<String> cannot fail
    serde_json::to_string(tags).unwrap_or_else(|_| "[]".to_string())
}

/// Decode a JSON text column back into tags.
///
/// NULL, blank and malformed values decode to an empty list.
pub fn decode_json(raw: Option<&str>) -> Vec<String> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Vec::new();
    };

    match serde_json::from_str::<Vec<String>>(raw) {
        Ok(tags) => tags,
        Err(e) => {
            tracing::warn!(error = %e, "ignoring malformed tags column");
            Vec::new()
        }
    }
}
