//! Database layer - connection pools, migrations and repositories
//!
//! - One pool per engine; repositories borrow it, nothing wraps a
//!   connection in a mutex
//! - Dynamic WHERE clauses go through `sqlx::QueryBuilder` binds
//! - Rely on DB constraints and map violations, no check-then-insert

pub mod migrations;
pub mod pool;
pub mod repos;

use devdash_core::models::ValidationError;

pub use pool::{connect_mysql_strict, connect_pg_strict, create_mysql_pool, create_pg_pool};

/// Database error type shared by repositories and note stores
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("not found: {resource} '{id}'")]
    NotFound { resource: &'static str, id: String },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{0} is not configured")]
    Unavailable(&'static str),
}

impl DbError {
    pub fn not_found(resource: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            resource,
            id: id.to_string(),
        }
    }

    /// Map constraint violations to client errors, keep everything else.
    ///
    /// `what` names the row for conflict messages, `reference` names the
    /// foreign key column for FK violations.
    pub fn from_write(e: sqlx::Error, what: &str, reference: &'static str) -> Self {
        if let sqlx::Error::Database(ref db) = e {
            if db.is_unique_violation() {
                return Self::Conflict(format!("{} already exists", what));
            }
            if db.is_foreign_key_violation() {
                return Self::Validation(ValidationError::UnknownReference {
                    field: reference,
                    id: "referenced row".to_string(),
                });
            }
        }
        Self::Sqlx(e)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Errors caused by the database being unreachable or broken, as
    /// opposed to errors about the request itself.
    pub fn is_backend_failure(&self) -> bool {
        matches!(self, Self::Sqlx(_) | Self::Unavailable(_))
    }
}

/// Build a `%term%` LIKE pattern with `%`, `_` and `\` escaped.
pub fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// Decode a string column into a typed enum, surfacing bad values as a
/// column decode error instead of a panic.
pub(crate) fn parse_column<T>(value: &str, column: &str) -> Result<T, sqlx::Error>
where
    T: std::str::FromStr<Err = ValidationError>,
{
    value.parse().map_err(|e: ValidationError| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use devdash_core::models::UserStatus;

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("bob"), "%bob%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
        assert_eq!(like_pattern("a\\b"), "%a\\\\b%");
    }

    #[test]
    fn parse_column_maps_to_decode_error() {
        let ok: UserStatus = parse_column("active", "status").unwrap();
        assert_eq!(ok, UserStatus::Active);

        let err = parse_column::<UserStatus>("zombie", "status").unwrap_err();
        assert!(matches!(err, sqlx::Error::ColumnDecode { .. }));
    }

    #[test]
    fn backend_failure_classification() {
        assert!(DbError::Sqlx(sqlx::Error::PoolTimedOut).is_backend_failure());
        assert!(DbError::Unavailable("mysql").is_backend_failure());
        assert!(!DbError::not_found("note", "x").is_backend_failure());
        assert!(!DbError::Conflict("x".into()).is_backend_failure());
    }
}
