//! Validation error types

use std::fmt;

/// Validation error for domain models
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Field is empty when it shouldn't be
    Empty { field: &'static str },

    /// Field is shorter than the minimum length
    TooShort { field: &'static str, min: usize },

    /// Field exceeds maximum length
    TooLong { field: &'static str, max: usize },

    /// Collection has more entries than allowed
    TooMany { field: &'static str, max: usize },

    /// String doesn't match required format
    InvalidFormat { field: &'static str, reason: &'static str },

    /// Invalid enum variant
    InvalidVariant { field: &'static str, value: String },

    /// Number outside its allowed range
    OutOfRange { field: &'static str, reason: &'static str },

    /// A referenced row does not exist
    UnknownReference { field: &'static str, id: String },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty { field } => write!(f, "{} cannot be empty", field),
            Self::TooShort { field, min } => {
                write!(f, "{} must be at least {} characters", field, min)
            }
            Self::TooLong { field, max } => {
                write!(f, "{} exceeds maximum length of {} characters", field, max)
            }
            Self::TooMany { field, max } => write!(f, "{} allows at most {} entries", field, max),
            Self::InvalidFormat { field, reason } => write!(f, "{}: {}", field, reason),
            Self::InvalidVariant { field, value } => {
                write!(f, "invalid {} value: '{}'", field, value)
            }
            Self::OutOfRange { field, reason } => write!(f, "{} {}", field, reason),
            Self::UnknownReference { field, id } => write!(f, "{} '{}' does not exist", field, id),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Require a non-blank string no longer than `max` characters.
pub(crate) fn required_text(
    field: &'static str,
    value: &str,
    max: usize,
) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Empty { field });
    }
    if trimmed.chars().count() > max {
        return Err(ValidationError::TooLong { field, max });
    }
    Ok(trimmed.to_owned())
}

/// Optional text: blank becomes `None`, otherwise length-checked.
pub(crate) fn optional_text(
    field: &'static str,
    value: Option<&str>,
    max: usize,
) -> Result<Option<String>, ValidationError> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) if v.chars().count() > max => Err(ValidationError::TooLong { field, max }),
        Some(v) => Ok(Some(v.to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ValidationError::TooLong {
            field: "title",
            max: 255,
        };
        assert_eq!(
            err.to_string(),
            "title exceeds maximum length of 255 characters"
        );

        let err = ValidationError::UnknownReference {
            field: "product_id",
            id: "42".into(),
        };
        assert_eq!(err.to_string(), "product_id '42' does not exist");
    }

    #[test]
    fn required_text_trims() {
        assert_eq!(required_text("title", "  hi  ", 10).unwrap(), "hi");
        assert_eq!(
            required_text("title", "   ", 10).unwrap_err(),
            ValidationError::Empty { field: "title" }
        );
    }

    #[test]
    fn optional_text_blank_is_none() {
        assert_eq!(optional_text("city", Some(" "), 10).unwrap(), None);
        assert_eq!(optional_text("city", None, 10).unwrap(), None);
        assert!(optional_text("city", Some("abcdefghijk"), 10).is_err());
    }
}
