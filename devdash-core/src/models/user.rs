//! Users live in MySQL and are soft-deleted through `deleted_at`.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::validation::optional_text;
use super::{Pagination, ValidationError};

const MIN_USERNAME_LEN: usize = 3;
const MAX_USERNAME_LEN: usize = 50;
const MAX_EMAIL_LEN: usize = 255;
const MAX_NAME_LEN: usize = 100;
const MAX_SEARCH_LEN: usize = 100;

static USERNAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.-]+$").expect("invalid username regex"));

/// User row as returned by the API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub status: UserStatus,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    #[default]
    Active,
    Inactive,
    Suspended,
}

string_enum!(UserStatus, "status", {
    Active => "active",
    Inactive => "inactive",
    Suspended => "suspended",
});

impl UserStatus {
    /// Mirrors the `is_active` column
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

/// Validated username
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Username(String);

impl Username {
    /// 3..=50 characters of letters, digits, `_`, `.`, `-`.
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ValidationError::Empty { field: "username" });
        }
        if s.len() < MIN_USERNAME_LEN {
            return Err(ValidationError::TooShort {
                field: "username",
                min: MIN_USERNAME_LEN,
            });
        }
        if s.len() > MAX_USERNAME_LEN {
            return Err(ValidationError::TooLong {
                field: "username",
                max: MAX_USERNAME_LEN,
            });
        }
        if !USERNAME_RE.is_match(s) {
            return Err(ValidationError::InvalidFormat {
                field: "username",
                reason: "may only contain letters, digits, '_', '.' and '-'",
            });
        }
        Ok(Self(s.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Validated email address (shape check only)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Email(String);

impl Email {
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ValidationError::Empty { field: "email" });
        }
        if s.len() > MAX_EMAIL_LEN {
            return Err(ValidationError::TooLong {
                field: "email",
                max: MAX_EMAIL_LEN,
            });
        }
        let valid = match s.split_once('@') {
            Some((local, domain)) => {
                !local.is_empty()
                    && !domain.is_empty()
                    && !domain.contains('@')
                    && !s.contains(char::is_whitespace)
            }
            None => false,
        };
        if !valid {
            return Err(ValidationError::InvalidFormat {
                field: "email",
                reason: "must look like name@domain",
            });
        }
        Ok(Self(s.to_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// POST /api/users body
#[derive(Debug, Clone, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub status: Option<UserStatus>,
}

/// Validated user insert
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: Username,
    pub email: Email,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub status: UserStatus,
}

impl CreateUserRequest {
    pub fn validate(self) -> Result<NewUser, ValidationError> {
        Ok(NewUser {
            username: Username::new(&self.username)?,
            email: Email::new(&self.email)?,
            first_name: optional_text("first_name", self.first_name.as_deref(), MAX_NAME_LEN)?,
            last_name: optional_text("last_name", self.last_name.as_deref(), MAX_NAME_LEN)?,
            status: self.status.unwrap_or_default(),
        })
    }
}

/// PUT /api/users/:id body
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateUserRequest {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub status: Option<UserStatus>,
}

/// Validated partial update; `None` leaves the column untouched
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub email: Option<Email>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub status: Option<UserStatus>,
}

impl UserPatch {
    pub fn is_empty(&self) -> bool {
        self.email.is_none()
            && self.first_name.is_none()
            && self.last_name.is_none()
            && self.status.is_none()
    }
}

impl UpdateUserRequest {
    pub fn validate(self) -> Result<UserPatch, ValidationError> {
        Ok(UserPatch {
            email: self.email.as_deref().map(Email::new).transpose()?,
            first_name: optional_text("first_name", self.first_name.as_deref(), MAX_NAME_LEN)?,
            last_name: optional_text("last_name", self.last_name.as_deref(), MAX_NAME_LEN)?,
            status: self.status,
        })
    }
}

/// GET /api/users query string
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<String>,
    pub search: Option<String>,
    #[serde(default)]
    pub include_deleted: bool,
}

/// List filter for users
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserFilter {
    pub status: Option<UserStatus>,
    pub search: Option<String>,
    pub include_deleted: bool,
}

impl UserQuery {
    pub fn into_parts(self) -> Result<(UserFilter, Pagination), ValidationError> {
        let status = self
            .status
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(str::parse)
            .transpose()?;
        let filter = UserFilter {
            status,
            search: optional_text("search", self.search.as_deref(), MAX_SEARCH_LEN)?,
            include_deleted: self.include_deleted,
        };
        Ok((filter, Pagination::from_options(self.page, self.limit)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_usernames() {
        assert!(Username::new("alice").is_ok());
        assert!(Username::new("bob.smith-2").is_ok());
        assert!(Username::new("ops_admin").is_ok());
    }

    #[test]
    fn rejects_bad_usernames() {
        assert!(matches!(Username::new(""), Err(ValidationError::Empty { .. })));
        assert!(matches!(Username::new("ab"), Err(ValidationError::TooShort { min: 3, .. })));
        assert!(matches!(
            Username::new(&"a".repeat(51)),
            Err(ValidationError::TooLong { max: 50, .. })
        ));
        assert!(matches!(
            Username::new("has space"),
            Err(ValidationError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn email_shape() {
        assert_eq!(Email::new("Ops@Example.com").unwrap().as_str(), "ops@example.com");
        assert!(Email::new("no-at-sign").is_err());
        assert!(Email::new("@example.com").is_err());
        assert!(Email::new("a@b@c").is_err());
        assert!(Email::new("a b@c.com").is_err());
    }

    #[test]
    fn status_parse() {
        assert_eq!("suspended".parse::<UserStatus>().unwrap(), UserStatus::Suspended);
        assert_eq!(UserStatus::Inactive.to_string(), "inactive");
        assert!(!UserStatus::Suspended.is_active());
        assert!(matches!(
            "deleted".parse::<UserStatus>(),
            Err(ValidationError::InvalidVariant { .. })
        ));
    }

    #[test]
    fn create_request_defaults_status() {
        let req = CreateUserRequest {
            username: "alice".into(),
            email: "alice@example.com".into(),
            first_name: Some("  ".into()),
            last_name: Some("Liddell".into()),
            status: None,
        };
        let user = req.validate().unwrap();
        assert_eq!(user.status, UserStatus::Active);
        assert_eq!(user.first_name, None);
        assert_eq!(user.last_name.as_deref(), Some("Liddell"));
    }

    #[test]
    fn query_into_parts() {
        let query = UserQuery {
            page: Some(2),
            limit: Some(500),
            status: Some("inactive".into()),
            search: Some(" bob ".into()),
            include_deleted: false,
        };
        let (filter, page) = query.into_parts().unwrap();
        assert_eq!(filter.status, Some(UserStatus::Inactive));
        assert_eq!(filter.search.as_deref(), Some("bob"));
        assert_eq!(page, Pagination { page: 2, limit: 100 });
    }

    #[test]
    fn empty_patch() {
        assert!(UpdateUserRequest::default().validate().unwrap().is_empty());
    }
}
