//! devdash-core: shared domain types for the devdash dashboard
//!
//! Holds everything both the HTTP server and the operational CLI agree on:
//! entity models with validation at construction, pagination, tag encoding
//! for the two database backends, configuration and the library error type.

pub mod config;
pub mod error;
pub mod models;

pub use config::{DashConfig, DatabaseConfig, DbKind, NotesBackend};
pub use error::{DashError, Result};
pub use models::{Paginated, Pagination, PaginationParams, ValidationError};
