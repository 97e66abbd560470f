//! Profile storage on the plaintext SQLite working file.
//!
//! - [`schema`]: versioned migrations
//! - [`types`]: profile, column allow-list and update types
//! - [`repository`]: save/update/get with per-field encryption

pub mod repository;
mod row;
pub mod schema;
pub mod types;

pub use repository::Repository;
pub use types::{Column, ColumnKind, FieldValue, UserProfile, UserUpdate};
