//! Common library for the blog backend
//!
//! This crate provides the PostgreSQL plumbing shared by the workspace:
//! connection pooling, health checks, migrations and the database error
//! taxonomy that repositories report through.

pub mod database;
pub mod error;

pub use error::{DatabaseError, DatabaseResult};
