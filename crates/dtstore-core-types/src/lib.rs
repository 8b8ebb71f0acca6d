//! Core types shared across dtstore crates
//!
//! This crate provides foundational types used by the persistence engine,
//! its error and logging facilities, and store collaborators:
//!
//! - **Identity types**: ObjectId, SchemaVersion
//! - **Sensitive data**: Sensitive<T> marker for automatic redaction
//! - **Schema constants**: Canonical field keys and event names

pub mod ids;
pub mod schema;
pub mod sensitive;

pub use ids::{ObjectId, SchemaVersion};
pub use sensitive::Sensitive;
