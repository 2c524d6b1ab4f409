//! Core abstractions for destination schema evolution.
//!
//! - [`schema`]: Table, column and attribute identity types
//! - [`command`]: The inbound change-event view
//! - [`identifier`]: Identifier quoting, literal encoding and reserved names
//! - [`traits`]: Dialect and destination traits
//!
//! # Architecture
//!
//! The core module defines destination-agnostic abstractions that are
//! implemented by driver modules (`drivers/postgres`). The catalog and the DDL
//! layer only see the traits, which keeps them testable with a recording
//! destination.

pub mod command;
pub mod identifier;
pub mod schema;
pub mod traits;

// Re-export commonly used types for convenience
pub use command::{Command, ParentTable};
pub use schema::{Attribute, Column, Table};
pub use traits::{Destination, Dialect};
