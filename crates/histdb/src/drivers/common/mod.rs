//! Utilities shared by destination drivers.
//!
//! - [`tls`]: rustls connector construction for PostgreSQL connections

pub mod tls;

pub use tls::{make_connector, SslMode};
