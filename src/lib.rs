//! Expiring image host
//!
//! Accepts image uploads, hands back a short random identifier, serves the
//! image under that identifier for a fixed retention window and purges it
//! afterwards. Bytes live in an S3-compatible blob store, expiry records in
//! PostgreSQL.

pub mod blob;
pub mod clock;
pub mod config;
pub mod error;
pub mod id;
pub mod lifecycle;
pub mod metadata;
pub mod models;
pub mod server;
pub mod sniff;

pub use error::{Error, Result};
