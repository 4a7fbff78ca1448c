//! SQLite-backed cache buckets.
//!
//! A bucket is a named, versioned key-value store mapping request identity
//! (method + canonical URL) to a stored response. The store provides:
//!
//! - Open-on-first-write bucket creation
//! - Atomic single-entry and batch puts
//! - Cascading bucket deletion for the activation sweep
//! - Expiration by entry count and by age

pub mod buckets;
pub mod connection;
pub mod hash;
pub mod migrations;
pub mod sync;

pub use crate::Error;

pub use buckets::CachedEntry;
pub use connection::CacheDb;
