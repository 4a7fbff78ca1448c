//! Bucket inspection tools.

pub mod lookup;
pub mod purge;

pub use lookup::{CacheMatchParams, match_impl};
pub use purge::{CachePurgeParams, purge_impl};
