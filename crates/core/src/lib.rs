//! Core types and shared functionality for offgrid.
//!
//! This crate provides:
//! - Versioned cache buckets with a SQLite backend
//! - The strategy table that routes requests to caching strategies
//! - Precache manifest types
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;
pub mod manifest;
pub mod request;
pub mod strategy;

pub use cache::{CacheDb, CachedEntry};
pub use config::{AppConfig, ConfigError};
pub use error::Error;
pub use manifest::{Manifest, PrecacheEntry};
pub use request::{Request, RequestMode, Response};
pub use strategy::{CacheNames, Classification, Expiration, RequestClass, Route, Rule, Strategy, StrategyTable, UrlPattern};
