//! cache_match tool implementation.
//!
//! Reads a stored response without going through any strategy.

use offgrid_core::{CacheDb, Error, Request};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::host::HostState;
use crate::tools::json_result;

/// Parameters for the cache_match tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheMatchParams {
    /// Path or absolute URL of the stored request.
    pub url: String,

    /// Bucket to search. All buckets are searched when omitted.
    #[serde(default)]
    pub bucket: Option<String>,
}

/// Output from the cache_match tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheMatchOutput {
    pub url: String,
    pub method: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
    pub stored_at: String,
}

/// Implementation of the cache_match tool.
pub async fn match_impl(state: &HostState, params: CacheMatchParams) -> Result<CallToolResult, McpError> {
    let request = Request::get(state.resolve(&params.url)?);
    let entry = lookup(&state.cache, params.bucket.as_deref(), &request)
        .await?
        .ok_or_else(|| Error::CacheMiss(request.cache_url().to_string()))?;

    let output = CacheMatchOutput {
        url: entry.url,
        method: entry.method,
        status: entry.response.status,
        body: entry.response.text().into_owned(),
        headers: entry.response.headers,
        stored_at: entry.stored_at.to_rfc3339(),
    };
    json_result(&output)
}

async fn lookup(
    cache: &CacheDb, bucket: Option<&str>, request: &Request,
) -> Result<Option<offgrid_core::CachedEntry>, Error> {
    match bucket {
        Some(bucket) => cache.match_request(bucket, request).await,
        None => cache.match_any(request).await,
    }
}
