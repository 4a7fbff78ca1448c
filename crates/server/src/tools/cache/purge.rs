//! cache_purge tool implementation.
//!
//! Purges a bucket's entries by age or count, or deletes the bucket.

use std::time::Duration;

use offgrid_core::Error;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::host::HostState;
use crate::tools::json_result;

/// Parameters for the cache_purge tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CachePurgeParams {
    /// Bucket to purge.
    pub bucket: String,

    /// Purge entries stored more than this many seconds ago.
    #[serde(default)]
    pub older_than_seconds: Option<u64>,

    /// Keep only the newest N entries.
    #[serde(default)]
    pub max_entries: Option<usize>,

    /// Delete the whole bucket.
    #[serde(default)]
    pub delete_bucket: bool,
}

/// Output from the cache_purge tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CachePurgeOutput {
    /// Number of entries deleted.
    pub deleted: u64,
    pub bucket_deleted: bool,
}

/// Implementation of the cache_purge tool.
pub async fn purge_impl(state: &HostState, params: CachePurgeParams) -> Result<CallToolResult, McpError> {
    if params.older_than_seconds.is_none() && params.max_entries.is_none() && !params.delete_bucket {
        return Err(Error::InvalidInput(
            "At least one of older_than_seconds, max_entries, or delete_bucket must be specified".to_string(),
        )
        .into());
    }

    let cache = &state.cache;
    if params.delete_bucket {
        let deleted = cache.entry_count(&params.bucket).await?;
        let bucket_deleted = cache.delete_bucket(&params.bucket).await?;
        tracing::info!(bucket = %params.bucket, deleted, "bucket deleted");
        return json_result(&CachePurgeOutput { deleted, bucket_deleted });
    }

    let mut deleted_total = 0u64;

    if let Some(seconds) = params.older_than_seconds {
        deleted_total += cache.purge_older_than(&params.bucket, Duration::from_secs(seconds)).await?;
    }

    if let Some(max_entries) = params.max_entries {
        deleted_total += cache.trim_bucket(&params.bucket, max_entries).await?;
    }

    json_result(&CachePurgeOutput { deleted: deleted_total, bucket_deleted: false })
}
