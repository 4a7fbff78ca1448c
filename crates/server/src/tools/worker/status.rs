//! worker_status tool implementation.

use offgrid_worker::RegistrationStatus;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use serde::Serialize;

use crate::host::HostState;
use crate::tools::json_result;

#[derive(Debug, Clone, Serialize)]
pub struct BucketSummary {
    pub name: String,
    pub entries: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkerStatusOutput {
    pub registration: RegistrationStatus,
    pub buckets: Vec<BucketSummary>,
    pub sync_tags: Vec<String>,
}

/// Implementation of the worker_status tool.
pub async fn status_impl(state: &HostState) -> Result<CallToolResult, McpError> {
    let mut buckets = Vec::new();
    for name in state.cache.bucket_names().await? {
        let entries = state.cache.entry_count(&name).await?;
        buckets.push(BucketSummary { name, entries });
    }

    let output = WorkerStatusOutput {
        registration: state.registration.status().await,
        buckets,
        sync_tags: state.cache.sync_tags().await?,
    };
    json_result(&output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::test_support::host;
    use crate::tools::output_of;

    #[tokio::test]
    async fn test_status_reports_active_worker_and_buckets() {
        let (state, _network) = host().await;

        let output = output_of(&status_impl(&state).await.unwrap());
        assert_eq!(output["registration"]["active"]["state"], "activated");
        assert_eq!(output["registration"]["scope"], "/");
        assert_eq!(output["buckets"][0]["name"], "offgrid-app-shell-v1");
        assert_eq!(output["buckets"][0]["entries"], 3);
    }
}
