//! worker_message tool implementation.
//!
//! Posts a page message to the worker, e.g. `{"type": "SKIP_WAITING"}`.

use offgrid_core::Error;
use offgrid_worker::ClientMessage;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::host::HostState;
use crate::tools::json_result;

/// Parameters for the worker_message tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WorkerMessageParams {
    /// Message object with a `type` field.
    pub message: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkerMessageOutput {
    pub message: ClientMessage,
    /// Active worker version after the message was handled.
    pub controller: Option<String>,
}

/// Implementation of the worker_message tool.
pub async fn message_impl(state: &HostState, params: WorkerMessageParams) -> Result<CallToolResult, McpError> {
    let message: ClientMessage =
        serde_json::from_value(params.message).map_err(|e| Error::InvalidInput(format!("invalid message: {e}")))?;

    state.registration.post_message(message.clone()).await?;

    json_result(&WorkerMessageOutput { message, controller: state.registration.controller() })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use offgrid_core::{CacheNames, StrategyTable};
    use offgrid_worker::{OfflineWorker, WorkerConfig};

    use super::*;
    use crate::host::test_support::{config, host, manifest};
    use crate::tools::output_of;

    #[tokio::test]
    async fn test_skip_waiting_activates_update() {
        let (state, _network) = host().await;
        state.registration.open_client("https://shop.test/").await;

        let mut config = config();
        config.cache_version = "v2".into();
        let table = StrategyTable::standard(CacheNames::new("offgrid", "v2"), vec!["/api/".into()]);
        let manifest = manifest(table, &["/"]);
        let worker_config = WorkerConfig::from_app_config(&config, &manifest).unwrap();
        let network = Arc::new(offgrid_worker::testing::MockNetwork::new());
        network.serve("/", "home v2");
        let worker = OfflineWorker::new(
            worker_config,
            manifest,
            state.cache.clone(),
            network,
            state.registration.clients().clone(),
        );
        state.registration.register(Arc::new(worker)).await.unwrap();
        assert!(state.registration.pending_update().is_set());

        let params = WorkerMessageParams { message: serde_json::json!({"type": "SKIP_WAITING"}) };
        let result = message_impl(&state, params).await.unwrap();
        let output = output_of(&result);
        assert_eq!(output["message"]["type"], "SKIP_WAITING");
        assert_eq!(output["controller"], "v2+1700000000000");
        assert!(!state.cache.has_bucket("offgrid-app-shell-v1").await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_message_is_accepted() {
        let (state, _network) = host().await;
        let params = WorkerMessageParams { message: serde_json::json!({"type": "PING"}) };
        assert!(message_impl(&state, params).await.is_ok());
    }

    #[tokio::test]
    async fn test_message_without_type_is_rejected() {
        let (state, _network) = host().await;
        let params = WorkerMessageParams { message: serde_json::json!("SKIP_WAITING") };
        assert!(message_impl(&state, params).await.is_err());
    }
}
