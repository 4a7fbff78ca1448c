//! Page tools: open and close pages, and accept a waiting update from one.

use std::sync::Arc;

use offgrid_core::Error;
use offgrid_worker::{ActivationReport, ReloadCause, Reloader, UpdateBridge};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::host::HostState;
use crate::tools::json_result;

/// Parameters for the client_open tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ClientOpenParams {
    /// Path or absolute URL of the page.
    pub url: String,
}

/// Parameters for the client_close tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ClientCloseParams {
    pub id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClientCloseOutput {
    pub closed: String,
    /// Set when closing the last page activated a waiting worker.
    pub activated: Option<ActivationReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdateAcceptOutput {
    pub reload: Option<ReloadCause>,
    pub controller: Option<String>,
}

/// Pages in a host have nothing to re-render; the reload is only logged.
struct LoggedReload;

impl Reloader for LoggedReload {
    fn reload(&self, cause: ReloadCause) {
        tracing::info!(?cause, "page reload");
    }
}

/// Implementation of the client_open tool.
pub async fn open_impl(state: &HostState, params: ClientOpenParams) -> Result<CallToolResult, McpError> {
    let url = state.resolve(&params.url)?;
    let client = state.registration.open_client(url.as_str()).await;
    json_result(&client)
}

/// Implementation of the client_close tool.
pub async fn close_impl(state: &HostState, params: ClientCloseParams) -> Result<CallToolResult, McpError> {
    let activated = state.registration.client_closed(&params.id).await?;
    json_result(&ClientCloseOutput { closed: params.id, activated })
}

/// Implementation of the update_accept tool.
///
/// Runs the page side of the update handshake against the waiting worker.
pub async fn update_accept_impl(state: &HostState) -> Result<CallToolResult, McpError> {
    let bridge = UpdateBridge::connect(&state.registration, state.reload_timeout, Arc::new(LoggedReload));
    if !bridge.update_available() {
        return Err(Error::InvalidState("no update is waiting".into()).into());
    }

    let reload = bridge.accept_update().await?;
    json_result(&UpdateAcceptOutput { reload, controller: state.registration.controller() })
}

#[cfg(test)]
mod tests {
    use offgrid_core::{CacheNames, StrategyTable};
    use offgrid_worker::testing::MockNetwork;
    use offgrid_worker::{OfflineWorker, WorkerConfig};

    use super::*;
    use crate::host::test_support::{config, host, manifest};
    use crate::tools::output_of;

    async fn stage_update(state: &HostState) {
        let mut config = config();
        config.cache_version = "v2".into();
        let table = StrategyTable::standard(CacheNames::new("offgrid", "v2"), vec!["/api/".into()]);
        let manifest = manifest(table, &["/"]);
        let network = Arc::new(MockNetwork::new());
        network.serve("/", "home v2");
        let worker = OfflineWorker::new(
            WorkerConfig::from_app_config(&config, &manifest).unwrap(),
            manifest,
            state.cache.clone(),
            network,
            state.registration.clients().clone(),
        );
        state.registration.register(Arc::new(worker)).await.unwrap();
    }

    #[tokio::test]
    async fn test_open_page_is_controlled() {
        let (state, _network) = host().await;
        let output = output_of(&open_impl(&state, ClientOpenParams { url: "/cart".into() }).await.unwrap());
        assert_eq!(output["url"], "https://shop.test/cart");
        assert_eq!(output["controller"], "v1+1700000000000");
    }

    #[tokio::test]
    async fn test_accept_update_reloads_into_new_controller() {
        let (state, _network) = host().await;
        state.registration.open_client("https://shop.test/").await;
        stage_update(&state).await;

        let output = output_of(&update_accept_impl(&state).await.unwrap());
        assert_eq!(output["reload"], "controller_changed");
        assert_eq!(output["controller"], "v2+1700000000000");
        assert!(!state.registration.pending_update().is_set());
    }

    #[tokio::test]
    async fn test_accept_without_update_is_rejected() {
        let (state, _network) = host().await;
        assert!(update_accept_impl(&state).await.is_err());
    }

    #[tokio::test]
    async fn test_closing_last_page_activates_update() {
        let (state, _network) = host().await;
        let page = state.registration.open_client("https://shop.test/").await;
        stage_update(&state).await;

        let output = output_of(&close_impl(&state, ClientCloseParams { id: page.id.clone() }).await.unwrap());
        assert_eq!(output["closed"], page.id);
        assert_eq!(output["activated"]["version"], "v2+1700000000000");
    }

    #[tokio::test]
    async fn test_accept_after_update_already_activated_is_rejected() {
        let (state, _network) = host().await;
        let page = state.registration.open_client("https://shop.test/").await;
        stage_update(&state).await;
        close_impl(&state, ClientCloseParams { id: page.id }).await.unwrap();

        assert!(update_accept_impl(&state).await.is_err());
        assert_eq!(state.registration.controller().as_deref(), Some("v2+1700000000000"));
    }

    #[tokio::test]
    async fn test_close_unknown_page() {
        let (state, _network) = host().await;
        assert!(close_impl(&state, ClientCloseParams { id: "client-42".into() }).await.is_err());
    }
}
