//! MCP server handler implementation.
//!
//! This module defines the host handler that routes tool calls to the
//! worker registration and the bucket store.

use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};

use crate::host::HostState;
use crate::tools::cache::{CacheMatchParams, CachePurgeParams, match_impl, purge_impl};
use crate::tools::clients::{ClientCloseParams, ClientOpenParams, close_impl, open_impl, update_accept_impl};
use crate::tools::worker::{
    NotificationClickParams, WorkerFetchParams, WorkerMessageParams, WorkerPushParams, fetch_impl, message_impl,
    notification_click_impl, push_impl, status_impl,
};

/// The host: one registration, its pages and its buckets.
#[derive(Clone)]
pub struct OffgridHost {
    state: HostState,
    tool_router: ToolRouter<Self>,
}

/// Tool router implementation using the #[tool_router] macro.
#[tool_router]
impl OffgridHost {
    pub fn new(state: HostState) -> Self {
        Self { state, tool_router: Self::tool_router() }
    }

    #[tool(
        description = "Issue a page request through the active worker. Same-origin GETs are served by the caching strategy for the URL; anything else goes to the network."
    )]
    async fn worker_fetch(&self, params: Parameters<WorkerFetchParams>) -> Result<CallToolResult, McpError> {
        fetch_impl(&self.state, params.0).await
    }

    #[tool(description = "Show the installing, waiting and active worker versions, open pages, buckets and sync tags.")]
    async fn worker_status(&self) -> Result<CallToolResult, McpError> {
        status_impl(&self.state).await
    }

    #[tool(description = "Post a page message to the worker, e.g. {\"type\": \"SKIP_WAITING\"}.")]
    async fn worker_message(&self, params: Parameters<WorkerMessageParams>) -> Result<CallToolResult, McpError> {
        message_impl(&self.state, params.0).await
    }

    #[tool(description = "Deliver a push message. Returns the notification shown, or null for a malformed payload.")]
    async fn worker_push(&self, params: Parameters<WorkerPushParams>) -> Result<CallToolResult, McpError> {
        push_impl(&self.state, params.0).await
    }

    #[tool(description = "Click a notification: focuses a page showing its URL or opens a new one.")]
    async fn notification_click(
        &self, params: Parameters<NotificationClickParams>,
    ) -> Result<CallToolResult, McpError> {
        notification_click_impl(&self.state, params.0).await
    }

    #[tool(description = "Open a page within the scope. It is controlled by the active worker.")]
    async fn client_open(&self, params: Parameters<ClientOpenParams>) -> Result<CallToolResult, McpError> {
        open_impl(&self.state, params.0).await
    }

    #[tool(description = "Close a page. Closing the last page activates a waiting worker.")]
    async fn client_close(&self, params: Parameters<ClientCloseParams>) -> Result<CallToolResult, McpError> {
        close_impl(&self.state, params.0).await
    }

    #[tool(
        description = "Accept the waiting update: sends SKIP_WAITING and reloads once the controller changes or the reload timeout passes."
    )]
    async fn update_accept(&self) -> Result<CallToolResult, McpError> {
        update_accept_impl(&self.state).await
    }

    #[tool(description = "Read a stored response from one bucket, or the newest copy across all buckets.")]
    async fn cache_match(&self, params: Parameters<CacheMatchParams>) -> Result<CallToolResult, McpError> {
        match_impl(&self.state, params.0).await
    }

    #[tool(description = "Purge a bucket by entry age or count, or delete it.")]
    async fn cache_purge(&self, params: Parameters<CachePurgeParams>) -> Result<CallToolResult, McpError> {
        purge_impl(&self.state, params.0).await
    }
}

impl ServerHandler for OffgridHost {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "offgrid-host".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::test_support::host;

    #[tokio::test]
    async fn test_tool_list() {
        let (state, _network) = host().await;
        let host = OffgridHost::new(state);

        let mut names: Vec<String> = host.tool_router.list_all().into_iter().map(|t| t.name.to_string()).collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "cache_match",
                "cache_purge",
                "client_close",
                "client_open",
                "notification_click",
                "update_accept",
                "worker_fetch",
                "worker_message",
                "worker_push",
                "worker_status",
            ]
        );
    }
}
