//! worker_fetch tool implementation.
//!
//! Issues a page request through the registration, as a browser tab would.

use std::collections::BTreeMap;
use std::time::Instant;

use http::Method;
use offgrid_core::Request;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::HostError;
use crate::host::HostState;
use crate::tools::json_result;

/// Parameters for the worker_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WorkerFetchParams {
    /// Path such as `/app.js` (resolved against the origin) or an absolute URL.
    pub url: String,

    /// HTTP method (default: GET). Only GET is ever served by the worker.
    #[serde(default = "default_method")]
    pub method: String,

    /// Treat the request as a top-level navigation.
    #[serde(default)]
    pub navigate: bool,

    /// Extra request headers.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

fn default_method() -> String {
    "GET".into()
}

/// Output from the worker_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WorkerFetchOutput {
    pub url: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    /// Body decoded as UTF-8 (lossy).
    pub body: String,
    pub body_bytes: usize,
    /// `worker` when the active worker answered, `network` when the request bypassed it.
    pub served_by: String,
    pub worker_version: Option<String>,
    pub fetch_ms: u64,
}

/// Implementation of the worker_fetch tool.
pub async fn fetch_impl(state: &HostState, params: WorkerFetchParams) -> Result<CallToolResult, McpError> {
    let method = Method::from_bytes(params.method.trim().to_ascii_uppercase().as_bytes())
        .map_err(|_| HostError::InvalidInput(format!("invalid method: {}", params.method)))?;
    let url = state.resolve(&params.url)?;

    let mut request = if params.navigate { Request::navigate(url) } else { Request::get(url) };
    request.method = method;
    for (name, value) in params.headers {
        request = request.with_header(name, value);
    }

    let start = Instant::now();
    let url = request.url.to_string();
    let served = state.registration.fetch(request).await?;
    let fetch_ms = start.elapsed().as_millis() as u64;

    tracing::debug!(url = %url, status = served.response.status, worker = ?served.worker, fetch_ms, "worker_fetch");

    let output = WorkerFetchOutput {
        url,
        status: served.response.status,
        body: served.response.text().into_owned(),
        body_bytes: served.response.body.len(),
        headers: served.response.headers,
        served_by: if served.worker.is_some() { "worker" } else { "network" }.to_string(),
        worker_version: served.worker,
        fetch_ms,
    };
    json_result(&output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::test_support::host;
    use crate::tools::output_of;

    fn params(url: &str) -> WorkerFetchParams {
        WorkerFetchParams { url: url.into(), method: default_method(), navigate: false, headers: BTreeMap::new() }
    }

    #[tokio::test]
    async fn test_fetch_precached_asset_offline() {
        let (state, network) = host().await;
        network.set_offline(true);

        let result = fetch_impl(&state, params("/app.js")).await.unwrap();
        let output = output_of(&result);
        assert_eq!(output["status"], 200);
        assert_eq!(output["body"], "app");
        assert_eq!(output["served_by"], "worker");
    }

    #[tokio::test]
    async fn test_fetch_offline_navigation_gets_fallback() {
        let (state, network) = host().await;
        network.set_offline(true);

        let result = fetch_impl(&state, WorkerFetchParams { navigate: true, ..params("/checkout") }).await.unwrap();
        assert_eq!(output_of(&result)["body"], "offline");
    }

    #[tokio::test]
    async fn test_fetch_post_bypasses_worker() {
        let (state, network) = host().await;
        network.serve("/api/cart", "created");

        let result = fetch_impl(&state, WorkerFetchParams { method: "post".into(), ..params("/api/cart") })
            .await
            .unwrap();
        let output = output_of(&result);
        assert_eq!(output["served_by"], "network");
        assert!(output["worker_version"].is_null());
    }

    #[tokio::test]
    async fn test_fetch_invalid_method() {
        let (state, _network) = host().await;
        let result = fetch_impl(&state, WorkerFetchParams { method: "GE T".into(), ..params("/") }).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_fetch_offline_miss_is_error() {
        let (state, network) = host().await;
        network.set_offline(true);
        let result = fetch_impl(&state, params("/styles/site.css")).await;
        assert!(result.is_err());
    }
}
