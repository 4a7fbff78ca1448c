//! worker_push and notification_click tool implementations.

use bytes::Bytes;
use offgrid_core::Error;
use offgrid_worker::{EventOutcome, Notification, WorkerEvent};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::host::HostState;
use crate::tools::json_result;

/// Parameters for the worker_push tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WorkerPushParams {
    /// Raw push message body, normally JSON `{title, body, icon, data: {url}}`.
    #[serde(default)]
    pub payload: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkerPushOutput {
    /// Notification shown, or null when the payload was discarded.
    pub notification: Option<Notification>,
}

/// Parameters for the notification_click tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct NotificationClickParams {
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    /// Page to focus or open.
    pub url: String,
}

fn unexpected(outcome: EventOutcome) -> McpError {
    Error::InvalidState(format!("unexpected worker outcome: {outcome:?}")).into()
}

/// Implementation of the worker_push tool.
pub async fn push_impl(state: &HostState, params: WorkerPushParams) -> Result<CallToolResult, McpError> {
    let event = WorkerEvent::Push(Bytes::from(params.payload));
    match state.registration.dispatch(event).await? {
        EventOutcome::Notification(notification) => json_result(&WorkerPushOutput { notification }),
        other => Err(unexpected(other)),
    }
}

/// Implementation of the notification_click tool.
pub async fn notification_click_impl(
    state: &HostState, params: NotificationClickParams,
) -> Result<CallToolResult, McpError> {
    let notification = Notification { title: params.title, body: params.body, icon: params.icon, url: params.url };
    match state.registration.dispatch(WorkerEvent::NotificationClick(notification)).await? {
        EventOutcome::Client(action) => json_result(&action),
        other => Err(unexpected(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::test_support::host;
    use crate::tools::output_of;

    #[tokio::test]
    async fn test_push_shows_notification() {
        let (state, _network) = host().await;
        let params = WorkerPushParams { payload: r#"{"title":"Back in stock","data":{"url":"/p/7"}}"#.into() };

        let output = output_of(&push_impl(&state, params).await.unwrap());
        assert_eq!(output["notification"]["title"], "Back in stock");
        assert_eq!(output["notification"]["url"], "/p/7");
    }

    #[tokio::test]
    async fn test_malformed_push_is_discarded() {
        let (state, _network) = host().await;
        let params = WorkerPushParams { payload: "not json".into() };

        let output = output_of(&push_impl(&state, params).await.unwrap());
        assert!(output["notification"].is_null());
    }

    #[tokio::test]
    async fn test_notification_click_focuses_existing_page() {
        let (state, _network) = host().await;
        let page = state.registration.open_client("https://shop.test/orders").await;
        state.registration.open_client("https://shop.test/").await;

        let params =
            NotificationClickParams { title: "Order".into(), body: None, icon: None, url: "/orders".into() };
        let output = output_of(&notification_click_impl(&state, params).await.unwrap());
        assert_eq!(output["action"], "focused");
        assert_eq!(output["client"]["id"], page.id);
    }
}
