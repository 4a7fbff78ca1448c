//! Push payloads and the notifications they produce.

use serde::{Deserialize, Serialize};

pub const DEFAULT_TITLE: &str = "New notification";
pub const DEFAULT_URL: &str = "/";

/// JSON body of a push message. Every field is optional.
#[derive(Debug, Default, Deserialize)]
pub struct PushPayload {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub data: Option<PushData>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PushData {
    #[serde(default)]
    pub url: Option<String>,
}

/// A notification to display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// Page opened or focused when the notification is clicked.
    pub url: String,
}

impl From<PushPayload> for Notification {
    fn from(payload: PushPayload) -> Self {
        Self {
            title: payload.title.unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            body: payload.body,
            icon: payload.icon,
            url: payload.data.and_then(|d| d.url).unwrap_or_else(|| DEFAULT_URL.to_string()),
        }
    }
}

/// Parse a push message into a notification.
///
/// An empty message yields the default notification. Anything that is not a
/// JSON object is discarded.
pub fn parse_push(data: &[u8]) -> Option<Notification> {
    if data.iter().all(u8::is_ascii_whitespace) {
        return Some(PushPayload::default().into());
    }

    match serde_json::from_slice::<PushPayload>(data) {
        Ok(payload) => Some(payload.into()),
        Err(err) => {
            tracing::debug!(error = %err, bytes = data.len(), "discarding malformed push payload");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_payload() {
        let data = br#"{"title":"Order shipped","body":"Arrives Tuesday","icon":"/icon.png","data":{"url":"/orders/42"}}"#;
        let notification = parse_push(data).unwrap();
        assert_eq!(notification.title, "Order shipped");
        assert_eq!(notification.body.as_deref(), Some("Arrives Tuesday"));
        assert_eq!(notification.icon.as_deref(), Some("/icon.png"));
        assert_eq!(notification.url, "/orders/42");
    }

    #[test]
    fn test_parse_defaults() {
        let notification = parse_push(br#"{"body":"hi"}"#).unwrap();
        assert_eq!(notification.title, DEFAULT_TITLE);
        assert_eq!(notification.url, DEFAULT_URL);

        let notification = parse_push(b"").unwrap();
        assert_eq!(notification.title, DEFAULT_TITLE);
    }

    #[test]
    fn test_parse_malformed() {
        assert!(parse_push(b"{not json").is_none());
        assert!(parse_push(b"42").is_none());
        assert!(parse_push(br#""just text""#).is_none());
    }
}
