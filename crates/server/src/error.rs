//! Errors raised by the host itself, before a request reaches the worker.

use rmcp::model::{ErrorCode, ErrorData as McpError};

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// Tool parameters that cannot be turned into a worker request.
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// Tool output could not be serialized.
    #[error("SERIALIZATION_ERROR: {0}")]
    Serialization(String),
}

impl From<HostError> for McpError {
    fn from(err: HostError) -> Self {
        let (code, message) = match &err {
            HostError::InvalidInput(msg) => (-32602, msg.clone()),
            HostError::Serialization(msg) => (-32603, msg.clone()),
        };

        McpError { code: ErrorCode(code), message: message.into(), data: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err: McpError = HostError::InvalidInput("bad method".into()).into();
        assert_eq!(err.code, ErrorCode(-32602));
        assert_eq!(err.message, "bad method");

        let err: McpError = HostError::Serialization("boom".into()).into();
        assert_eq!(err.code, ErrorCode(-32603));
    }
}
