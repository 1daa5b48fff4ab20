//! Error taxonomy for the JSON-RPC boundary.
//!
//! Internal component functions return `anyhow::Result<T>` with `.context`
//! annotations, exactly as the teacher does throughout `sandbox.rs`/
//! `docker.rs`. `DispatchError` exists only at the public dispatcher
//! boundary, where a protocol-level failure must be converted to a
//! `(code, message)` pair — see `mbid-sandbox/src/daemon_protocol.rs::RpcError`
//! for the shape this generalizes.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("parse error: {0}")]
    Parse(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("method not found: {0}")]
    MethodNotFound(String),

    #[error("invalid params: {0}")]
    InvalidParams(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl DispatchError {
    /// JSON-RPC 2.0 numeric error code, per SPEC_FULL.md §6.
    pub fn code(&self) -> i64 {
        match self {
            DispatchError::Parse(_) => -32700,
            DispatchError::InvalidRequest(_) => -32600,
            DispatchError::MethodNotFound(_) => -32601,
            DispatchError::InvalidParams(_) => -32602,
            DispatchError::Internal(_) => -32603,
        }
    }

    pub fn message(&self) -> String {
        self.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_match_json_rpc_convention() {
        assert_eq!(DispatchError::Parse("x".into()).code(), -32700);
        assert_eq!(DispatchError::InvalidRequest("x".into()).code(), -32600);
        assert_eq!(DispatchError::MethodNotFound("x".into()).code(), -32601);
        assert_eq!(DispatchError::InvalidParams("x".into()).code(), -32602);
        assert_eq!(DispatchError::Internal("x".into()).code(), -32603);
    }
}
