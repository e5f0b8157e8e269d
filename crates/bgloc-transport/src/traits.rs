use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;

/// No status code was obtained for a request.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("invalid header {name}")]
    InvalidHeader { name: String },
    #[error("request failed: {0}")]
    Request(String),
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// POST `payloads` as one JSON array. Any HTTP response yields its status
    /// code, including non-2xx.
    async fn post_batch(
        &self,
        url: &str,
        payloads: &[Value],
        headers: &BTreeMap<String, String>,
    ) -> Result<u16, TransportError>;

    async fn probe_connectivity(&self) -> bool;
}
