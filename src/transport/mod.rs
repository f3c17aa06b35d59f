//! Document submission transport.
//!
//! The rate limiter hands every admitted submission to a [`Transport`]. The
//! production implementation is [`HttpTransport`]; tests substitute their own.

mod http;

use async_trait::async_trait;
use thiserror::Error;

pub use http::{HttpTransport, DEFAULT_ENDPOINT};

/// Errors that can occur while sending a document.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Request failed: {0}")]
    Request(String),
    #[error("Registry returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Raw response body returned by the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseBody(pub String);

impl ResponseBody {
    /// Borrow the body text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ResponseBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Trait for document submission transports.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Submit a document and its signature, returning the response body.
    async fn send(&self, document: &str, signature: &str) -> Result<ResponseBody, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    async fn send(&self, document: &str, signature: &str) -> Result<ResponseBody, TransportError> {
        (**self).send(document, signature).await
    }
}
