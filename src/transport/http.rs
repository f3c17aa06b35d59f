//! HTTPS transport for the registry document API.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::{ResponseBody, Transport, TransportError};
use crate::config::TransportConfig;
use crate::error::{RegistryError, Result};

/// Document creation endpoint of the registry API.
pub const DEFAULT_ENDPOINT: &str = "https://ismp.crpt.ru/api/v3/lk/documents/create";

/// JSON body posted to the registry.
#[derive(Debug, Serialize)]
struct SubmissionPayload<'a> {
    document: &'a str,
    signature: &'a str,
}

/// Transport that POSTs documents to the registry over HTTPS.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    endpoint: String,
    auth_token: String,
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport for `endpoint` with the given authorization token.
    pub fn new(endpoint: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            auth_token: auth_token.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Create a transport from configuration.
    pub fn from_config(config: &TransportConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RegistryError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            endpoint: config.endpoint.clone(),
            auth_token: config.auth_token.clone().unwrap_or_default(),
            client,
        })
    }

    /// The endpoint documents are posted to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, document: &str, signature: &str) -> std::result::Result<ResponseBody, TransportError> {
        let payload = serde_json::to_vec(&SubmissionPayload { document, signature })?;

        debug!(
            endpoint = %self.endpoint,
            payload_bytes = payload.len(),
            "Posting document to registry"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(reqwest::header::AUTHORIZATION, &self.auth_token)
            .body(payload)
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Request(format!("Failed to read response body: {}", e)))?;

        if !status.is_success() {
            warn!(status = status.as_u16(), "Registry rejected document");
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        info!(status = status.as_u16(), response = %body, "API response received");
        Ok(ResponseBody(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_posts_document_with_auth_header() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v3/lk/documents/create"))
            .and(header("authorization", "Bearer token"))
            .and(header("content-type", "application/json"))
            .and(body_json(serde_json::json!({
                "document": "{\"doc_id\":\"doc123\"}",
                "signature": "sig",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"value\":\"created\"}"))
            .expect(1)
            .mount(&server)
            .await;

        let transport = HttpTransport::new(
            format!("{}/api/v3/lk/documents/create", server.uri()),
            "Bearer token",
        );

        let body = transport.send("{\"doc_id\":\"doc123\"}", "sig").await.unwrap();
        assert_eq!(body.as_str(), "{\"value\":\"created\"}");
    }

    #[tokio::test]
    async fn test_non_success_status_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(server.uri(), "");
        let err = transport.send("doc", "sig").await.unwrap_err();

        match err {
            TransportError::Status { status, body } => {
                assert_eq!(status, 429);
                assert_eq!(body, "slow down");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_connection_failure_is_request_error() {
        // Nothing listens on a port once its listener is dropped.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = HttpTransport::new(format!("http://{}/api/v3/lk/documents/create", addr), "");
        let err = transport.send("doc", "sig").await.unwrap_err();
        assert!(matches!(err, TransportError::Request(_)));
    }

    #[test]
    fn test_from_config_defaults_to_empty_token() {
        let config = TransportConfig::default();
        let transport = HttpTransport::from_config(&config).unwrap();

        assert_eq!(transport.endpoint(), DEFAULT_ENDPOINT);
        assert_eq!(transport.auth_token, "");
    }
}
