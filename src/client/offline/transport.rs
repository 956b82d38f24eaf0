//! # Transport
//!
//! The single seam through which every byte leaves the process. The offline
//! layer never talks to `reqwest` directly; it goes through `Transport`, which
//! keeps replay, probing and worker fetches testable against a scripted mock.

use crate::shared::body::RequestBody;
use crate::shared::http::{CacheMode, Credentials, HttpMethod, OutboundRequest, TransportResponse};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CACHE_CONTROL, CONTENT_TYPE, PRAGMA};
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use thiserror::Error;

/// Network-level failure; a non-2xx response is not an error at this layer
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("network error: {0}")]
    Network(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Sends outbound requests
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: OutboundRequest) -> Result<TransportResponse, TransportError>;
}

/// `reqwest`-backed transport
///
/// Requests marked `Credentials::Include` carry the session bearer token, when
/// one is set.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    token: Arc<RwLock<Option<String>>>,
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new(Client::new())
    }
}

impl HttpTransport {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            token: Arc::new(RwLock::new(None)),
        }
    }

    /// Set or clear the session token attached to credentialed requests
    pub fn set_token(&self, token: Option<String>) {
        if let Ok(mut guard) = self.token.write() {
            *guard = token;
        }
    }

    fn token(&self) -> Option<String> {
        self.token.read().ok().and_then(|guard| guard.clone())
    }

    fn build(&self, request: OutboundRequest) -> Result<reqwest::RequestBuilder, TransportError> {
        let method = match request.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        };

        let mut headers = to_header_map(&request.headers)?;
        if request.cache == CacheMode::NoStore {
            headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
            headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
        }
        if request.credentials == Credentials::Include && !headers.contains_key(AUTHORIZATION) {
            if let Some(token) = self.token() {
                let value = HeaderValue::from_str(&format!("Bearer {}", token))
                    .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
                headers.insert(AUTHORIZATION, value);
            }
        }

        let mut builder = self.client.request(method, &request.url);
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        builder = match request.body {
            None => builder,
            Some(RequestBody::Json(value)) => {
                let bytes = serde_json::to_vec(&value)
                    .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
                headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                builder.body(bytes)
            }
            Some(RequestBody::Text(text)) => builder.body(text),
            Some(RequestBody::Form(form)) => {
                // reqwest generates the multipart boundary itself
                headers.remove(CONTENT_TYPE);
                let mut multipart = Form::new();
                for (name, value) in form.fields {
                    multipart = multipart.text(name, value);
                }
                for file in form.files {
                    let part = Part::bytes(file.bytes)
                        .file_name(file.name)
                        .mime_str(&file.mime_type)
                        .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
                    multipart = multipart.part(file.field, part);
                }
                builder.multipart(multipart)
            }
        };

        Ok(builder.headers(headers))
    }
}

fn to_header_map(headers: &BTreeMap<String, String>) -> Result<HeaderMap, TransportError> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| TransportError::InvalidRequest(format!("header {}: {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| TransportError::InvalidRequest(format!("header {}: {}", name, e)))?;
        map.insert(name, value);
    }
    Ok(map)
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: OutboundRequest) -> Result<TransportResponse, TransportError> {
        let url = request.url.clone();
        let method = request.method;
        let response = self.build(request)?.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout
            } else {
                TransportError::Network(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        tracing::debug!("[Transport] {} {} -> {}", method, url, status);
        Ok(TransportResponse {
            status,
            headers,
            body,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::body::FormBody;
    use wiremock::matchers::{body_json, header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_json_request_carries_content_type_and_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/users"))
            .and(header("content-type", "application/json"))
            .and(header("authorization", "Bearer secret"))
            .and(header("cache-control", "no-store"))
            .and(body_json(serde_json::json!({ "name": "Test" })))
            .respond_with(ResponseTemplate::new(201).set_body_string("created"))
            .expect(1)
            .mount(&server)
            .await;

        let transport = HttpTransport::default();
        transport.set_token(Some("secret".into()));
        let request = OutboundRequest::post(format!("{}/api/users", server.uri()))
            .with_json(serde_json::json!({ "name": "Test" }))
            .no_store();

        let response = transport.send(request).await.unwrap();
        assert_eq!(response.status, 201);
        assert_eq!(response.text(), "created");
    }

    #[tokio::test]
    async fn test_multipart_request_generates_boundary() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/files"))
            .and(header_exists("content-type"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let form = FormBody::new()
            .field("folder", "invoices")
            .file("file", "a.txt", "text/plain", b"hello".to_vec());
        let request = OutboundRequest::post(format!("{}/api/files", server.uri()))
            .with_header("Content-Type", "multipart/form-data; boundary=stale")
            .with_body(RequestBody::Form(form));

        transport_send_and_check(request).await;

        let received = server.received_requests().await.unwrap();
        let content_type = received[0]
            .headers
            .get("content-type")
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(content_type.starts_with("multipart/form-data; boundary="));
        assert!(!content_type.ends_with("stale"));
        let body = String::from_utf8_lossy(&received[0].body);
        assert!(body.contains("filename=\"a.txt\""));
        assert!(body.contains("hello"));
    }

    async fn transport_send_and_check(request: OutboundRequest) {
        let response = HttpTransport::default().send(request).await.unwrap();
        assert!(response.is_success());
    }

    #[tokio::test]
    async fn test_non_success_is_not_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(422))
            .mount(&server)
            .await;

        let request = OutboundRequest::put(format!("{}/api/users/1", server.uri()));
        let response = HttpTransport::default().send(request).await.unwrap();
        assert_eq!(response.status, 422);
        assert!(!response.is_success());
    }

    #[tokio::test]
    async fn test_unreachable_host_is_network_error() {
        // Port 9 (discard) on localhost is closed on test machines
        let request = OutboundRequest::get("http://127.0.0.1:9/api/health")
            .with_timeout(std::time::Duration::from_secs(2));
        let result = HttpTransport::default().send(request).await;
        assert!(matches!(result, Err(TransportError::Network(_)) | Err(TransportError::Timeout)));
    }

    #[test]
    fn test_invalid_header_is_rejected() {
        let request = OutboundRequest::get("http://localhost/").with_header("bad header", "x");
        assert!(matches!(
            HttpTransport::default().build(request),
            Err(TransportError::InvalidRequest(_))
        ));
    }
}
